//! Universe selection implementations.

use super::{StageError, UniverseSelection};
use crate::data::DataContext;
use crate::domain::Instrument;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// A fixed universe.
pub struct StaticUniverse {
    instruments: BTreeSet<Instrument>,
}

impl StaticUniverse {
    pub fn new(instruments: impl IntoIterator<Item = Instrument>) -> Self {
        Self {
            instruments: instruments.into_iter().collect(),
        }
    }
}

impl UniverseSelection for StaticUniverse {
    fn select(
        &mut self,
        _now: DateTime<Utc>,
        _data: &DataContext,
    ) -> Result<BTreeSet<Instrument>, StageError> {
        Ok(self.instruments.clone())
    }
}

/// Point-in-time composition from dated membership snapshots: the effective
/// universe at `now` is the latest snapshot dated at or before `now`. The
/// snapshot source encodes listings and delistings; an instrument never
/// appears before its listing date or after its delisting date.
pub struct ScheduledUniverse {
    composition: BTreeMap<NaiveDate, BTreeSet<Instrument>>,
}

impl ScheduledUniverse {
    pub fn new(composition: BTreeMap<NaiveDate, BTreeSet<Instrument>>) -> Self {
        Self { composition }
    }
}

impl UniverseSelection for ScheduledUniverse {
    fn select(
        &mut self,
        now: DateTime<Utc>,
        _data: &DataContext,
    ) -> Result<BTreeSet<Instrument>, StageError> {
        let today = now.date_naive();
        Ok(self
            .composition
            .range(..=today)
            .next_back()
            .map(|(_, set)| set.clone())
            .unwrap_or_default())
    }
}
