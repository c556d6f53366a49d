//! Append-only event log.
//!
//! Frame format: a little-endian u32 byte length followed by the JSON
//! encoding of one [`EventRecord`]. Field order is the struct definition
//! order, so two runs with identical inputs, seed, and wall source produce
//! byte-identical logs. The wall timestamp comes from an injectable source;
//! replay harnesses pin it to reproduce logs exactly.

use super::{EventKind, EventRecord};
use chrono::{DateTime, Utc};
use std::io::{Read, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("event log i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("event log encoding: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("event log is sealed")]
    Sealed,

    #[error("corrupt frame at byte offset {offset}")]
    CorruptFrame { offset: u64 },
}

/// Where wall-clock timestamps come from.
#[derive(Debug, Clone, Copy)]
pub enum WallSource {
    System,
    /// Every record carries this instant. Used for byte-exact replays.
    Fixed(DateTime<Utc>),
}

impl WallSource {
    fn now(&self) -> DateTime<Utc> {
        match self {
            WallSource::System => Utc::now(),
            WallSource::Fixed(ts) => *ts,
        }
    }
}

/// Append-only writer. A single run owns the sink exclusively; `seal`
/// flushes and forbids further appends.
pub struct EventLog<W: Write> {
    sink: W,
    wall: WallSource,
    next_seq: u64,
    sealed: bool,
}

impl<W: Write> EventLog<W> {
    pub fn new(sink: W, wall: WallSource) -> Self {
        Self {
            sink,
            wall,
            next_seq: 0,
            sealed: false,
        }
    }

    /// Append one record, returning its sequence number.
    pub fn append(&mut self, clock_ts: DateTime<Utc>, event: EventKind) -> Result<u64, EventLogError> {
        if self.sealed {
            return Err(EventLogError::Sealed);
        }
        let record = EventRecord {
            seq: self.next_seq,
            clock_ts,
            wall_ts: self.wall.now(),
            event,
        };
        let payload = serde_json::to_vec(&record)?;
        let len = payload.len() as u32;
        self.sink.write_all(&len.to_le_bytes())?;
        self.sink.write_all(&payload)?;
        self.next_seq += 1;
        Ok(record.seq)
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Flush and seal. Called on every exit path, including cancellation and
    /// fatal errors.
    pub fn seal(&mut self) -> Result<(), EventLogError> {
        self.sink.flush()?;
        self.sealed = true;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

/// Decode a full log stream back into records.
pub fn read_records<R: Read>(mut source: R) -> Result<Vec<EventRecord>, EventLogError> {
    let mut records = Vec::new();
    let mut offset = 0u64;
    loop {
        let mut len_buf = [0u8; 4];
        match source.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        source
            .read_exact(&mut payload)
            .map_err(|_| EventLogError::CorruptFrame { offset })?;
        let record: EventRecord = serde_json::from_slice(&payload)
            .map_err(|_| EventLogError::CorruptFrame { offset })?;
        records.push(record);
        offset += 4 + len as u64;
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn clock_ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap()
    }

    fn wall() -> WallSource {
        WallSource::Fixed(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn round_trip_preserves_records() {
        let mut log = EventLog::new(Vec::new(), wall());
        log.append(clock_ts(), EventKind::RunStarted { seed: 42, capital: dec!(100000) })
            .unwrap();
        log.append(clock_ts(), EventKind::RunCompleted { ticks: 10 }).unwrap();
        log.seal().unwrap();

        let bytes = log.into_inner();
        let records = read_records(&bytes[..]).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].seq, 0);
        assert_eq!(records[1].seq, 1);
        assert!(matches!(records[0].event, EventKind::RunStarted { seed: 42, .. }));
    }

    #[test]
    fn sequence_numbers_are_strictly_increasing() {
        let mut log = EventLog::new(Vec::new(), wall());
        for i in 0..5 {
            let seq = log
                .append(clock_ts(), EventKind::RunCompleted { ticks: i })
                .unwrap();
            assert_eq!(seq, i);
        }
    }

    #[test]
    fn sealed_log_rejects_appends() {
        let mut log = EventLog::new(Vec::new(), wall());
        log.seal().unwrap();
        assert!(matches!(
            log.append(clock_ts(), EventKind::RunCompleted { ticks: 0 }),
            Err(EventLogError::Sealed)
        ));
    }

    #[test]
    fn identical_inputs_identical_bytes() {
        let write_one = || {
            let mut log = EventLog::new(Vec::new(), wall());
            log.append(clock_ts(), EventKind::RunStarted { seed: 7, capital: dec!(1000) })
                .unwrap();
            log.append(clock_ts(), EventKind::RunCompleted { ticks: 3 }).unwrap();
            log.seal().unwrap();
            log.into_inner()
        };
        assert_eq!(write_one(), write_one());
    }

    #[test]
    fn truncated_frame_is_corrupt() {
        let mut log = EventLog::new(Vec::new(), wall());
        log.append(clock_ts(), EventKind::RunCompleted { ticks: 1 }).unwrap();
        let mut bytes = log.into_inner();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            read_records(&bytes[..]),
            Err(EventLogError::CorruptFrame { .. })
        ));
    }
}
