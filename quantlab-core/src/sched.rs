//! Time-indexed scheduler.
//!
//! A priority queue of tasks keyed by (fire time, priority, insertion
//! sequence). At each clock tick the engine drains everything due before the
//! strategy pipeline runs for that tick. Session-bound recurrences consult
//! the calendar to skip non-trading days.

use crate::calendar::MarketCalendar;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    Once,
    DailyAt(NaiveTime),
    Every(Duration),
}

#[derive(Debug, Clone)]
struct Entry<T> {
    fire_at: DateTime<Utc>,
    priority: u8,
    seq: u64,
    recurrence: Recurrence,
    /// Skip occurrences that land on non-trading days.
    session_bound: bool,
    payload: T,
}

impl<T> Entry<T> {
    fn key(&self) -> (DateTime<Utc>, u8, u64) {
        (self.fire_at, self.priority, self.seq)
    }
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl<T> Eq for Entry<T> {}
impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

/// Priority queue of timed callbacks carrying payloads of type `T`.
pub struct Scheduler<T> {
    heap: BinaryHeap<Reverse<Entry<T>>>,
    next_seq: u64,
}

impl<T: Clone> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Schedule a one-shot task.
    pub fn once(&mut self, fire_at: DateTime<Utc>, priority: u8, payload: T) {
        self.push(fire_at, priority, Recurrence::Once, false, payload);
    }

    /// Schedule a task that fires daily at `time`, skipping non-trading days.
    pub fn daily_at(
        &mut self,
        first: DateTime<Utc>,
        time: NaiveTime,
        priority: u8,
        payload: T,
    ) {
        let fire_at = Utc.from_utc_datetime(&first.date_naive().and_time(time));
        let fire_at = if fire_at < first { fire_at + Duration::days(1) } else { fire_at };
        self.push(fire_at, priority, Recurrence::DailyAt(time), true, payload);
    }

    /// Schedule a task that repeats every `interval`.
    pub fn every(
        &mut self,
        first: DateTime<Utc>,
        interval: Duration,
        priority: u8,
        payload: T,
    ) {
        self.push(first, priority, Recurrence::Every(interval), false, payload);
    }

    fn push(
        &mut self,
        fire_at: DateTime<Utc>,
        priority: u8,
        recurrence: Recurrence,
        session_bound: bool,
        payload: T,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry {
            fire_at,
            priority,
            seq,
            recurrence,
            session_bound,
            payload,
        }));
    }

    /// Drain all tasks due at or before `now`, in (time, priority, seq)
    /// order, rescheduling recurrences.
    pub fn due(&mut self, now: DateTime<Utc>, calendar: &dyn MarketCalendar) -> Vec<(DateTime<Utc>, T)> {
        let mut fired = Vec::new();
        while let Some(Reverse(entry)) = self.heap.peek() {
            if entry.fire_at > now {
                break;
            }
            let Reverse(entry) = self.heap.pop().expect("peeked entry present");
            let skip = entry.session_bound && !calendar.is_trading_day(entry.fire_at.date_naive());
            if !skip {
                fired.push((entry.fire_at, entry.payload.clone()));
            }
            match entry.recurrence {
                Recurrence::Once => {}
                Recurrence::DailyAt(time) => {
                    let mut next = entry.fire_at.date_naive() + Duration::days(1);
                    if entry.session_bound {
                        while !calendar.is_trading_day(next) {
                            next += Duration::days(1);
                        }
                    }
                    self.push(
                        Utc.from_utc_datetime(&next.and_time(time)),
                        entry.priority,
                        entry.recurrence,
                        entry.session_bound,
                        entry.payload,
                    );
                }
                Recurrence::Every(interval) => {
                    self.push(
                        entry.fire_at + interval,
                        entry.priority,
                        entry.recurrence,
                        entry.session_bound,
                        entry.payload,
                    );
                }
            }
        }
        fired
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T: Clone> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}
