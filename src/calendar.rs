//! Daily analysis calendar
//!
//! Every per-asset table is a dense vector indexed by calendar offset, so
//! looking up a day is an O(1) subtraction.

use chrono::{Days, NaiveDate};

/// Inclusive range of consecutive calendar days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    start: NaiveDate,
    end: NaiveDate,
}

impl Calendar {
    /// Returns `None` when `start` is after `end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Offset of `date` from the first day, if inside the calendar
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.contains(date)
            .then(|| (date - self.start).num_days() as usize)
    }

    /// Day at `offset`; panics only on offsets past `len()`, which callers never build
    pub fn day(&self, offset: usize) -> NaiveDate {
        self.start + Days::new(offset as u64)
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        (0..self.len()).map(move |offset| self.day(offset))
    }
}
