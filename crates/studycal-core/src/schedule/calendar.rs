//! Rest-day detection and next-work-date lookup.
//!
//! A rest day is not stored as such: a date is a rest day for a student
//! exactly when at least one `REST` task exists for that student and date.
//! Deleting every REST task on a date silently turns it back into a work day.

use chrono::{Days, NaiveDate};

use crate::error::{Result, ValidationError};
use crate::storage::CalendarStore;
use crate::task::TaskKind;

/// Answers whether a date is a rest day for a student.
pub trait RestDayOracle {
    fn is_rest_day(&self, student_id: &str, date: NaiveDate) -> Result<bool>;
}

impl RestDayOracle for CalendarStore<'_> {
    fn is_rest_day(&self, student_id: &str, date: NaiveDate) -> Result<bool> {
        self.has_kind_on(student_id, date, &TaskKind::Rest)
    }
}

/// Walks forward over rest days with a bounded lookahead.
pub struct WorkDateFinder<'o, O: RestDayOracle + ?Sized> {
    oracle: &'o O,
    lookahead_days: u32,
}

impl<'o, O: RestDayOracle + ?Sized> WorkDateFinder<'o, O> {
    pub fn new(oracle: &'o O, lookahead_days: u32) -> Self {
        Self {
            oracle,
            lookahead_days: lookahead_days.max(1),
        }
    }

    /// First non-rest date among the `lookahead_days` days after `from`.
    ///
    /// If every scanned day is a rest day this returns `from + 1` anyway, so
    /// a longer rest streak gets work placed on a rest day. Fails when
    /// `from` is the last representable date.
    pub fn next_work_date(&self, student_id: &str, from: NaiveDate) -> Result<NaiveDate> {
        let fallback = from.checked_add_days(Days::new(1)).ok_or_else(|| {
            ValidationError::InvalidDate(format!("{from} has no following day"))
        })?;
        self.scan(student_id, fallback, fallback)
    }

    /// Like [`next_work_date`](Self::next_work_date), but `from` itself is
    /// the first candidate and the fallback.
    pub fn next_work_date_from(&self, student_id: &str, from: NaiveDate) -> Result<NaiveDate> {
        self.scan(student_id, from, from)
    }

    fn scan(&self, student_id: &str, start: NaiveDate, fallback: NaiveDate) -> Result<NaiveDate> {
        for offset in 0..u64::from(self.lookahead_days) {
            let Some(candidate) = start.checked_add_days(Days::new(offset)) else {
                break;
            };
            if !self.oracle.is_rest_day(student_id, candidate)? {
                return Ok(candidate);
            }
        }
        tracing::warn!(
            student_id,
            %start,
            lookahead_days = self.lookahead_days,
            "no work day within lookahead, falling back to {fallback}"
        );
        Ok(fallback)
    }
}
