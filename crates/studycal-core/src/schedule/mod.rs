//! Rescheduling engine.
//!
//! The submodules hold the algorithms, each written against a borrowed
//! [`CalendarStore`] so it runs inside whatever transaction the caller
//! holds. [`RescheduleEngine`] is the entry point: every call opens one
//! IMMEDIATE transaction, runs the algorithm and commits, so a failure at
//! any cascade depth leaves the calendar untouched.

pub mod advance;
pub mod calendar;
pub mod cascade;
pub mod history;
pub mod leave;
pub mod policy;
pub mod rollover;

pub use calendar::{RestDayOracle, WorkDateFinder};
pub use cascade::{CascadingRescheduler, Hop, Placement};
pub use history::{OperationType, ScheduleHistoryEntry};
pub use leave::LeaveOutcome;
pub use policy::{rollover_mode, ReschedulePolicy, RolloverMode, ThresholdKey, Thresholds};
pub use rollover::{RolloverOutcome, RolloverReport};

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Result;
use crate::storage::{CalendarDb, CalendarStore, EngineConfig};
use crate::task::Task;

/// Transactional front door to the rescheduling algorithms.
pub struct RescheduleEngine {
    db: CalendarDb,
    policy: ReschedulePolicy,
}

impl RescheduleEngine {
    pub fn new(db: CalendarDb, policy: ReschedulePolicy) -> Self {
        Self { db, policy }
    }

    pub fn with_config(db: CalendarDb, config: &EngineConfig) -> Self {
        Self::new(db, ReschedulePolicy::from(config))
    }

    pub fn db(&self) -> &CalendarDb {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut CalendarDb {
        &mut self.db
    }

    pub fn policy(&self) -> &ReschedulePolicy {
        &self.policy
    }

    /// Run `op` inside one IMMEDIATE transaction, committing on success.
    fn in_transaction<T>(
        &mut self,
        op: impl FnOnce(&CalendarStore<'_>, &ReschedulePolicy) -> Result<T>,
    ) -> Result<T> {
        let tx = self.db.transaction()?;
        let value = op(&CalendarStore::new(&tx), &self.policy)?;
        tx.commit()?;
        Ok(value)
    }

    /// End-of-day rollover for `date`, timestamped now.
    pub fn process_end_of_day(&mut self, student_id: &str, date: NaiveDate) -> Result<RolloverReport> {
        self.process_end_of_day_at(student_id, date, Utc::now())
    }

    pub fn process_end_of_day_at(
        &mut self,
        student_id: &str,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<RolloverReport> {
        self.in_transaction(|store, policy| {
            rollover::process_end_of_day(store, policy, student_id, date, now)
        })
    }

    /// Request leave on `leave_date`; today is the current UTC date.
    pub fn request_leave(&mut self, student_id: &str, leave_date: NaiveDate) -> Result<LeaveOutcome> {
        let now = Utc::now();
        self.request_leave_at(student_id, leave_date, now.date_naive(), now)
    }

    pub fn request_leave_at(
        &mut self,
        student_id: &str,
        leave_date: NaiveDate,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<LeaveOutcome> {
        self.in_transaction(|store, policy| {
            leave::request_leave(store, policy, student_id, leave_date, today, now)
        })
    }

    /// Pull a future task onto today (current UTC date).
    pub fn advance_task(&mut self, student_id: &str, task_id: &str) -> Result<Task> {
        let now = Utc::now();
        self.advance_task_at(student_id, task_id, now.date_naive(), now)
    }

    pub fn advance_task_at(
        &mut self,
        student_id: &str,
        task_id: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        self.in_transaction(|store, policy| {
            advance::advance_task(store, policy, student_id, task_id, today, now)
        })
    }

    /// Cascade an arbitrary batch off `start`. The batch's rows are deleted
    /// and recreated; callers must not delete them first.
    pub fn place_tasks(
        &mut self,
        student_id: &str,
        start: NaiveDate,
        tasks: Vec<Task>,
    ) -> Result<Placement> {
        let now = Utc::now();
        self.in_transaction(|store, policy| {
            CascadingRescheduler::new(store, policy).place_tasks(student_id, start, tasks, now)
        })
    }

    pub fn is_rest_day(&self, student_id: &str, date: NaiveDate) -> Result<bool> {
        self.db.store().is_rest_day(student_id, date)
    }

    /// First work day strictly after `from`.
    pub fn next_work_date(&self, student_id: &str, from: NaiveDate) -> Result<NaiveDate> {
        let store = self.db.store();
        WorkDateFinder::new(&store, self.policy.rest_lookahead_days).next_work_date(student_id, from)
    }

    /// First work day on or after `from`.
    pub fn next_work_date_from(&self, student_id: &str, from: NaiveDate) -> Result<NaiveDate> {
        let store = self.db.store();
        WorkDateFinder::new(&store, self.policy.rest_lookahead_days)
            .next_work_date_from(student_id, from)
    }

    /// Effective thresholds for a student after override resolution.
    pub fn thresholds(&self, student_id: &str) -> Result<Thresholds> {
        self.policy.thresholds_for(&self.db.store(), student_id)
    }
}
