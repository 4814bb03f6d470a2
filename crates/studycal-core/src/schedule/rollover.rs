//! End-of-day rollover.
//!
//! Run once per student per day boundary. A small backlog is carried over
//! in place to the next work date; a backlog at or above the student's
//! `carry_over_threshold` goes through the cascading rescheduler.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::calendar::WorkDateFinder;
use super::cascade::{CascadingRescheduler, Placement};
use super::history::{OperationType, ScheduleHistoryEntry};
use super::policy::{rollover_mode, ReschedulePolicy, RolloverMode, ThresholdKey};
use crate::error::Result;
use crate::storage::{CalendarStore, MarkerClaim};
use crate::task::{DeferReason, TaskStatus};

/// What a rollover run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RolloverOutcome {
    /// A run for the same student and date happened inside the window
    Skipped { processed_at: DateTime<Utc> },
    /// Nothing was left incomplete
    NothingToDo,
    /// Tasks were moved in place, keeping their ids
    CarriedOver { to: NaiveDate, task_ids: Vec<String> },
    /// Tasks were recreated through the cascading rescheduler
    Deferred { placement: Placement },
}

/// Report for one `process_end_of_day` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloverReport {
    pub student_id: String,
    pub date: NaiveDate,
    pub incomplete_count: usize,
    pub threshold: Option<u32>,
    #[serde(flatten)]
    pub outcome: RolloverOutcome,
}

impl RolloverReport {
    pub fn is_skipped(&self) -> bool {
        matches!(self.outcome, RolloverOutcome::Skipped { .. })
    }

    /// Tasks moved by this run.
    pub fn affected_count(&self) -> usize {
        match &self.outcome {
            RolloverOutcome::CarriedOver { task_ids, .. } => task_ids.len(),
            RolloverOutcome::Deferred { placement } => placement.affected_count,
            RolloverOutcome::Skipped { .. } | RolloverOutcome::NothingToDo => 0,
        }
    }
}

/// Process the end of `date` for one student.
///
/// Must run inside the caller's write transaction.
pub fn process_end_of_day(
    store: &CalendarStore<'_>,
    policy: &ReschedulePolicy,
    student_id: &str,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<RolloverReport> {
    let report = |incomplete_count, threshold, outcome| RolloverReport {
        student_id: student_id.to_string(),
        date,
        incomplete_count,
        threshold,
        outcome,
    };

    if let MarkerClaim::Recent { processed_at } = store.claim_marker(
        student_id,
        date,
        OperationType::MidnightProcess,
        now,
        policy.idempotency_window,
    )? {
        tracing::info!(student_id, %date, %processed_at, "rollover already processed, skipping");
        return Ok(report(0, None, RolloverOutcome::Skipped { processed_at }));
    }

    let incomplete = store.incomplete_on(student_id, date)?;
    if incomplete.is_empty() {
        tracing::debug!(student_id, %date, "no incomplete tasks at rollover");
        return Ok(report(0, None, RolloverOutcome::NothingToDo));
    }

    let incomplete_count = incomplete.len();
    let threshold = policy.resolve_threshold(store, student_id, ThresholdKey::CarryOverThreshold)?;
    let mode = rollover_mode(incomplete_count, threshold);

    let (outcome, details) = match mode {
        RolloverMode::CarryOver => {
            let finder = WorkDateFinder::new(store, policy.rest_lookahead_days);
            let to = finder.next_work_date(student_id, date)?;
            let task_ids: Vec<String> = incomplete.into_iter().map(|t| t.id).collect();
            for id in &task_ids {
                store.move_task(
                    id,
                    to,
                    TaskStatus::CarriedOver,
                    Some(&DeferReason::Incomplete),
                    now,
                )?;
            }

            let limit =
                policy.resolve_threshold(store, student_id, ThresholdKey::DailyTaskLimit)?;
            let load = store.count_occupants(student_id, to)?;
            if load > limit as usize {
                tracing::warn!(
                    student_id,
                    %to,
                    load,
                    limit,
                    "carry-over pushed day past its daily task limit"
                );
            }

            let details = serde_json::json!({
                "mode": mode,
                "threshold": threshold,
                "target_date": to,
                "task_ids": task_ids,
            });
            (RolloverOutcome::CarriedOver { to, task_ids }, details)
        }
        RolloverMode::Defer => {
            let placement = CascadingRescheduler::new(store, policy)
                .place_tasks(student_id, date, incomplete, now)?;
            let details = serde_json::json!({
                "mode": mode,
                "threshold": threshold,
                "target_date": placement.first_target(),
                "depth_exhausted": placement.depth_exhausted,
                "trace": placement.trace,
            });
            (RolloverOutcome::Deferred { placement }, details)
        }
    };

    let report = report(incomplete_count, Some(threshold), outcome);
    store.append_history(&ScheduleHistoryEntry::new(
        student_id,
        OperationType::MidnightProcess,
        date,
        report.affected_count(),
        details,
        now,
    ))?;

    tracing::info!(
        student_id,
        %date,
        incomplete = incomplete_count,
        threshold,
        ?mode,
        affected = report.affected_count(),
        "rollover processed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::CalendarDb;
    use crate::task::Task;
    use chrono::Duration;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn seed(db: &CalendarDb, date: NaiveDate, count: usize) -> Vec<Task> {
        (0..count)
            .map(|i| {
                let task = Task::subject("s1", date, "Math", format!("{date} #{i}"));
                db.create_task(&task).unwrap();
                task
            })
            .collect()
    }

    #[test]
    fn small_backlog_is_carried_over_keeping_ids() {
        let db = CalendarDb::open_memory().unwrap();
        let seeded = seed(&db, day(4), 2);
        let store = db.store();

        let report =
            process_end_of_day(&store, &ReschedulePolicy::default(), "s1", day(4), Utc::now())
                .unwrap();

        assert_eq!(report.threshold, Some(3));
        let RolloverOutcome::CarriedOver { to, task_ids } = &report.outcome else {
            panic!("expected carry-over, got {:?}", report.outcome);
        };
        assert_eq!(*to, day(5));
        assert_eq!(task_ids.len(), 2);

        for task in &seeded {
            let moved = store.get_task(&task.id).unwrap().unwrap();
            assert_eq!(moved.date, day(5));
            assert_eq!(moved.original_date, Some(day(4)));
            assert_eq!(moved.status, TaskStatus::CarriedOver);
            assert_eq!(moved.defer_reason, Some(DeferReason::Incomplete));
        }
    }

    #[test]
    fn backlog_at_threshold_is_deferred_through_the_cascade() {
        let db = CalendarDb::open_memory().unwrap();
        let seeded = seed(&db, day(4), 3);
        let store = db.store();

        let report =
            process_end_of_day(&store, &ReschedulePolicy::default(), "s1", day(4), Utc::now())
                .unwrap();

        assert!(matches!(report.outcome, RolloverOutcome::Deferred { .. }));
        assert_eq!(report.affected_count(), 3);
        for task in &seeded {
            assert!(store.get_task(&task.id).unwrap().is_none());
        }
        assert_eq!(store.count_occupants("s1", day(5)).unwrap(), 3);
    }

    #[test]
    fn second_run_inside_the_window_is_skipped() {
        let db = CalendarDb::open_memory().unwrap();
        seed(&db, day(4), 1);
        let store = db.store();
        let policy = ReschedulePolicy::default();
        let now = Utc::now();

        process_end_of_day(&store, &policy, "s1", day(4), now).unwrap();
        seed(&db, day(4), 1);

        let again =
            process_end_of_day(&store, &policy, "s1", day(4), now + Duration::minutes(4)).unwrap();
        assert!(again.is_skipped());
        assert_eq!(store.count_occupants("s1", day(4)).unwrap(), 1);

        let later =
            process_end_of_day(&store, &policy, "s1", day(4), now + Duration::minutes(6)).unwrap();
        assert!(!later.is_skipped());
        assert_eq!(store.count_occupants("s1", day(4)).unwrap(), 0);
        assert_eq!(store.history_for("s1", 10).unwrap().len(), 2);
    }

    #[test]
    fn nothing_incomplete_writes_no_history() {
        let db = CalendarDb::open_memory().unwrap();
        db.create_task(&Task::subject("s1", day(4), "Math", "Done").completed(true))
            .unwrap();
        let store = db.store();

        let report =
            process_end_of_day(&store, &ReschedulePolicy::default(), "s1", day(4), Utc::now())
                .unwrap();
        assert_eq!(report.outcome, RolloverOutcome::NothingToDo);
        assert!(store.history_for("s1", 10).unwrap().is_empty());
    }

    #[test]
    fn carry_over_skips_a_rest_day_after_the_processed_date() {
        let db = CalendarDb::open_memory().unwrap();
        let seeded = seed(&db, day(4), 2);
        db.create_task(&Task::rest_marker("s1", day(5))).unwrap();
        let store = db.store();

        let report =
            process_end_of_day(&store, &ReschedulePolicy::default(), "s1", day(4), Utc::now())
                .unwrap();

        let RolloverOutcome::CarriedOver { to, task_ids } = &report.outcome else {
            panic!("expected carry-over, got {:?}", report.outcome);
        };
        assert_eq!(*to, day(6));
        let mut expected: Vec<&str> = seeded.iter().map(|t| t.id.as_str()).collect();
        let mut carried: Vec<&str> = task_ids.iter().map(String::as_str).collect();
        expected.sort_unstable();
        carried.sort_unstable();
        assert_eq!(carried, expected);

        let mut landed: Vec<String> = store
            .tasks_on("s1", day(6))
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        landed.sort_unstable();
        assert_eq!(landed, expected);
        assert_eq!(store.count_occupants("s1", day(5)).unwrap(), 0);

        let history = store.history_for("s1", 10).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].operation, OperationType::MidnightProcess);
        assert_eq!(history[0].details["mode"], "carry_over");
        assert_eq!(history[0].details["target_date"], "2024-03-06");
    }

    #[test]
    fn last_representable_date_fails_instead_of_panicking() {
        let db = CalendarDb::open_memory().unwrap();
        seed(&db, NaiveDate::MAX, 1);
        let store = db.store();

        let err = process_end_of_day(
            &store,
            &ReschedulePolicy::default(),
            "s1",
            NaiveDate::MAX,
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            crate::error::CoreError::Validation(crate::error::ValidationError::InvalidDate(_))
        ));
    }
}
