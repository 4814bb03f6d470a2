//! Completing a task ahead of schedule.
//!
//! A student may pull a future study task onto today, at most
//! `advance_days_limit` days ahead. The task keeps its identity and its
//! original date; only its date and status change.

use chrono::{DateTime, NaiveDate, Utc};

use super::history::{OperationType, ScheduleHistoryEntry};
use super::policy::{ReschedulePolicy, ThresholdKey};
use crate::error::{RescheduleError, Result};
use crate::storage::CalendarStore;
use crate::task::{Task, TaskStatus};

/// Move `task_id` to `today` with status `advanced`.
///
/// Must run inside the caller's write transaction.
pub fn advance_task(
    store: &CalendarStore<'_>,
    policy: &ReschedulePolicy,
    student_id: &str,
    task_id: &str,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Task> {
    let task = store
        .get_task(task_id)?
        .filter(|task| task.student_id == student_id)
        .ok_or_else(|| RescheduleError::TaskNotFound(task_id.to_string()))?;

    let refuse = |reason: String| RescheduleError::NotAdvanceable {
        task_id: task_id.to_string(),
        reason,
    };

    if !task.is_displaceable() {
        return Err(refuse(format!("{} tasks cannot be moved", task.kind)).into());
    }
    if task.completed {
        return Err(refuse("task is already completed".to_string()).into());
    }
    if task.date <= today {
        return Err(refuse(format!("task is scheduled for {}, not after {today}", task.date)).into());
    }

    let limit = policy.resolve_threshold(store, student_id, ThresholdKey::AdvanceDaysLimit)?;
    let days_ahead = (task.date - today).num_days();
    if days_ahead > i64::from(limit) {
        return Err(refuse(format!(
            "task is {days_ahead} days ahead, limit is {limit}"
        ))
        .into());
    }

    store.move_task(&task.id, today, TaskStatus::Advanced, None, now)?;
    store.append_history(&ScheduleHistoryEntry::new(
        student_id,
        OperationType::Advance,
        today,
        1,
        serde_json::json!({
            "task_id": task.id,
            "from_date": task.date,
            "days_ahead": days_ahead,
        }),
        now,
    ))?;

    tracing::info!(student_id, task_id, from = %task.date, %today, "task advanced");

    store
        .get_task(&task.id)?
        .ok_or_else(|| RescheduleError::TaskNotFound(task_id.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::storage::CalendarDb;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn refused(err: CoreError) -> bool {
        matches!(
            err,
            CoreError::Reschedule(RescheduleError::NotAdvanceable { .. })
        )
    }

    #[test]
    fn task_within_the_limit_moves_to_today() {
        let db = CalendarDb::open_memory().unwrap();
        let task = Task::subject("s1", day(7), "Math", "Drill");
        db.create_task(&task).unwrap();
        let store = db.store();

        let moved =
            advance_task(&store, &ReschedulePolicy::default(), "s1", &task.id, day(4), Utc::now())
                .unwrap();

        assert_eq!(moved.id, task.id);
        assert_eq!(moved.date, day(4));
        assert_eq!(moved.original_date, Some(day(7)));
        assert_eq!(moved.status, TaskStatus::Advanced);
        assert_eq!(
            store.history_for("s1", 1).unwrap()[0].operation,
            OperationType::Advance
        );
    }

    #[test]
    fn task_beyond_the_limit_is_refused() {
        let db = CalendarDb::open_memory().unwrap();
        let task = Task::subject("s1", day(8), "Math", "Drill");
        db.create_task(&task).unwrap();
        let store = db.store();

        let err =
            advance_task(&store, &ReschedulePolicy::default(), "s1", &task.id, day(4), Utc::now())
                .unwrap_err();
        assert!(refused(err));
        assert_eq!(store.get_task(&task.id).unwrap().unwrap().date, day(8));
    }

    #[test]
    fn student_override_widens_the_limit() {
        let db = CalendarDb::open_memory().unwrap();
        let task = Task::subject("s1", day(8), "Math", "Drill");
        db.create_task(&task).unwrap();
        let store = db.store();
        store
            .set_config_value(Some("s1"), ThresholdKey::AdvanceDaysLimit.as_str(), "5", Utc::now())
            .unwrap();

        let moved =
            advance_task(&store, &ReschedulePolicy::default(), "s1", &task.id, day(4), Utc::now())
                .unwrap();
        assert_eq!(moved.date, day(4));
    }

    #[test]
    fn today_completed_and_marker_tasks_are_refused() {
        let db = CalendarDb::open_memory().unwrap();
        let today = Task::subject("s1", day(4), "Math", "Today");
        let done = Task::subject("s1", day(5), "Math", "Done").completed(true);
        let rest = Task::rest_marker("s1", day(5));
        for task in [&today, &done, &rest] {
            db.create_task(task).unwrap();
        }
        let store = db.store();
        let policy = ReschedulePolicy::default();

        for task in [&today, &done, &rest] {
            let err = advance_task(&store, &policy, "s1", &task.id, day(4), Utc::now()).unwrap_err();
            assert!(refused(err), "{} should be refused", task.title);
        }
    }

    #[test]
    fn other_students_tasks_are_not_found() {
        let db = CalendarDb::open_memory().unwrap();
        let task = Task::subject("s2", day(5), "Math", "Drill");
        db.create_task(&task).unwrap();
        let store = db.store();

        let err =
            advance_task(&store, &ReschedulePolicy::default(), "s1", &task.id, day(4), Utc::now())
                .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Reschedule(RescheduleError::TaskNotFound(_))
        ));
    }
}
