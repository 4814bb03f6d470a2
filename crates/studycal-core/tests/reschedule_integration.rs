//! Integration tests for the rescheduling engine.
//!
//! These drive `RescheduleEngine` end to end against a real SQLite
//! database, one transaction per call, the way the CLI does.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use studycal_core::schedule::RolloverOutcome;
use studycal_core::storage::CalendarDb;
use studycal_core::{
    CoreError, OperationType, RescheduleEngine, RescheduleError, ReschedulePolicy, Task, TaskKind,
    TaskStatus, ThresholdKey,
};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn engine() -> RescheduleEngine {
    RescheduleEngine::new(CalendarDb::open_memory().unwrap(), ReschedulePolicy::default())
}

fn seed(engine: &RescheduleEngine, date: NaiveDate, count: usize) -> Vec<Task> {
    (0..count)
        .map(|i| {
            let task = Task::subject("s1", date, "Math", format!("{date} #{i}"));
            engine.db().create_task(&task).unwrap();
            task
        })
        .collect()
}

fn midnight(date: NaiveDate) -> chrono::DateTime<Utc> {
    Utc.from_utc_datetime(&(date + Duration::days(1)).and_hms_opt(0, 0, 0).unwrap())
}

#[test]
fn test_three_incomplete_tasks_are_deferred() {
    let mut engine = engine();
    let seeded = seed(&engine, day(4), 3);

    let report = engine
        .process_end_of_day_at("s1", day(4), midnight(day(4)))
        .unwrap();

    assert_eq!(report.threshold, Some(3));
    assert!(matches!(report.outcome, RolloverOutcome::Deferred { .. }));

    let moved = engine.db().list_tasks("s1", Some(day(5))).unwrap();
    assert_eq!(moved.len(), 3);
    for task in &moved {
        assert!(seeded.iter().all(|s| s.id != task.id));
        assert_eq!(task.original_date, Some(day(4)));
        assert_eq!(task.status, TaskStatus::Deferred);
    }
}

#[test]
fn test_two_incomplete_tasks_are_carried_over_in_place() {
    let mut engine = engine();
    let seeded = seed(&engine, day(4), 2);

    let report = engine
        .process_end_of_day_at("s1", day(4), midnight(day(4)))
        .unwrap();

    assert!(matches!(report.outcome, RolloverOutcome::CarriedOver { .. }));
    let moved = engine.db().list_tasks("s1", Some(day(5))).unwrap();
    let mut ids: Vec<_> = moved.iter().map(|t| t.id.clone()).collect();
    let mut expected: Vec<_> = seeded.iter().map(|t| t.id.clone()).collect();
    ids.sort();
    expected.sort();
    assert_eq!(ids, expected);
}

#[test]
fn test_deferral_skips_rest_day_and_pushes_occupants() {
    let mut engine = engine();
    seed(&engine, day(4), 3);
    engine.db().mark_rest_day("s1", day(5)).unwrap();
    let occupants = seed(&engine, day(6), 3);

    let report = engine
        .process_end_of_day_at("s1", day(4), midnight(day(4)))
        .unwrap();

    let RolloverOutcome::Deferred { placement } = report.outcome else {
        panic!("expected deferral");
    };
    assert_eq!(placement.first_target(), Some(day(6)));
    assert_eq!(placement.affected_count, 6);

    let on_six = engine.db().list_tasks("s1", Some(day(6))).unwrap();
    assert_eq!(on_six.len(), 3);
    assert!(on_six.iter().all(|t| t.original_date == Some(day(4))));

    let on_seven = engine.db().list_tasks("s1", Some(day(7))).unwrap();
    assert_eq!(on_seven.len(), 3);
    for (moved, original) in on_seven.iter().zip(&occupants) {
        assert_eq!(moved.title, original.title);
        assert_eq!(moved.original_date, Some(day(6)));
    }

    let rest = engine.db().list_tasks("s1", Some(day(5))).unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].kind, TaskKind::Rest);
}

#[test]
fn test_student_threshold_override_wins() {
    let mut engine = engine();
    engine
        .db()
        .set_threshold(None, ThresholdKey::CarryOverThreshold, 2)
        .unwrap();
    engine
        .db()
        .set_threshold(Some("s1"), ThresholdKey::CarryOverThreshold, 5)
        .unwrap();
    seed(&engine, day(4), 3);

    let report = engine
        .process_end_of_day_at("s1", day(4), midnight(day(4)))
        .unwrap();
    assert_eq!(report.threshold, Some(5));
    assert!(matches!(report.outcome, RolloverOutcome::CarriedOver { .. }));
    assert_eq!(engine.thresholds("s2").unwrap().carry_over_threshold, 2);
}

#[test]
fn test_rollover_is_idempotent_within_five_minutes() {
    let mut engine = engine();
    seed(&engine, day(4), 3);
    let first_run = midnight(day(4));

    let first = engine.process_end_of_day_at("s1", day(4), first_run).unwrap();
    assert!(!first.is_skipped());
    let snapshot = engine.db().list_tasks("s1", None).unwrap();

    let second = engine
        .process_end_of_day_at("s1", day(4), first_run + Duration::seconds(299))
        .unwrap();
    assert!(second.is_skipped());
    assert_eq!(engine.db().list_tasks("s1", None).unwrap(), snapshot);

    let history = engine.db().history("s1", 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].operation, OperationType::MidnightProcess);
}

#[test]
fn test_duplicate_leave_is_rejected_without_changes() {
    let mut engine = engine();
    seed(&engine, day(6), 2);
    let now = midnight(day(3));

    let outcome = engine.request_leave_at("s1", day(6), day(4), now).unwrap();
    assert_eq!(outcome.deferred_to, Some(day(7)));
    let snapshot = engine.db().list_tasks("s1", None).unwrap();

    let err = engine
        .request_leave_at("s1", day(6), day(4), now)
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Reschedule(RescheduleError::DuplicateLeave { .. })
    ));
    assert_eq!(engine.db().list_tasks("s1", None).unwrap(), snapshot);
    assert_eq!(engine.db().leave_records("s1").unwrap().len(), 1);
}

#[test]
fn test_leave_on_empty_rest_day_only_records_leave() {
    let mut engine = engine();
    engine.db().mark_rest_day("s1", day(6)).unwrap();

    let outcome = engine
        .request_leave_at("s1", day(6), day(4), midnight(day(3)))
        .unwrap();

    assert_eq!(outcome.affected_count, 0);
    assert_eq!(engine.db().leave_records("s1").unwrap().len(), 1);
    let tasks = engine.db().list_tasks("s1", None).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].kind, TaskKind::Rest);
}

#[test]
fn test_past_leave_is_rejected() {
    let mut engine = engine();
    let err = engine
        .request_leave_at("s1", day(2), day(4), midnight(day(3)))
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::Reschedule(RescheduleError::PastDate { .. })
    ));
    assert!(engine.db().leave_records("s1").unwrap().is_empty());
}

#[test]
fn test_store_failure_deep_in_cascade_rolls_back_everything() {
    let mut engine = engine();
    let seeded = seed(&engine, day(4), 3);
    seed(&engine, day(5), 1);
    seed(&engine, day(6), 1);
    let before = engine.db().list_tasks("s1", None).unwrap();

    engine
        .db()
        .conn()
        .execute_batch(
            "CREATE TRIGGER fail_on_seventh BEFORE INSERT ON tasks
             WHEN NEW.date = '2024-03-07'
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        )
        .unwrap();

    let now = midnight(day(4));
    assert!(engine.process_end_of_day_at("s1", day(4), now).is_err());

    assert_eq!(engine.db().list_tasks("s1", None).unwrap(), before);
    assert!(engine.db().history("s1", 10).unwrap().is_empty());

    // The marker rolled back too, so a retry is not treated as a duplicate.
    engine
        .db()
        .conn()
        .execute_batch("DROP TRIGGER fail_on_seventh;")
        .unwrap();
    let retry = engine
        .process_end_of_day_at("s1", day(4), now + Duration::seconds(30))
        .unwrap();
    assert!(!retry.is_skipped());
    for task in &seeded {
        assert!(engine.db().get_task(&task.id).unwrap().is_none());
    }
}

#[test]
fn test_depth_guard_leaves_calendar_untouched() {
    let policy = ReschedulePolicy {
        max_cascade_depth: 2,
        ..ReschedulePolicy::default()
    };
    let mut engine = RescheduleEngine::new(CalendarDb::open_memory().unwrap(), policy);
    let batch = seed(&engine, day(4), 1);
    for d in 5..=8 {
        seed(&engine, day(d), 1);
    }
    let before = engine.db().list_tasks("s1", None).unwrap();

    let placement = engine.place_tasks("s1", day(4), batch).unwrap();

    assert!(placement.depth_exhausted);
    assert_eq!(placement.affected_count, 0);
    assert_eq!(engine.db().list_tasks("s1", None).unwrap(), before);
}

#[test]
fn test_advance_then_rollover_keeps_original_date() {
    let mut engine = engine();
    let task = Task::subject("s1", day(6), "Math", "Drill");
    engine.db().create_task(&task).unwrap();

    let advanced = engine
        .advance_task_at("s1", &task.id, day(4), midnight(day(3)))
        .unwrap();
    assert_eq!(advanced.date, day(4));
    assert_eq!(advanced.status, TaskStatus::Advanced);

    engine
        .process_end_of_day_at("s1", day(4), midnight(day(4)))
        .unwrap();
    let carried = engine.db().get_task(&task.id).unwrap().unwrap();
    assert_eq!(carried.date, day(5));
    assert_eq!(carried.original_date, Some(day(6)));
}

#[test]
fn test_engine_on_disk_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("studycal.db");
    {
        let mut engine =
            RescheduleEngine::new(CalendarDb::open_at(&path).unwrap(), ReschedulePolicy::default());
        seed(&engine, day(4), 3);
        engine
            .process_end_of_day_at("s1", day(4), midnight(day(4)))
            .unwrap();
    }

    let db = CalendarDb::open_at(&path).unwrap();
    assert_eq!(db.list_tasks("s1", Some(day(5))).unwrap().len(), 3);
    assert_eq!(db.history("s1", 10).unwrap().len(), 1);
}
