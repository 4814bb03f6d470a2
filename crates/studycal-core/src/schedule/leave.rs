//! Leave requests.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::cascade::CascadingRescheduler;
use super::history::{OperationType, ScheduleHistoryEntry};
use super::policy::ReschedulePolicy;
use crate::error::{RescheduleError, Result};
use crate::storage::CalendarStore;
use crate::task::Task;

/// Result of an accepted leave request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveOutcome {
    pub student_id: String,
    pub leave_date: NaiveDate,
    /// Tasks placed by the cascade, occupants included
    pub affected_count: usize,
    /// Where the leave day's own tasks landed
    pub deferred_to: Option<NaiveDate>,
    /// The cascade hit its depth guard and the tasks stayed put
    pub depth_exhausted: bool,
    pub trace: String,
}

/// Record a leave day and move its incomplete study tasks away.
///
/// Must run inside the caller's write transaction; on error nothing has
/// been written.
pub fn request_leave(
    store: &CalendarStore<'_>,
    policy: &ReschedulePolicy,
    student_id: &str,
    leave_date: NaiveDate,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Result<LeaveOutcome> {
    if leave_date < today {
        return Err(RescheduleError::PastDate {
            date: leave_date,
            today,
        }
        .into());
    }
    if store.leave_exists(student_id, leave_date)? {
        return Err(RescheduleError::DuplicateLeave {
            student_id: student_id.to_string(),
            date: leave_date,
        }
        .into());
    }

    let incomplete = store.incomplete_on(student_id, leave_date)?;
    if incomplete.is_empty() {
        store.insert_leave(student_id, leave_date, now)?;
        store.append_history(&ScheduleHistoryEntry::new(
            student_id,
            OperationType::Leave,
            leave_date,
            0,
            serde_json::json!({ "leave_date": leave_date }),
            now,
        ))?;
        tracing::info!(student_id, %leave_date, "leave recorded, no tasks to move");
        return Ok(LeaveOutcome {
            student_id: student_id.to_string(),
            leave_date,
            affected_count: 0,
            deferred_to: None,
            depth_exhausted: false,
            trace: String::new(),
        });
    }

    let placement = CascadingRescheduler::new(store, policy)
        .place_tasks(student_id, leave_date, incomplete, now)?;

    store.insert_leave(student_id, leave_date, now)?;
    store.insert_task(&Task::leave_marker(student_id, leave_date))?;

    let deferred_to = placement.first_target();
    store.append_history(&ScheduleHistoryEntry::new(
        student_id,
        OperationType::Defer,
        leave_date,
        placement.affected_count,
        serde_json::json!({
            "leave_date": leave_date,
            "deferred_to": deferred_to,
            "depth_exhausted": placement.depth_exhausted,
            "trace": placement.trace,
        }),
        now,
    ))?;

    tracing::info!(
        student_id,
        %leave_date,
        affected = placement.affected_count,
        deferred_to = ?deferred_to,
        "leave recorded"
    );

    Ok(LeaveOutcome {
        student_id: student_id.to_string(),
        leave_date,
        affected_count: placement.affected_count,
        deferred_to,
        depth_exhausted: placement.depth_exhausted,
        trace: placement.trace,
    })
}
