//! Study task types.
//!
//! A [`Task`] is one unit of planned study for one student on one date.
//! The type tag doubles as the calendar's only notion of special days:
//! a `REST` task marks a rest day and a `LEAVE` task marks an approved
//! leave day. Neither is ever displaced by rescheduling.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Storage format for calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` calendar date.
///
/// # Errors
/// Returns [`ValidationError::InvalidDate`] if the input is not a valid date.
pub fn parse_date(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|_| ValidationError::InvalidDate(value.to_string()))
}

/// Type tag of a task.
///
/// Serialized as the subject label itself, or the reserved tags `REST` / `LEAVE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskKind {
    /// Ordinary study work labelled with its subject
    Subject(String),
    /// Marks the date as a rest day
    Rest,
    /// Marks the date as an approved leave day
    Leave,
}

impl TaskKind {
    pub const REST_TAG: &'static str = "REST";
    pub const LEAVE_TAG: &'static str = "LEAVE";

    pub fn parse(tag: &str) -> Self {
        match tag {
            Self::REST_TAG => TaskKind::Rest,
            Self::LEAVE_TAG => TaskKind::Leave,
            other => TaskKind::Subject(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskKind::Subject(subject) => subject,
            TaskKind::Rest => Self::REST_TAG,
            TaskKind::Leave => Self::LEAVE_TAG,
        }
    }

    /// Whether rescheduling may move tasks of this kind.
    pub fn is_displaceable(&self) -> bool {
        matches!(self, TaskKind::Subject(_))
    }
}

impl From<String> for TaskKind {
    fn from(tag: String) -> Self {
        TaskKind::parse(&tag)
    }
}

impl From<TaskKind> for String {
    fn from(kind: TaskKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a task came to be on its current date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Still on the date it was planned for
    #[default]
    Normal,
    /// Recreated on a later date by the cascading rescheduler
    Deferred,
    /// Moved in place to the next work date at rollover
    CarriedOver,
    /// Pulled forward to be completed early
    Advanced,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Normal => "normal",
            TaskStatus::Deferred => "deferred",
            TaskStatus::CarriedOver => "carried_over",
            TaskStatus::Advanced => "advanced",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "normal" => Some(TaskStatus::Normal),
            "deferred" => Some(TaskStatus::Deferred),
            "carried_over" => Some(TaskStatus::CarriedOver),
            "advanced" => Some(TaskStatus::Advanced),
            _ => None,
        }
    }
}

/// Why a task was moved off its date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DeferReason {
    /// Displaced by a cascade
    CascadeDefer,
    /// Left incomplete at the end of its day
    Incomplete,
    /// Any other reason recorded by an external collaborator
    Other(String),
}

impl DeferReason {
    pub fn as_str(&self) -> &str {
        match self {
            DeferReason::CascadeDefer => "cascade_defer",
            DeferReason::Incomplete => "incomplete",
            DeferReason::Other(reason) => reason,
        }
    }
}

impl From<String> for DeferReason {
    fn from(value: String) -> Self {
        match value.as_str() {
            "cascade_defer" => DeferReason::CascadeDefer,
            "incomplete" => DeferReason::Incomplete,
            _ => DeferReason::Other(value),
        }
    }
}

impl From<DeferReason> for String {
    fn from(reason: DeferReason) -> Self {
        reason.as_str().to_string()
    }
}

/// A study task on a student's calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: String,
    /// Owning student
    pub student_id: String,
    /// Date the task is currently scheduled for
    pub date: NaiveDate,
    /// Subject label or reserved REST / LEAVE tag
    pub kind: TaskKind,
    pub title: String,
    pub completed: bool,
    /// Time spent, in minutes
    pub duration_minutes: Option<u32>,
    /// Reference to an uploaded proof of completion
    pub proof: Option<String>,
    /// Date the task was first planned for. Never changes once set.
    pub original_date: Option<NaiveDate>,
    pub status: TaskStatus,
    pub defer_reason: Option<DeferReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a freshly planned task (status normal, original date = date).
    pub fn new(
        student_id: impl Into<String>,
        date: NaiveDate,
        kind: TaskKind,
        title: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            student_id: student_id.into(),
            date,
            kind,
            title: title.into(),
            completed: false,
            duration_minutes: None,
            proof: None,
            original_date: Some(date),
            status: TaskStatus::Normal,
            defer_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Study task for a subject.
    pub fn subject(
        student_id: impl Into<String>,
        date: NaiveDate,
        subject: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self::new(student_id, date, TaskKind::Subject(subject.into()), title)
    }

    /// REST marker making `date` a rest day.
    pub fn rest_marker(student_id: impl Into<String>, date: NaiveDate) -> Self {
        Self::new(student_id, date, TaskKind::Rest, "Rest day")
    }

    /// Completed LEAVE marker for an approved leave day.
    pub fn leave_marker(student_id: impl Into<String>, date: NaiveDate) -> Self {
        let mut task = Self::new(student_id, date, TaskKind::Leave, "Leave");
        task.completed = true;
        task
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    pub fn completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    pub fn is_displaceable(&self) -> bool {
        self.kind.is_displaceable()
    }

    /// Date used for completion-rate accounting.
    pub fn accounting_date(&self) -> NaiveDate {
        self.original_date.unwrap_or(self.date)
    }

    /// Copy of this task recreated on `date` by a cascade.
    ///
    /// Mints a new identity; `original_date` is carried over, or taken from
    /// the task's current date when it was never set.
    pub fn cascaded_to(&self, date: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date,
            original_date: Some(self.accounting_date()),
            status: TaskStatus::Deferred,
            defer_reason: Some(DeferReason::CascadeDefer),
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }
}
