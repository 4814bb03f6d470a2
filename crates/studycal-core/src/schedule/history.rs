//! Schedule history (audit log) entries.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of rescheduling operation recorded in the history log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Defer,
    /// Not written by the engine: an end-of-day carry-over is logged as
    /// `MidnightProcess` with `mode = "carry_over"` in its details. Kept so
    /// rows written by other tools against the same calendar still parse.
    CarryOver,
    Advance,
    Leave,
    MidnightProcess,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Defer => "defer",
            OperationType::CarryOver => "carry_over",
            OperationType::Advance => "advance",
            OperationType::Leave => "leave",
            OperationType::MidnightProcess => "midnight_process",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "defer" => Some(OperationType::Defer),
            "carry_over" => Some(OperationType::CarryOver),
            "advance" => Some(OperationType::Advance),
            "leave" => Some(OperationType::Leave),
            "midnight_process" => Some(OperationType::MidnightProcess),
            _ => None,
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleHistoryEntry {
    /// Assigned by the store; 0 until appended
    pub id: i64,
    pub student_id: String,
    pub operation: OperationType,
    pub operation_date: NaiveDate,
    pub affected_count: usize,
    /// Free-form JSON details (targets, trace, mode)
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl ScheduleHistoryEntry {
    pub fn new(
        student_id: impl Into<String>,
        operation: OperationType,
        operation_date: NaiveDate,
        affected_count: usize,
        details: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            student_id: student_id.into(),
            operation,
            operation_date,
            affected_count,
            details,
            created_at,
        }
    }
}
