//! Core error types for studycal-core.
//!
//! This module defines the error hierarchy using thiserror. Validation
//! failures that a caller should surface to the user (duplicate leave,
//! past dates, non-advanceable tasks) live in [`RescheduleError`]; store
//! failures live in [`DatabaseError`] and abort the surrounding transaction.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

/// Core error type for studycal-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Rescheduling request rejected
    #[error("{0}")]
    Reschedule(#[from] RescheduleError),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown configuration key
    #[error("unknown config key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// Date could not be parsed
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// Rejections raised by the rescheduling entry points.
///
/// These are user-facing and never retried.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RescheduleError {
    /// A leave record already exists for this student and date
    #[error("Leave already requested for {student_id} on {date}")]
    DuplicateLeave { student_id: String, date: NaiveDate },

    /// Leave requested for a date before today
    #[error("Cannot request leave for {date}: date is before {today}")]
    PastDate { date: NaiveDate, today: NaiveDate },

    /// No task with this id belongs to the student
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Task cannot be pulled forward
    #[error("Task {task_id} cannot be advanced: {reason}")]
    NotAdvanceable { task_id: String, reason: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg)
                if code.code == rusqlite::ErrorCode::DatabaseLocked
                    || code.code == rusqlite::ErrorCode::DatabaseBusy =>
            {
                DatabaseError::Locked
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_leave_message_names_student_and_date() {
        let err = CoreError::from(RescheduleError::DuplicateLeave {
            student_id: "s-1".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
        });
        assert_eq!(err.to_string(), "Leave already requested for s-1 on 2024-03-04");
    }

    #[test]
    fn rusqlite_errors_become_query_failures() {
        let err: CoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, CoreError::Database(DatabaseError::QueryFailed(_))));
    }
}
