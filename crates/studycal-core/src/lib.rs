//! # Studycal Core Library
//!
//! Core logic for keeping a student's daily study calendar consistent when
//! days go wrong: unfinished work at midnight, leave requests and work
//! pulled ahead of schedule. The `studycal` CLI is a thin layer over this
//! crate.
//!
//! ## Architecture
//!
//! - **Storage**: SQLite calendar (tasks, leave records, threshold
//!   overrides, history) with versioned migrations, plus TOML configuration
//! - **Schedule**: rest-day lookup, the cascading rescheduler, end-of-day
//!   rollover, leave and advance handling
//!
//! ## Key Components
//!
//! - [`RescheduleEngine`]: transactional entry point for every operation
//! - [`CalendarDb`]: calendar persistence and collaborator-facing CRUD
//! - [`Config`]: application configuration management

pub mod error;
pub mod schedule;
pub mod storage;
pub mod task;

pub use error::{ConfigError, CoreError, DatabaseError, RescheduleError, ValidationError};
pub use schedule::{
    LeaveOutcome, OperationType, Placement, RescheduleEngine, ReschedulePolicy, RolloverOutcome,
    RolloverReport, ScheduleHistoryEntry, ThresholdKey, Thresholds,
};
pub use storage::{CalendarDb, Config, EngineConfig};
pub use task::{DeferReason, Task, TaskKind, TaskStatus};
