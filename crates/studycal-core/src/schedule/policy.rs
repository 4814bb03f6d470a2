//! Rescheduling policy: bounds, windows and threshold resolution.
//!
//! The carry-over/defer decision is a single documented function,
//! [`rollover_mode`], so the comparison direction is fixed in one place:
//! a day with `incomplete >= carry_over_threshold` unfinished tasks takes
//! the cascading defer path, anything below is carried over in place.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, ValidationError};
use crate::storage::{CalendarStore, EngineConfig};

/// Threshold keys stored in the `schedule_config` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdKey {
    DailyTaskLimit,
    CarryOverThreshold,
    AdvanceDaysLimit,
}

impl ThresholdKey {
    pub const ALL: [ThresholdKey; 3] = [
        ThresholdKey::DailyTaskLimit,
        ThresholdKey::CarryOverThreshold,
        ThresholdKey::AdvanceDaysLimit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdKey::DailyTaskLimit => "daily_task_limit",
            ThresholdKey::CarryOverThreshold => "carry_over_threshold",
            ThresholdKey::AdvanceDaysLimit => "advance_days_limit",
        }
    }

    /// # Errors
    /// Returns [`ValidationError::InvalidValue`] for unknown keys.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == value)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "threshold".to_string(),
                message: format!("unknown key '{value}'"),
            })
    }
}

impl fmt::Display for ThresholdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effective thresholds for one student at one moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub daily_task_limit: u32,
    pub carry_over_threshold: u32,
    pub advance_days_limit: u32,
}

impl Thresholds {
    pub fn get(&self, key: ThresholdKey) -> u32 {
        match key {
            ThresholdKey::DailyTaskLimit => self.daily_task_limit,
            ThresholdKey::CarryOverThreshold => self.carry_over_threshold,
            ThresholdKey::AdvanceDaysLimit => self.advance_days_limit,
        }
    }

    fn set(&mut self, key: ThresholdKey, value: u32) {
        match key {
            ThresholdKey::DailyTaskLimit => self.daily_task_limit = value,
            ThresholdKey::CarryOverThreshold => self.carry_over_threshold = value,
            ThresholdKey::AdvanceDaysLimit => self.advance_days_limit = value,
        }
    }
}

/// How an end-of-day backlog is moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloverMode {
    /// Bump the rows to the next work date in place
    CarryOver,
    /// Recreate them through the cascading rescheduler
    Defer,
}

/// Pick the rollover mode for `incomplete` unfinished tasks.
///
/// `threshold` is an inclusive lower bound for the defer path.
pub fn rollover_mode(incomplete: usize, threshold: u32) -> RolloverMode {
    if incomplete >= threshold as usize {
        RolloverMode::Defer
    } else {
        RolloverMode::CarryOver
    }
}

/// Engine-wide limits plus fallback thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReschedulePolicy {
    /// Deepest cascade level that may still place tasks
    pub max_cascade_depth: usize,
    /// Days the work-date finder scans before falling back
    pub rest_lookahead_days: u32,
    /// Duplicate end-of-day triggers inside this window are skipped
    pub idempotency_window: Duration,
    /// Used when no schedule_config row applies
    pub fallback: Thresholds,
}

impl Default for ReschedulePolicy {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ReschedulePolicy {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_cascade_depth: config.max_cascade_depth,
            rest_lookahead_days: config.rest_lookahead_days,
            // Hand-edited files can exceed what a Duration holds; saturate.
            idempotency_window: i64::try_from(config.idempotency_window_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            fallback: Thresholds {
                daily_task_limit: config.daily_task_limit,
                carry_over_threshold: config.carry_over_threshold,
                advance_days_limit: config.advance_days_limit,
            },
        }
    }
}

impl ReschedulePolicy {
    /// Resolve one threshold: student override, else global row, else fallback.
    ///
    /// Always reads the store; nothing is cached between calls.
    pub fn resolve_threshold(
        &self,
        store: &CalendarStore<'_>,
        student_id: &str,
        key: ThresholdKey,
    ) -> Result<u32> {
        for scope in [Some(student_id), None] {
            let Some(raw) = store.config_value(scope, key.as_str())? else {
                continue;
            };
            match raw.trim().parse::<u32>() {
                Ok(value) => return Ok(value),
                Err(_) => tracing::warn!(
                    student_id,
                    key = key.as_str(),
                    value = raw.as_str(),
                    "ignoring non-numeric schedule_config value"
                ),
            }
        }
        Ok(self.fallback.get(key))
    }

    /// Resolve every threshold for a student.
    pub fn thresholds_for(&self, store: &CalendarStore<'_>, student_id: &str) -> Result<Thresholds> {
        let mut thresholds = self.fallback;
        for key in ThresholdKey::ALL {
            thresholds.set(key, self.resolve_threshold(store, student_id, key)?);
        }
        Ok(thresholds)
    }
}
