//! Threshold override commands.
//!
//! Overrides live in the calendar database. Without `--student` the global
//! row is read or written.

use clap::Subcommand;
use serde_json::json;
use studycal_core::ThresholdKey;

use super::{open_engine, print_json};

#[derive(Subcommand)]
pub enum ThresholdAction {
    /// Show effective thresholds for a student
    Get {
        /// Student ID
        #[arg(long)]
        student: String,
    },
    /// Store an override
    Set {
        /// daily_task_limit, carry_over_threshold or advance_days_limit
        #[arg(value_parser = ThresholdKey::parse)]
        key: ThresholdKey,
        /// New value
        value: u32,
        /// Student ID; omit to set the global value
        #[arg(long)]
        student: Option<String>,
    },
}

pub fn run(action: ThresholdAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;

    match action {
        ThresholdAction::Get { student } => {
            let thresholds = engine.thresholds(&student)?;
            print_json(&thresholds)?;
        }
        ThresholdAction::Set {
            key,
            value,
            student,
        } => {
            engine.db().set_threshold(student.as_deref(), key, value)?;
            print_json(&json!({
                "student_id": student,
                "key": key.as_str(),
                "value": value,
            }))?;
        }
    }
    Ok(())
}
