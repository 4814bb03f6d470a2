//! End-of-day processing commands.

use chrono::{Days, NaiveDate, Utc};
use clap::Subcommand;
use studycal_core::task::parse_date;

use super::{open_engine, print_json};

#[derive(Subcommand)]
pub enum RolloverAction {
    /// Process the end of a day for one student
    Run {
        /// Student ID
        #[arg(long)]
        student: String,
        /// Day to close (YYYY-MM-DD); defaults to yesterday (UTC)
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
    },
}

pub fn run(action: RolloverAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = open_engine()?;

    match action {
        RolloverAction::Run { student, date } => {
            let today = Utc::now().date_naive();
            let date = date.unwrap_or_else(|| today - Days::new(1));
            let report = engine.process_end_of_day(&student, date)?;
            if report.is_skipped() {
                tracing::info!(student = student.as_str(), %date, "rollover skipped as duplicate");
            }
            print_json(&report)?;
        }
    }
    Ok(())
}
