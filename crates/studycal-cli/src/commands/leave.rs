//! Leave request commands.

use chrono::NaiveDate;
use clap::Subcommand;
use studycal_core::task::parse_date;

use super::{open_engine, print_json};

#[derive(Subcommand)]
pub enum LeaveAction {
    /// Request leave and move that day's unfinished tasks forward
    Request {
        /// Student ID
        #[arg(long)]
        student: String,
        /// Leave date (YYYY-MM-DD), today or later
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
    },
    /// List approved leave days
    List {
        /// Student ID
        #[arg(long)]
        student: String,
    },
}

pub fn run(action: LeaveAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut engine = open_engine()?;

    match action {
        LeaveAction::Request { student, date } => {
            let outcome = engine.request_leave(&student, date)?;
            print_json(&outcome)?;
        }
        LeaveAction::List { student } => {
            let records = engine.db().leave_records(&student)?;
            print_json(&records)?;
        }
    }
    Ok(())
}
