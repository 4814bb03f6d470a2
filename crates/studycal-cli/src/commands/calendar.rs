use chrono::NaiveDate;
use clap::Subcommand;
use serde_json::json;
use studycal_core::task::parse_date;

use super::{open_engine, print_json};

#[derive(Subcommand)]
pub enum CalendarAction {
    /// Check whether a date is a rest day
    IsRest {
        /// Student ID
        #[arg(long)]
        student: String,
        /// Date (YYYY-MM-DD)
        #[arg(value_parser = parse_date)]
        date: NaiveDate,
    },
    /// Find the next work day
    NextWorkDate {
        /// Student ID
        #[arg(long)]
        student: String,
        /// Start date (YYYY-MM-DD)
        #[arg(value_parser = parse_date)]
        from: NaiveDate,
        /// Consider the start date itself
        #[arg(long)]
        inclusive: bool,
    },
}

pub fn run(action: CalendarAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;

    match action {
        CalendarAction::IsRest { student, date } => {
            let rest = engine.is_rest_day(&student, date)?;
            print_json(&json!({ "date": date, "rest_day": rest }))?;
        }
        CalendarAction::NextWorkDate {
            student,
            from,
            inclusive,
        } => {
            let next = if inclusive {
                engine.next_work_date_from(&student, from)?
            } else {
                engine.next_work_date(&student, from)?
            };
            print_json(&json!({ "from": from, "next_work_date": next }))?;
        }
    }
    Ok(())
}
