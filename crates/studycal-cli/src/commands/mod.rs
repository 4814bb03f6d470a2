pub mod calendar;
pub mod config;
pub mod history;
pub mod leave;
pub mod rollover;
pub mod task;
pub mod threshold;

use serde::Serialize;
use studycal_core::storage::CalendarDb;
use studycal_core::{Config, RescheduleEngine};

/// Open the calendar and wrap it in an engine configured from `config.toml`.
pub fn open_engine() -> Result<RescheduleEngine, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = CalendarDb::open()?;
    Ok(RescheduleEngine::with_config(db, &config.engine))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
