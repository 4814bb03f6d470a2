mod config;
pub mod calendar_db;
pub mod migrations;
pub mod store;

pub use calendar_db::{CalendarDb, ImportSummary, ResetSummary};
pub use config::{Config, EngineConfig, LoggingConfig};
pub use store::{CalendarStore, LeaveRecord, MarkerClaim};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the studycal data directory, creating it if needed.
///
/// `STUDYCAL_DATA_DIR` overrides the location outright. Otherwise this is
/// `~/.config/studycal[-dev]/`, with `STUDYCAL_ENV=dev` selecting the
/// development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("STUDYCAL_DATA_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");

            let env = std::env::var("STUDYCAL_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("studycal-dev")
            } else {
                base_dir.join("studycal")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
