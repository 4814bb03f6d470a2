use clap::Subcommand;

use super::{open_engine, print_json};

#[derive(Subcommand)]
pub enum HistoryAction {
    /// List recent schedule changes, newest first
    List {
        /// Student ID
        #[arg(long)]
        student: String,
        /// Maximum entries to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub fn run(action: HistoryAction) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine()?;

    match action {
        HistoryAction::List { student, limit } => {
            let entries = engine.db().history(&student, limit)?;
            print_json(&entries)?;
        }
    }
    Ok(())
}
