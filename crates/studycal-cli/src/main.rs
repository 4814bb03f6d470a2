use clap::{Parser, Subcommand};
use studycal_core::Config;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "studycal", version, about = "Study calendar rescheduling CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Task management
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Leave requests
    Leave {
        #[command(subcommand)]
        action: commands::leave::LeaveAction,
    },
    /// End-of-day processing
    Rollover {
        #[command(subcommand)]
        action: commands::rollover::RolloverAction,
    },
    /// Rest-day and work-date lookups
    Calendar {
        #[command(subcommand)]
        action: commands::calendar::CalendarAction,
    },
    /// Schedule history
    History {
        #[command(subcommand)]
        action: commands::history::HistoryAction,
    },
    /// Rescheduling thresholds
    Threshold {
        #[command(subcommand)]
        action: commands::threshold::ThresholdAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

/// Install the stderr log subscriber. `RUST_LOG` wins over the configured filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let configured = Config::load_or_default().logging.filter;
        EnvFilter::try_new(&configured).unwrap_or_else(|_| EnvFilter::new("studycal=info"))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let result = match cli.command {
        Commands::Task { action } => commands::task::run(action),
        Commands::Leave { action } => commands::leave::run(action),
        Commands::Rollover { action } => commands::rollover::run(action),
        Commands::Calendar { action } => commands::calendar::run(action),
        Commands::History { action } => commands::history::run(action),
        Commands::Threshold { action } => commands::threshold::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
