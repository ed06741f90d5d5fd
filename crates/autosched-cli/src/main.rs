use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "autosched-cli", version, about = "Autosched CLI")]
struct Cli {
    /// Config file (default: ~/.config/autosched/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Place pending items and print the allocation
    Plan {
        /// JSON file with horizon, fixed_events, preferences and items
        input: PathBuf,
    },
    /// Print free, preference-weighted windows
    Availability {
        /// JSON file with horizon, fixed_events, preferences and items
        input: PathBuf,
    },
    /// Plan, then print scheduled minutes by event type
    Stats {
        /// JSON file with horizon, fixed_events, preferences and items
        input: PathBuf,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("AUTOSCHED_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let config = cli.config;
    let result = match cli.command {
        Commands::Plan { input } => commands::plan::run_plan(config, &input),
        Commands::Availability { input } => commands::plan::run_availability(config, &input),
        Commands::Stats { input } => commands::stats::run(config, &input),
        Commands::Config { action } => commands::config::run(config, action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
