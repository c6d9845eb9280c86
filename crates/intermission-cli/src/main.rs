use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "intermission", version, about = "Work/break scheduler that waits for you to go idle")]
struct Cli {
    /// Config file (defaults to ~/.config/intermission/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the schedule, reading commands from stdin and printing status as JSON lines
    Run,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Inspect the effective schedule
    Schedule {
        #[command(subcommand)]
        action: commands::schedule::ScheduleAction,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match commands::load_config(cli.config.as_deref()) {
        Ok(config) => {
            commands::init_tracing(&config.log_filter);
            match cli.command {
                Commands::Run => commands::run::run(config).await,
                Commands::Config { action } => commands::config::run(action, config),
                Commands::Schedule { action } => commands::schedule::run(action, &config),
            }
        }
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
