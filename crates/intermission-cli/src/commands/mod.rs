pub mod config;
pub mod run;
pub mod schedule;

use std::path::Path;

use intermission_core::{Config, CoreError};
use tracing_subscriber::EnvFilter;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

pub fn load_config(path: Option<&Path>) -> Result<Config, CoreError> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

/// Log to stderr so stdout stays machine-readable. INTERMISSION_LOG wins
/// over the configured filter.
pub fn init_tracing(config_filter: &str) {
    let filter = std::env::var("INTERMISSION_LOG").unwrap_or_else(|_| config_filter.to_string());
    let filter = EnvFilter::try_new(&filter).unwrap_or_else(|e| {
        eprintln!("invalid log filter '{filter}': {e}");
        EnvFilter::new("info")
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
