mod config;

pub use config::{Config, InactivityConfig, ScheduleConfig, ThresholdConfig};

use std::path::PathBuf;

use crate::error::{ConfigError, CoreError};

/// Returns `~/.config/intermission[-dev]/` based on INTERMISSION_ENV.
///
/// Set INTERMISSION_ENV=dev to use the development directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, CoreError> {
    let base_dir = dirs::home_dir().ok_or(ConfigError::NoConfigDir)?.join(".config");

    let env = std::env::var("INTERMISSION_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("intermission-dev")
    } else {
        base_dir.join("intermission")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
