use clap::Subcommand;
use intermission_core::Config;

use super::CliResult;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the whole config as TOML
    Show,
    /// Get a config value
    Get {
        /// Dot-separated key (e.g. "schedule.work_minutes")
        key: String,
    },
    /// Set a config value
    Set {
        /// Dot-separated key
        key: String,
        /// New value; structured values are given as JSON
        value: String,
    },
    /// Print the config file location
    Path,
}

pub fn run(action: ConfigAction, mut config: Config) -> CliResult {
    match action {
        ConfigAction::Show => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Get { key } => match config.get(&key) {
            Some(value) => println!("{value}"),
            None => return Err(format!("unknown config key: {key}").into()),
        },
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            println!("ok");
        }
        ConfigAction::Path => {
            println!("{}", config.path()?.display());
        }
    }
    Ok(())
}
