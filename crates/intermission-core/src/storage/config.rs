//! TOML-based application configuration.
//!
//! Stores:
//! - The generated work/break schedule, or a custom one
//! - The named activity indicators and their inactivity thresholds
//! - The default log filter
//!
//! Configuration is stored at `~/.config/intermission/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use super::data_dir;
use crate::error::{ConfigError, CoreError, Result};
use crate::timer::{CycleConfig, Schedule};

/// Generated-schedule configuration, in minutes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_work_minutes")]
    pub work_minutes: u64,
    #[serde(default = "default_short_break_minutes")]
    pub short_break_minutes: u64,
    #[serde(default = "default_long_break_minutes")]
    pub long_break_minutes: u64,
    #[serde(default = "default_cycles_before_long_break")]
    pub cycles_before_long_break: u64,
}

/// One named activity indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    pub name: String,
    pub threshold_secs: u64,
}

impl ThresholdConfig {
    pub fn threshold(&self) -> Duration {
        Duration::from_secs(self.threshold_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InactivityConfig {
    #[serde(default = "default_thresholds")]
    pub thresholds: Vec<ThresholdConfig>,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/intermission/config.toml`, or at the
/// path it was loaded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Explicit schedule, used instead of the generated one.
    #[serde(default)]
    pub custom_schedule: Option<Schedule>,
    #[serde(default)]
    pub inactivity: InactivityConfig,
    /// `tracing` filter used when INTERMISSION_LOG is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(skip)]
    location: Option<PathBuf>,
}

// Default functions
fn default_work_minutes() -> u64 {
    25
}
fn default_short_break_minutes() -> u64 {
    5
}
fn default_long_break_minutes() -> u64 {
    15
}
fn default_cycles_before_long_break() -> u64 {
    4
}
fn default_thresholds() -> Vec<ThresholdConfig> {
    ["keyboard", "mouse"]
        .into_iter()
        .map(|name| ThresholdConfig {
            name: name.to_string(),
            threshold_secs: 30,
        })
        .collect()
}
fn default_log_filter() -> String {
    "info".into()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            work_minutes: default_work_minutes(),
            short_break_minutes: default_short_break_minutes(),
            long_break_minutes: default_long_break_minutes(),
            cycles_before_long_break: default_cycles_before_long_break(),
        }
    }
}

impl Default for InactivityConfig {
    fn default() -> Self {
        Self {
            thresholds: default_thresholds(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schedule: ScheduleConfig::default(),
            custom_schedule: None,
            inactivity: InactivityConfig::default(),
            log_filter: default_log_filter(),
            location: None,
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> std::result::Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let existing = obj.get(part).ok_or_else(unknown)?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => value
                        .parse::<u64>()
                        .map(|n| serde_json::Value::Number(n.into()))
                        .map_err(|_| invalid(format!("cannot parse '{value}' as a whole number")))?,
                    serde_json::Value::Object(_)
                    | serde_json::Value::Array(_)
                    | serde_json::Value::Null => {
                        serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                    }
                    serde_json::Value::String(_) => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    /// Default location of the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined or created.
    pub fn default_path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Where [`save`](Self::save) writes.
    ///
    /// # Errors
    ///
    /// Same as [`default_path`](Self::default_path) when no file was loaded.
    pub fn path(&self) -> Result<PathBuf> {
        match &self.location {
            Some(path) => Ok(path.clone()),
            None => Self::default_path(),
        }
    }

    /// Load from the default location, writing defaults there if missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load from `path`, writing defaults there if missing. Later saves go
    /// back to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::LoadFailed`] if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        let load_failed = |message: String| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message,
        };
        let mut cfg = match std::fs::read_to_string(path) {
            Ok(content) => {
                toml::from_str::<Config>(&content).map_err(|e| load_failed(e.to_string()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut cfg = Self::default();
                cfg.location = Some(path.to_path_buf());
                cfg.save()?;
                cfg
            }
            Err(e) => return Err(load_failed(e.to_string()).into()),
        };
        cfg.location = Some(path.to_path_buf());
        Ok(cfg)
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<()> {
        let path = self.path()?;
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key and save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// the result is not a valid config, or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let mut updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        if let Some(custom) = &updated.custom_schedule {
            custom.validate().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        }
        updated.location = self.location.take();
        *self = updated;
        self.save()
    }

    /// The schedule the engine runs: the custom one if set and valid,
    /// otherwise one generated from [`ScheduleConfig`].
    pub fn schedule(&self) -> Schedule {
        if let Some(custom) = &self.custom_schedule {
            match custom.validate() {
                Ok(()) => return custom.clone(),
                Err(e) => warn!(error = %e, "ignoring invalid custom schedule"),
            }
        }

        let s = &self.schedule;
        let cycles = s.cycles_before_long_break.max(1);
        let generated = (1..=cycles)
            .map(|i| {
                let break_min = if i == cycles {
                    s.long_break_minutes
                } else {
                    s.short_break_minutes
                };
                CycleConfig::from_minutes(s.work_minutes, break_min)
            })
            .collect();
        Schedule::new(generated).unwrap_or_else(|e| {
            warn!(error = %e, "invalid schedule settings, using the classic schedule");
            Schedule::classic()
        })
    }

    /// Configured activity indicators as `(name, threshold)`.
    pub fn thresholds(&self) -> Vec<(String, Duration)> {
        self.inactivity
            .thresholds
            .iter()
            .map(|t| (t.name.clone(), t.threshold()))
            .collect()
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            warn!(error = %e, "using default configuration");
            Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn missing_sections_take_defaults() {
        let parsed: Config = toml::from_str("log_filter = \"debug\"\n").unwrap();
        assert_eq!(parsed.log_filter, "debug");
        assert_eq!(parsed.schedule, ScheduleConfig::default());
        assert_eq!(parsed.inactivity.thresholds.len(), 2);
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("schedule.work_minutes").as_deref(), Some("25"));
        assert_eq!(cfg.get("log_filter").as_deref(), Some("info"));
        assert_eq!(cfg.get("custom_schedule").as_deref(), Some("null"));
        assert!(cfg.get("schedule.missing_key").is_none());
        assert!(cfg.get("").is_none());
    }

    #[test]
    fn set_json_value_by_path_updates_nested_number() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        Config::set_json_value_by_path(&mut json, "schedule.work_minutes", "50").unwrap();
        assert_eq!(
            Config::get_json_value_by_path(&json, "schedule.work_minutes").unwrap(),
            &serde_json::Value::Number(50.into())
        );
    }

    #[test]
    fn set_json_value_by_path_updates_structured_value() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        Config::set_json_value_by_path(
            &mut json,
            "custom_schedule",
            r#"{"cycles":[{"work_length_secs":60,"break_length_secs":30}]}"#,
        )
        .unwrap();
        let cfg: Config = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.schedule().cycles, vec![CycleConfig::new(60, 30)]);
    }

    #[test]
    fn set_json_value_by_path_rejects_unknown_key() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        let result = Config::set_json_value_by_path(&mut json, "schedule.nonexistent", "1");
        assert!(matches!(result, Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn set_json_value_by_path_rejects_invalid_type() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        let result = Config::set_json_value_by_path(&mut json, "schedule.work_minutes", "soon");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn generated_schedule_ends_with_long_break() {
        let schedule = Config::default().schedule();
        assert_eq!(schedule, Schedule::classic());
        assert_eq!(schedule.cycles[3], CycleConfig::from_minutes(25, 15));
    }

    #[test]
    fn zero_minutes_fall_back_to_classic() {
        let mut cfg = Config::default();
        cfg.schedule.work_minutes = 0;
        assert_eq!(cfg.schedule(), Schedule::classic());
    }

    #[test]
    fn invalid_custom_schedule_is_ignored() {
        let cfg = Config {
            custom_schedule: Some(Schedule { cycles: vec![] }),
            ..Config::default()
        };
        assert_eq!(cfg.schedule(), Schedule::classic());
    }

    #[test]
    fn thresholds_default_to_keyboard_and_mouse() {
        let names: Vec<_> = Config::default()
            .thresholds()
            .into_iter()
            .map(|(name, threshold)| {
                assert_eq!(threshold, Duration::from_secs(30));
                name
            })
            .collect();
        assert_eq!(names, vec!["keyboard", "mouse"]);
    }

    #[test]
    fn load_from_writes_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg.schedule(), Schedule::classic());
        assert_eq!(cfg.log_filter, "info");
        assert!(path.exists());
        assert_eq!(cfg.path().unwrap(), path);
    }

    #[test]
    fn set_persists_to_the_loaded_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = Config::load_from(&path).unwrap();
        cfg.set("schedule.short_break_minutes", "7").unwrap();
        cfg.set("log_filter", "intermission_core=debug").unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.schedule.short_break_minutes, 7);
        assert_eq!(reloaded.log_filter, "intermission_core=debug");
    }

    #[test]
    fn set_rejects_invalid_custom_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = Config::load_from(&path).unwrap();
        let result = cfg.set("custom_schedule", r#"{"cycles":[]}"#);
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::InvalidValue { .. }))
        ));
        assert!(cfg.custom_schedule.is_none());
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "schedule = 3").unwrap();
        let result = Config::load_from(&path);
        assert!(matches!(
            result,
            Err(CoreError::Config(ConfigError::LoadFailed { .. }))
        ));
    }
}
