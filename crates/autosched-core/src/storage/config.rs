//! TOML-based engine configuration.
//!
//! Stores scheduling knobs including:
//! - The fixed UTC offset and active hours that define local days
//! - Minimum availability window length
//! - Allocator buffer and daily cap
//! - Undo history depth
//!
//! Configuration is stored at `~/.config/autosched/config.toml`.

use std::path::{Path, PathBuf};

use chrono::{Duration, FixedOffset};
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::availability::AvailabilitySettings;
use crate::error::ConfigError;
use crate::scheduler::SchedulerConfig;
use crate::schedule::TimeWindow;

/// Calendar configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Minutes east of UTC used for local days, weekdays and times of day.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Active hours start, "HH:MM". Unset means midnight.
    #[serde(default)]
    pub day_start: Option<String>,
    /// Active hours end, "HH:MM". Unset means end of day.
    #[serde(default)]
    pub day_end: Option<String>,
}

/// Availability configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityConfig {
    /// Free pieces shorter than this are dropped; 0 keeps them all.
    #[serde(default = "default_min_window_minutes")]
    pub min_window_minutes: u32,
}

/// Allocator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocatorConfig {
    #[serde(default)]
    pub buffer_minutes: u32,
    #[serde(default)]
    pub max_minutes_per_day: Option<u32>,
}

/// Undo/redo configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Snapshots kept per user; 0 disables undo.
    #[serde(default = "default_undo_depth")]
    pub undo_depth: usize,
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/autosched/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub availability: AvailabilityConfig,
    #[serde(default)]
    pub allocator: AllocatorConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

// Default functions
fn default_min_window_minutes() -> u32 {
    0
}
fn default_undo_depth() -> usize {
    20
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            day_start: None,
            day_end: None,
        }
    }
}

impl Default for AvailabilityConfig {
    fn default() -> Self {
        Self {
            min_window_minutes: default_min_window_minutes(),
        }
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            buffer_minutes: 0,
            max_minutes_per_day: None,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            undo_depth: default_undo_depth(),
        }
    }
}

impl EngineConfig {
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
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;
            let new_value = match existing {
                serde_json::Value::Bool(_) => value
                    .parse::<bool>()
                    .map(serde_json::Value::Bool)
                    .map_err(|e| invalid(e.to_string()))?,
                serde_json::Value::Number(_) => parse_number(value).ok_or_else(|| {
                    invalid(format!("cannot parse '{value}' as number"))
                })?,
                // Unset optional: numbers stay numbers, "none" clears.
                serde_json::Value::Null => {
                    if value.eq_ignore_ascii_case("none") {
                        serde_json::Value::Null
                    } else {
                        parse_number(value)
                            .unwrap_or_else(|| serde_json::Value::String(value.into()))
                    }
                }
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    return Err(invalid("cannot overwrite a section".into()));
                }
                serde_json::Value::String(_) => {
                    if value.eq_ignore_ascii_case("none") {
                        serde_json::Value::Null
                    } else {
                        serde_json::Value::String(value.into())
                    }
                }
            };

            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    /// Default config file location.
    ///
    /// # Errors
    /// Returns an error if the config directory cannot be resolved or created.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from `path`, returning the default config when the file is absent.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read, parsed or validated.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let load_failed = |message: String| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message,
        };

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(load_failed(e.to_string())),
        };
        let cfg: EngineConfig = toml::from_str(&content).map_err(|e| load_failed(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Persist to `path`, creating parent directories as needed.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };

        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| save_failed(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Load from the default location, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        match Self::path().and_then(|p| Self::load_from(&p)) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "falling back to default config");
                Self::default()
            }
        }
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    /// Returns the first invalid value found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.offset()?;
        self.active_hours()?;
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

    /// Set a config value by key. The result is validated but not saved.
    ///
    /// # Errors
    /// Returns an error if the key is unknown or the value is invalid for it.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: EngineConfig =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Every leaf key with its current value, sorted by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&key, v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out.sort();
        out
    }

    /// Offset defining local days.
    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        FixedOffset::east_opt(self.calendar.utc_offset_minutes.saturating_mul(60)).ok_or_else(|| {
            ConfigError::InvalidValue {
                key: "calendar.utc_offset_minutes".into(),
                message: "must be within +/-24h".into(),
            }
        })
    }

    /// Active hours applied to every day; `None` when neither bound is set.
    pub fn active_hours(&self) -> Result<Option<TimeWindow>, ConfigError> {
        let (start, end) = match (&self.calendar.day_start, &self.calendar.day_end) {
            (None, None) => return Ok(None),
            (start, end) => (
                start.as_deref().unwrap_or("00:00"),
                end.as_deref().unwrap_or("24:00"),
            ),
        };
        let invalid = |message: String| ConfigError::InvalidValue {
            key: "calendar.day_start".into(),
            message,
        };
        let window = TimeWindow::parse(start, end).map_err(|e| invalid(e.to_string()))?;
        if window.wraps_midnight() {
            return Err(invalid(format!("day_start {start} must be before day_end {end}")));
        }
        Ok(Some(window))
    }

    /// Settings for the availability calculator.
    pub fn availability_settings(&self) -> Result<AvailabilitySettings, ConfigError> {
        Ok(AvailabilitySettings {
            offset: self.offset()?,
            active_hours: self.active_hours()?,
            min_window: Duration::minutes(i64::from(self.availability.min_window_minutes)),
        })
    }

    /// Settings for the slot allocator.
    pub fn scheduler_config(&self) -> Result<SchedulerConfig, ConfigError> {
        Ok(SchedulerConfig {
            offset: self.offset()?,
            buffer: Duration::minutes(i64::from(self.allocator.buffer_minutes)),
            max_per_day: self
                .allocator
                .max_minutes_per_day
                .map(|m| Duration::minutes(i64::from(m))),
        })
    }
}

fn parse_number(value: &str) -> Option<serde_json::Value> {
    if let Ok(n) = value.parse::<i64>() {
        Some(serde_json::Value::Number(n.into()))
    } else {
        value
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
    }
}
