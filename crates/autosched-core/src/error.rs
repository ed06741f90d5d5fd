//! Core error types for autosched-core.
//!
//! This module defines the error hierarchy using thiserror. Scheduling
//! errors carry a stable machine-readable code so the calling layer can
//! render a reason without matching on display strings.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

use crate::interval::Interval;

/// Core error type for autosched-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Scheduling-related errors
    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What a rejected mutation collided with.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictSource {
    /// An occurrence of a fixed event
    FixedEvent { event_id: String, interval: Interval },
    /// Another committed placement
    Placement { item_id: String, interval: Interval },
}

/// Errors raised by the interval model, the expander and the mutation gateway.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScheduleError {
    /// Malformed interval
    #[error("Invalid interval: end ({end}) must be after start ({start})")]
    InvalidInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Malformed or empty expansion horizon
    #[error("Invalid horizon: to ({to}) must be after from ({from})")]
    InvalidHorizon {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    /// Mutation would break the no-overlap invariant
    #[error("Placement of '{item_id}' at {target} overlaps {conflict:?}")]
    OverlapConflict {
        item_id: String,
        target: Interval,
        conflict: ConflictSource,
    },

    /// Manual placement ends after the item's deadline
    #[error("Placement of '{item_id}' ends at {end}, after deadline {deadline}")]
    PastDeadline {
        item_id: String,
        end: DateTime<Utc>,
        deadline: DateTime<Utc>,
    },

    /// No flexible item with this id
    #[error("Unknown item: {0}")]
    UnknownItem(String),

    /// No fixed event with this id
    #[error("Unknown fixed event: {0}")]
    UnknownEvent(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// A per-user lock was poisoned by a panicking holder
    #[error("Schedule lock poisoned for user '{0}'")]
    LockPoisoned(String),
}

impl ScheduleError {
    /// Stable reason code for the caller.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInterval { .. } => "INVALID_INTERVAL",
            Self::InvalidHorizon { .. } => "INVALID_HORIZON",
            Self::OverlapConflict { .. } => "OVERLAP_CONFLICT",
            Self::PastDeadline { .. } => "PAST_DEADLINE",
            Self::UnknownItem(_) => "UNKNOWN_ITEM",
            Self::UnknownEvent(_) => "UNKNOWN_EVENT",
            Self::InvalidValue { .. } => "INVALID_VALUE",
            Self::LockPoisoned(_) => "LOCK_POISONED",
        }
    }

    /// Whether the caller can recover by changing its request.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::LockPoisoned(_))
    }

    pub(crate) fn invalid_value(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Home directory could not be resolved
    #[error("Could not determine configuration directory")]
    NoConfigDir,
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
