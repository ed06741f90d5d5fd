use std::path::PathBuf;

use autosched_core::{ConfigError, EngineConfig};
use clap::Subcommand;

use super::config_path;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Dot-separated key (e.g. "allocator.buffer_minutes")
        key: String,
    },
    /// Set a config value
    Set {
        /// Dot-separated key
        key: String,
        /// New value ("none" clears an optional value)
        value: String,
    },
    /// List all config values
    List,
    /// Print the config file location
    Path,
    /// Reset config to defaults
    Reset,
}

pub fn run(config: Option<PathBuf>, action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path(config)?;
    match action {
        ConfigAction::Get { key } => {
            let config = EngineConfig::load_from(&path)?;
            let value = config.get(&key).ok_or(ConfigError::UnknownKey(key))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            let mut config = EngineConfig::load_from(&path)?;
            config.set(&key, &value)?;
            config.save_to(&path)?;
            tracing::info!(path = %path.display(), key = %key, "config updated");
            println!("ok");
        }
        ConfigAction::List => {
            let config = EngineConfig::load_from(&path)?;
            for (key, value) in config.entries() {
                println!("{key} = {value}");
            }
        }
        ConfigAction::Path => {
            println!("{}", path.display());
        }
        ConfigAction::Reset => {
            EngineConfig::default().save_to(&path)?;
            tracing::info!(path = %path.display(), "config reset");
            println!("config reset to defaults");
        }
    }
    Ok(())
}
