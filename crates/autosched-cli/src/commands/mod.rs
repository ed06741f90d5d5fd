pub mod config;
pub mod plan;
pub mod stats;

use std::path::{Path, PathBuf};

use autosched_core::{EngineConfig, PlanInput, Planner};

/// Explicit `--config` path, or the default location.
pub fn config_path(explicit: Option<PathBuf>) -> Result<PathBuf, Box<dyn std::error::Error>> {
    match explicit {
        Some(path) => Ok(path),
        None => Ok(EngineConfig::path()?),
    }
}

pub fn load_config(explicit: Option<PathBuf>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    Ok(EngineConfig::load_from(&config_path(explicit)?)?)
}

/// Planner configured from the config file, plus the parsed input.
pub fn load_plan(
    explicit: Option<PathBuf>,
    input: &Path,
) -> Result<(Planner, PlanInput), Box<dyn std::error::Error>> {
    let planner = Planner::from_config(&load_config(explicit)?)?;
    let plan = PlanInput::load(input)?;
    Ok((planner, plan))
}
