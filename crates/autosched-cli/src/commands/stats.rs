use std::path::{Path, PathBuf};

use autosched_core::{item_time_by_event_type, EventTypeMinutes};
use serde::Serialize;

use super::load_plan;

#[derive(Serialize)]
struct StatsOutput {
    total_minutes: i64,
    by_event_type: Vec<EventTypeMinutes>,
}

/// Plan the input, then report scheduled minutes including items placed beforehand.
pub fn run(config: Option<PathBuf>, input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (planner, plan) = load_plan(config, input)?;
    let items = planner.plan_items(&plan)?;

    let by_event_type = item_time_by_event_type(&items);
    let output = StatsOutput {
        total_minutes: by_event_type.iter().map(|e| e.minutes).sum(),
        by_event_type,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
