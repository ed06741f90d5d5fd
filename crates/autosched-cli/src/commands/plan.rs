use std::path::{Path, PathBuf};

use autosched_core::{split_items, FlexibleItem, Placement, UnschedulableItem};
use serde::Serialize;

use super::load_plan;

#[derive(Serialize)]
struct PlanOutput {
    placements: Vec<Placement>,
    unschedulable: Vec<UnschedulableItem>,
    items: Vec<FlexibleItem>,
}

pub fn run_plan(config: Option<PathBuf>, input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (planner, plan) = load_plan(config, input)?;
    let allocation = planner.plan(&plan)?;

    let mut items = split_items(&plan.items);
    allocation.apply(&mut items);
    let output = PlanOutput {
        placements: allocation.placements(),
        unschedulable: allocation
            .unschedulable()
            .into_iter()
            .map(|(item_id, reason)| UnschedulableItem {
                item_id: item_id.to_string(),
                reason,
            })
            .collect(),
        items,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub fn run_availability(
    config: Option<PathBuf>,
    input: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let (planner, plan) = load_plan(config, input)?;
    let windows = planner.availability(&plan)?;
    println!("{}", serde_json::to_string_pretty(&windows)?);
    Ok(())
}
