//! Scheduled-time breakdown by event type.
//!
//! Produces the per-type totals a caller needs to draw a chart of how
//! placed work is distributed; rendering is left to the caller.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schedule::{EventType, FlexibleItem, Placement};

/// Minutes scheduled for one event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTypeMinutes {
    pub event_type: EventType,
    /// Human label, e.g. "Study Session"
    pub label: String,
    pub minutes: i64,
    /// Fraction of all scheduled minutes (0.0 to 1.0)
    pub share: f64,
}

/// Minutes per event type across `placements`, sorted by event type.
///
/// Placements whose item is missing from `items` count as [`EventType::Other`].
pub fn time_by_event_type(placements: &[Placement], items: &[FlexibleItem]) -> Vec<EventTypeMinutes> {
    let types: BTreeMap<&str, EventType> = items
        .iter()
        .map(|item| (item.id.as_str(), item.event_type))
        .collect();

    summarize(placements.iter().map(|placement| {
        let event_type = types
            .get(placement.item_id.as_str())
            .copied()
            .unwrap_or_default();
        (event_type, placement.interval.duration_minutes())
    }))
}

/// Minutes per event type across the scheduled items in `items`.
pub fn item_time_by_event_type(items: &[FlexibleItem]) -> Vec<EventTypeMinutes> {
    summarize(items.iter().filter_map(|item| {
        item.placement()
            .map(|interval| (item.event_type, interval.duration_minutes()))
    }))
}

fn summarize(entries: impl Iterator<Item = (EventType, i64)>) -> Vec<EventTypeMinutes> {
    let mut totals: BTreeMap<EventType, i64> = BTreeMap::new();
    for (event_type, minutes) in entries {
        *totals.entry(event_type).or_insert(0) += minutes;
    }

    let total: i64 = totals.values().sum();
    totals
        .into_iter()
        .map(|(event_type, minutes)| EventTypeMinutes {
            event_type,
            label: event_type.label().to_string(),
            minutes,
            share: if total > 0 {
                minutes as f64 / total as f64
            } else {
                0.0
            },
        })
        .collect()
}

/// Total scheduled minutes.
pub fn scheduled_time(placements: &[Placement]) -> i64 {
    placements.iter().map(|p| p.interval.duration_minutes()).sum()
}
