//! Slot allocator for flexible items.
//!
//! Places pending items into availability windows:
//! - Processes items by ascending deadline, descending priority, ascending id
//! - Picks the highest-weighted window that still fits the item before its deadline
//! - Packs each window from the left; earlier placements are never revisited
//! - Places each chunk of a split item on its own
//! - Records `NoFeasibleWindow` on items that fit nowhere and carries on
//!
//! This is a greedy heuristic: a later, more important item never displaces
//! one placed earlier in the same run.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{Duration, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::availability::AvailabilityWindow;
use crate::interval::{subtract, Interval};
use crate::schedule::{
    split_items, FlexibleItem, ItemStatus, Placement, PlacementSource, UnscheduledReason,
};

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Offset that defines local days for the daily cap and item time bands
    pub offset: FixedOffset,
    /// Gap consumed after each placement inside its window
    pub buffer: Duration,
    /// Cap on placed item time per local day, committed placements included
    pub max_per_day: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            offset: Utc.fix(),
            buffer: Duration::zero(),
            max_per_day: None,
        }
    }
}

/// Outcome for one item in a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub item_id: String,
    pub status: ItemStatus,
}

/// Result of one allocation run, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub decisions: Vec<Decision>,
}

impl Allocation {
    /// Placements made in this run, in processing order.
    pub fn placements(&self) -> Vec<Placement> {
        self.decisions
            .iter()
            .filter_map(|d| match d.status {
                ItemStatus::Scheduled { interval } => Some(Placement {
                    item_id: d.item_id.clone(),
                    interval,
                    source: PlacementSource::Auto,
                }),
                _ => None,
            })
            .collect()
    }

    /// Items that could not be placed, with the reason.
    pub fn unschedulable(&self) -> Vec<(&str, UnscheduledReason)> {
        self.decisions
            .iter()
            .filter_map(|d| match d.status {
                ItemStatus::Unschedulable { reason } => Some((d.item_id.as_str(), reason)),
                _ => None,
            })
            .collect()
    }

    pub fn scheduled_count(&self) -> usize {
        self.decisions
            .iter()
            .filter(|d| matches!(d.status, ItemStatus::Scheduled { .. }))
            .count()
    }

    /// Write the decided statuses back onto matching items.
    pub fn apply(&self, items: &mut [FlexibleItem]) {
        let by_id: BTreeMap<&str, ItemStatus> = self
            .decisions
            .iter()
            .map(|d| (d.item_id.as_str(), d.status))
            .collect();
        for item in items.iter_mut() {
            if let Some(status) = by_id.get(item.id.as_str()) {
                item.status = *status;
            }
        }
    }
}

/// Remaining free space of one window during a run.
#[derive(Debug, Clone)]
struct WindowState {
    free: Vec<Interval>,
}

impl WindowState {
    /// Earliest slot of `length` inside both the free space and one of `bounds`.
    ///
    /// `bounds` must be sorted by start and disjoint.
    fn first_fit(&self, length: Duration, bounds: &[Interval]) -> Option<Interval> {
        self.free.iter().find_map(|segment| {
            bounds.iter().find_map(|bound| {
                let room = segment.intersection(bound)?;
                let slot = Interval::starting_at(room.start(), length).ok()?;
                (slot.end() <= room.end()).then_some(slot)
            })
        })
    }

    fn consume(&mut self, used: Interval) {
        self.free = self
            .free
            .iter()
            .flat_map(|segment| {
                if segment.overlaps(&used) {
                    subtract(segment, &[used])
                } else {
                    vec![*segment]
                }
            })
            .collect();
    }
}

/// Automatic slot allocator for flexible items
#[derive(Debug, Clone, Default)]
pub struct SlotAllocator {
    config: SchedulerConfig,
}

impl SlotAllocator {
    /// Create a new allocator with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom config
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Pending items in scheduling order, split items expanded into chunks.
    pub fn queue(&self, items: &[FlexibleItem]) -> Vec<FlexibleItem> {
        let mut queue: Vec<FlexibleItem> = split_items(items)
            .into_iter()
            .filter(FlexibleItem::is_pending)
            .collect();
        queue.sort_by(queue_order);
        queue
    }

    /// Place every pending item into `windows`.
    ///
    /// Same as [`SlotAllocator::allocate_with_committed`] with nothing committed.
    pub fn allocate(&self, windows: &[AvailabilityWindow], items: &[FlexibleItem]) -> Allocation {
        self.allocate_with_committed(windows, items, &[])
    }

    /// Place every pending item into `windows`.
    ///
    /// # Arguments
    /// * `windows` - Availability windows for this run, ordered by start; read-only
    /// * `items` - Items to consider; only `Pending` ones are placed
    /// * `committed` - Placements made before this run; they count toward the daily cap
    ///
    /// # Returns
    /// One decision per pending item (per chunk for split items), in processing order
    pub fn allocate_with_committed(
        &self,
        windows: &[AvailabilityWindow],
        items: &[FlexibleItem],
        committed: &[Interval],
    ) -> Allocation {
        let mut state: Vec<WindowState> = windows
            .iter()
            .map(|w| WindowState {
                free: vec![w.interval],
            })
            .collect();
        let mut used_per_day: BTreeMap<NaiveDate, Duration> = BTreeMap::new();
        for interval in committed {
            let day = interval.start().with_timezone(&self.config.offset).date_naive();
            *used_per_day.entry(day).or_insert_with(Duration::zero) += interval.duration();
        }
        let mut allocation = Allocation::default();

        for item in self.queue(items) {
            let status = match self.place(&item, windows, &mut state, &mut used_per_day) {
                Ok(interval) => {
                    tracing::debug!(item = %item.id, %interval, "placed item");
                    ItemStatus::Scheduled { interval }
                }
                Err(reason) => {
                    tracing::warn!(item = %item.id, reason = reason.code(), "item unschedulable");
                    ItemStatus::Unschedulable { reason }
                }
            };
            allocation.decisions.push(Decision {
                item_id: item.id.clone(),
                status,
            });
        }

        tracing::info!(
            windows = windows.len(),
            considered = allocation.decisions.len(),
            scheduled = allocation.scheduled_count(),
            "allocation run finished"
        );
        allocation
    }

    fn place(
        &self,
        item: &FlexibleItem,
        windows: &[AvailabilityWindow],
        state: &mut [WindowState],
        used_per_day: &mut BTreeMap<NaiveDate, Duration>,
    ) -> Result<Interval, UnscheduledReason> {
        if item.chunk_count().is_none() {
            return Err(UnscheduledReason::InvalidDuration);
        }
        let length = item
            .duration()
            .filter(|d| *d > Duration::zero())
            .ok_or(UnscheduledReason::InvalidDuration)?;
        if item.not_before.is_some_and(|nb| nb >= item.deadline) {
            return Err(UnscheduledReason::DeadlineBeforeEarliestStart);
        }

        let mut best: Option<(usize, Interval, f64)> = None;
        for (idx, window) in windows.iter().enumerate() {
            if let Some(cap) = self.config.max_per_day {
                let used = used_per_day.get(&window.date).copied().unwrap_or_else(Duration::zero);
                if used.checked_add(&length).map_or(true, |total| total > cap) {
                    continue;
                }
            }
            let bounds = self.item_bounds(item, window);
            let Some(slot) = state[idx].first_fit(length, &bounds) else {
                continue;
            };

            let weight = window.weight_for(item.event_type);
            let better = match &best {
                None => true,
                Some((best_idx, best_slot, best_weight)) => match weight.total_cmp(best_weight) {
                    Ordering::Greater => true,
                    Ordering::Less => false,
                    Ordering::Equal => {
                        (window.interval.start(), slot.start())
                            < (windows[*best_idx].interval.start(), best_slot.start())
                    }
                },
            };
            if better {
                best = Some((idx, slot, weight));
            }
        }

        let (idx, slot, _) = best.ok_or(UnscheduledReason::NoFeasibleWindow)?;
        let window_end = windows[idx].interval.end();
        let reserved_end = slot
            .end()
            .checked_add_signed(self.config.buffer)
            .map_or(window_end, |end| end.min(window_end));
        let reserved = Interval::new(slot.start(), reserved_end).unwrap_or(slot);
        state[idx].consume(reserved);
        *used_per_day.entry(windows[idx].date).or_insert_with(Duration::zero) += length;
        Ok(slot)
    }

    /// Parts of `window` the item may occupy: after `not_before`, before the
    /// deadline and, when the item has one, inside its daily time band.
    fn item_bounds(&self, item: &FlexibleItem, window: &AvailabilityWindow) -> Vec<Interval> {
        let lo = item
            .not_before
            .map_or(window.interval.start(), |nb| nb.max(window.interval.start()));
        let hi = item.deadline.min(window.interval.end());
        let Ok(base) = Interval::new(lo, hi) else {
            return Vec::new();
        };
        match item.time_window {
            None => vec![base],
            // Yesterday's band may wrap past midnight into this window.
            Some(band) => [window.date.pred_opt(), Some(window.date)]
                .into_iter()
                .flatten()
                .filter_map(|day| band.span_on(day, self.config.offset))
                .filter_map(|span| span.intersection(&base))
                .collect(),
        }
    }
}

/// Scheduling order: ascending deadline, descending priority, ascending id.
pub fn queue_order(a: &FlexibleItem, b: &FlexibleItem) -> Ordering {
    a.deadline
        .cmp(&b.deadline)
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| a.id.cmp(&b.id))
}
