//! Per-user schedule state and the locks that serialize access to it.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::{ConflictSource, ScheduleError};
use crate::interval::{Horizon, Interval};
use crate::recurrence::RecurrenceExpander;
use crate::schedule::{FixedEvent, FlexibleItem, ItemStatus, Placement, PlacementSource, Preference};
use crate::stats::{time_by_event_type, EventTypeMinutes};

/// One user's authoritative schedule.
///
/// # Invariants
/// An item is `Scheduled { interval }` exactly when `placements` holds a
/// placement for it with that interval, and no two placements (nor a
/// placement and a fixed-event occurrence) overlap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSchedule {
    #[serde(default)]
    pub horizon: Option<Horizon>,
    #[serde(default)]
    pub fixed_events: BTreeMap<String, FixedEvent>,
    #[serde(default)]
    pub preferences: Vec<Preference>,
    #[serde(default)]
    pub items: BTreeMap<String, FlexibleItem>,
    #[serde(default)]
    pub placements: BTreeMap<String, Placement>,
}

impl UserSchedule {
    /// Placements ordered by interval.
    pub fn placements(&self) -> Vec<Placement> {
        let mut placements: Vec<Placement> = self.placements.values().cloned().collect();
        placements.sort_by(|a, b| a.interval.cmp(&b.interval).then_with(|| a.item_id.cmp(&b.item_id)));
        placements
    }

    pub fn fixed_events(&self) -> Vec<FixedEvent> {
        self.fixed_events.values().cloned().collect()
    }

    pub fn items(&self) -> Vec<FlexibleItem> {
        self.items.values().cloned().collect()
    }

    /// Scheduled minutes per event type.
    pub fn time_by_event_type(&self) -> Vec<EventTypeMinutes> {
        time_by_event_type(&self.placements(), &self.items())
    }

    /// First fixed occurrence or other placement that `target` would collide with.
    ///
    /// Placements of `item_id` itself are ignored.
    pub fn find_conflict(
        &self,
        item_id: &str,
        target: Interval,
        offset: FixedOffset,
    ) -> Result<Option<ConflictSource>, ScheduleError> {
        let span = Horizon::covering(target);
        let mut hit: Option<(Interval, String)> = None;
        for event in self.fixed_events.values() {
            if let Some(occ) = RecurrenceExpander::new(event, span, offset)?.occurrences().next() {
                let candidate = (occ.interval, occ.event_id);
                if hit.as_ref().map_or(true, |h| candidate < *h) {
                    hit = Some(candidate);
                }
            }
        }
        if let Some((interval, event_id)) = hit {
            return Ok(Some(ConflictSource::FixedEvent { event_id, interval }));
        }

        Ok(self
            .placements()
            .into_iter()
            .find(|p| p.item_id != item_id && p.interval.overlaps(&target))
            .map(|p| ConflictSource::Placement {
                item_id: p.item_id,
                interval: p.interval,
            }))
    }

    pub(crate) fn commit_placement(&mut self, item_id: &str, interval: Interval, source: PlacementSource) {
        if let Some(item) = self.items.get_mut(item_id) {
            item.status = ItemStatus::Scheduled { interval };
        }
        self.placements.insert(
            item_id.to_string(),
            Placement {
                item_id: item_id.to_string(),
                interval,
                source,
            },
        );
    }

    /// Drop the placement of `item_id` and return the item to the queue.
    pub(crate) fn clear_placement(&mut self, item_id: &str) -> Option<Placement> {
        if let Some(item) = self.items.get_mut(item_id) {
            item.status = ItemStatus::Pending;
        }
        self.placements.remove(item_id)
    }

    /// Remove `item_id`, any chunks split from it, and their placements.
    ///
    /// Returns `false` when nothing matched.
    pub(crate) fn remove_item(&mut self, item_id: &str) -> bool {
        let doomed: Vec<String> = self
            .items
            .values()
            .filter(|item| item.id == item_id || item.part_of.as_deref() == Some(item_id))
            .map(|item| item.id.clone())
            .collect();
        for id in &doomed {
            self.items.remove(id);
            self.placements.remove(id);
        }
        !doomed.is_empty()
    }

    /// Bring item statuses in line with the placement map.
    pub(crate) fn reconcile(&mut self) -> Result<(), ScheduleError> {
        for (key, placement) in &self.placements {
            if *key != placement.item_id {
                return Err(ScheduleError::invalid_value(
                    "placements",
                    format!("key '{key}' holds placement for '{}'", placement.item_id),
                ));
            }
            if !self.items.contains_key(key) {
                return Err(ScheduleError::UnknownItem(key.clone()));
            }
        }
        for (id, item) in self.items.iter_mut() {
            match self.placements.get(id) {
                Some(p) => item.status = ItemStatus::Scheduled { interval: p.interval },
                None if item.placement().is_some() => item.status = ItemStatus::Pending,
                None => {}
            }
        }
        Ok(())
    }

    /// Check the no-overlap invariant across placements and fixed occurrences.
    pub fn validate(&self, offset: FixedOffset) -> Result<(), ScheduleError> {
        for event in self.fixed_events.values() {
            event.validate()?;
        }
        for pref in &self.preferences {
            pref.validate()?;
        }
        for placement in self.placements() {
            if let Some(conflict) = self.find_conflict(&placement.item_id, placement.interval, offset)? {
                return Err(ScheduleError::OverlapConflict {
                    item_id: placement.item_id,
                    target: placement.interval,
                    conflict,
                });
            }
        }
        Ok(())
    }
}

/// A user's current schedule plus bounded undo/redo history.
#[derive(Debug, Default)]
pub(crate) struct UserSlot {
    pub(crate) current: UserSchedule,
    undo: VecDeque<UserSchedule>,
    redo: Vec<UserSchedule>,
}

impl UserSlot {
    /// Replace the current schedule, remembering the previous one.
    pub(crate) fn commit(&mut self, next: UserSchedule, depth: usize) {
        let previous = std::mem::replace(&mut self.current, next);
        push_bounded(&mut self.undo, previous, depth);
        self.redo.clear();
    }

    pub(crate) fn undo(&mut self) -> bool {
        let Some(previous) = self.undo.pop_back() else {
            return false;
        };
        let current = std::mem::replace(&mut self.current, previous);
        self.redo.push(current);
        true
    }

    pub(crate) fn redo(&mut self, depth: usize) -> bool {
        let Some(next) = self.redo.pop() else {
            return false;
        };
        let current = std::mem::replace(&mut self.current, next);
        push_bounded(&mut self.undo, current, depth);
        true
    }
}

fn push_bounded(stack: &mut VecDeque<UserSchedule>, snapshot: UserSchedule, depth: usize) {
    if depth == 0 {
        return;
    }
    stack.push_back(snapshot);
    while stack.len() > depth {
        stack.pop_front();
    }
}

/// Arena of user schedules keyed by user id.
///
/// The outer lock is only held to find or create a user's slot; each slot
/// has its own lock, so different users never wait on each other.
#[derive(Debug, Default)]
pub struct ScheduleContext {
    users: Mutex<HashMap<String, Arc<Mutex<UserSlot>>>>,
}

impl ScheduleContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn slot(&self, user_id: &str) -> Result<Arc<Mutex<UserSlot>>, ScheduleError> {
        let mut users = self
            .users
            .lock()
            .map_err(|_| ScheduleError::LockPoisoned(user_id.to_string()))?;
        Ok(Arc::clone(users.entry(user_id.to_string()).or_default()))
    }

    /// Ids of every user with a slot, sorted.
    pub fn user_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = match self.users.lock() {
            Ok(users) => users.keys().cloned().collect(),
            Err(_) => Vec::new(),
        };
        ids.sort();
        ids
    }
}
