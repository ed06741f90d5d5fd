//! Conflict resolver and mutation gateway.
//!
//! Every change to a user's schedule goes through [`MutationGateway`]:
//! - Mutations run on a draft copy under the user's lock and are swapped
//!   in only when they succeed, so a rejected request changes nothing
//! - Item and preference changes re-run allocation over pending items only;
//!   scheduled items stay where they are
//! - Manual moves are checked against fixed occurrences and other placements
//! - Committed mutations are recorded for undo/redo

mod context;

pub use context::{ScheduleContext, UserSchedule};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ScheduleError};
use crate::interval::{Horizon, Interval};
use crate::planner::Planner;
use crate::recurrence::RecurrenceExpander;
use crate::schedule::{
    FixedEvent, FlexibleItem, ItemStatus, Placement, PlacementSource, Preference,
    UnscheduledReason,
};
use crate::storage::EngineConfig;

/// An item the last pass could not place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnschedulableItem {
    pub item_id: String,
    pub reason: UnscheduledReason,
}

/// What an accepted mutation changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationReport {
    /// Placements created by this mutation
    pub scheduled: Vec<Placement>,
    pub unschedulable: Vec<UnschedulableItem>,
    /// Items whose placement a fixed-event edit invalidated
    pub bumped: Vec<String>,
}

/// Serializes and validates mutations per user.
#[derive(Debug)]
pub struct MutationGateway {
    context: Arc<ScheduleContext>,
    planner: Planner,
    undo_depth: usize,
}

impl Default for MutationGateway {
    fn default() -> Self {
        Self::new(Planner::default())
    }
}

impl MutationGateway {
    /// Create a gateway with a fresh context.
    pub fn new(planner: Planner) -> Self {
        Self::with_context(
            Arc::new(ScheduleContext::new()),
            planner,
            EngineConfig::default().history.undo_depth,
        )
    }

    /// Create over an existing context.
    pub fn with_context(context: Arc<ScheduleContext>, planner: Planner, undo_depth: usize) -> Self {
        Self {
            context,
            planner,
            undo_depth,
        }
    }

    /// Build from the engine configuration.
    ///
    /// # Errors
    /// Returns an error if the calendar section is invalid.
    pub fn from_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_context(
            Arc::new(ScheduleContext::new()),
            Planner::from_config(config)?,
            config.history.undo_depth,
        ))
    }

    pub fn context(&self) -> &Arc<ScheduleContext> {
        &self.context
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// Copy of the user's current schedule.
    pub fn snapshot(&self, user_id: &str) -> Result<UserSchedule, ScheduleError> {
        let slot = self.context.slot(user_id)?;
        let guard = slot
            .lock()
            .map_err(|_| ScheduleError::LockPoisoned(user_id.to_string()))?;
        Ok(guard.current.clone())
    }

    /// Replace the user's schedule wholesale.
    ///
    /// Item statuses are synced to the placement map, then the whole
    /// schedule is checked for overlaps. No allocation is run.
    pub fn load(&self, user_id: &str, schedule: UserSchedule) -> Result<MutationReport, ScheduleError> {
        let offset = self.planner.offset();
        self.mutate(user_id, "load", move |draft| {
            let mut schedule = schedule;
            schedule.reconcile()?;
            schedule.validate(offset)?;
            *draft = schedule;
            Ok(MutationReport::default())
        })
    }

    /// Change the horizon and place pending items within it.
    pub fn set_horizon(&self, user_id: &str, horizon: Horizon) -> Result<MutationReport, ScheduleError> {
        self.mutate(user_id, "set_horizon", |draft| {
            draft.horizon = Some(horizon);
            self.run_pending(draft)
        })
    }

    /// Replace the preference set and place pending items against it.
    pub fn set_preferences(
        &self,
        user_id: &str,
        preferences: Vec<Preference>,
    ) -> Result<MutationReport, ScheduleError> {
        self.mutate(user_id, "set_preferences", |draft| {
            for pref in &preferences {
                pref.validate()?;
            }
            draft.preferences = preferences;
            self.run_pending(draft)
        })
    }

    /// Create or edit a fixed event.
    ///
    /// Placements the event now covers return to pending and are re-placed
    /// together with the rest of the queue.
    pub fn upsert_fixed_event(
        &self,
        user_id: &str,
        event: FixedEvent,
    ) -> Result<MutationReport, ScheduleError> {
        let offset = self.planner.offset();
        self.mutate(user_id, "upsert_fixed_event", |draft| {
            event.validate()?;

            let mut bumped = Vec::new();
            for placement in draft.placements() {
                let span = Horizon::covering(placement.interval);
                let mut hits = RecurrenceExpander::new(&event, span, offset)?.occurrences();
                if hits.next().is_some() {
                    bumped.push(placement.item_id);
                }
            }
            for item_id in &bumped {
                draft.clear_placement(item_id);
                tracing::debug!(item = %item_id, event = %event.id, "placement bumped by fixed event");
            }

            draft.fixed_events.insert(event.id.clone(), event);
            let mut report = self.run_pending(draft)?;
            report.bumped = bumped;
            Ok(report)
        })
    }

    /// Delete a fixed event; its time becomes available on the next pass.
    pub fn delete_fixed_event(&self, user_id: &str, event_id: &str) -> Result<MutationReport, ScheduleError> {
        self.mutate(user_id, "delete_fixed_event", |draft| {
            draft
                .fixed_events
                .remove(event_id)
                .ok_or_else(|| ScheduleError::UnknownEvent(event_id.to_string()))?;
            Ok(MutationReport::default())
        })
    }

    /// Create or edit a flexible item; it re-enters the queue as pending.
    ///
    /// A split item is stored as its chunks, replacing any earlier chunks.
    pub fn upsert_item(&self, user_id: &str, item: FlexibleItem) -> Result<MutationReport, ScheduleError> {
        self.mutate(user_id, "upsert_item", |draft| {
            let mut item = item;
            item.status = ItemStatus::Pending;
            draft.remove_item(&item.id);
            for chunk in item.chunks() {
                draft.items.insert(chunk.id.clone(), chunk);
            }
            self.run_pending(draft)
        })
    }

    /// Drag or resize an item to `target`.
    ///
    /// The target must not overlap any fixed occurrence or other placement
    /// and must end by the item's deadline. The item's duration becomes the
    /// target's length.
    pub fn move_item(
        &self,
        user_id: &str,
        item_id: &str,
        target: Interval,
    ) -> Result<MutationReport, ScheduleError> {
        let offset = self.planner.offset();
        self.mutate(user_id, "move_item", |draft| {
            let item = draft
                .items
                .get(item_id)
                .ok_or_else(|| ScheduleError::UnknownItem(item_id.to_string()))?;

            let minutes = target.duration_minutes();
            if target.duration() != chrono::Duration::minutes(minutes) {
                return Err(ScheduleError::invalid_value(
                    "interval",
                    "placements must last a whole number of minutes",
                ));
            }
            if target.end() > item.deadline {
                return Err(ScheduleError::PastDeadline {
                    item_id: item_id.to_string(),
                    end: target.end(),
                    deadline: item.deadline,
                });
            }
            if let Some(not_before) = item.not_before.filter(|nb| target.start() < *nb) {
                return Err(ScheduleError::invalid_value(
                    "interval",
                    format!("item cannot start before {not_before}"),
                ));
            }
            if let Some(conflict) = draft.find_conflict(item_id, target, offset)? {
                return Err(ScheduleError::OverlapConflict {
                    item_id: item_id.to_string(),
                    target,
                    conflict,
                });
            }

            if let Some(item) = draft.items.get_mut(item_id) {
                item.duration_minutes = minutes;
            }
            draft.commit_placement(item_id, target, PlacementSource::Manual);
            Ok(MutationReport {
                scheduled: draft.placements.get(item_id).cloned().into_iter().collect(),
                ..MutationReport::default()
            })
        })
    }

    /// Remove an item (or every chunk of a split item) and its placements.
    /// Other items are not re-placed.
    pub fn delete_item(&self, user_id: &str, item_id: &str) -> Result<MutationReport, ScheduleError> {
        self.mutate(user_id, "delete_item", |draft| {
            if !draft.remove_item(item_id) {
                return Err(ScheduleError::UnknownItem(item_id.to_string()));
            }
            Ok(MutationReport::default())
        })
    }

    /// Run a pass over pending and previously unschedulable items.
    pub fn reallocate(&self, user_id: &str) -> Result<MutationReport, ScheduleError> {
        self.mutate(user_id, "reallocate", |draft| self.run_pending(draft))
    }

    /// Restore the schedule before the last committed mutation.
    ///
    /// Returns `false` when there is nothing to undo.
    pub fn undo(&self, user_id: &str) -> Result<bool, ScheduleError> {
        let slot = self.context.slot(user_id)?;
        let mut guard = slot
            .lock()
            .map_err(|_| ScheduleError::LockPoisoned(user_id.to_string()))?;
        let undone = guard.undo();
        tracing::info!(user = user_id, undone, "undo");
        Ok(undone)
    }

    /// Re-apply the last undone mutation.
    ///
    /// Returns `false` when there is nothing to redo.
    pub fn redo(&self, user_id: &str) -> Result<bool, ScheduleError> {
        let slot = self.context.slot(user_id)?;
        let mut guard = slot
            .lock()
            .map_err(|_| ScheduleError::LockPoisoned(user_id.to_string()))?;
        let redone = guard.redo(self.undo_depth);
        tracing::info!(user = user_id, redone, "redo");
        Ok(redone)
    }

    /// Apply `op` to a draft under the user's lock; commit only on success.
    fn mutate<F>(&self, user_id: &str, name: &'static str, op: F) -> Result<MutationReport, ScheduleError>
    where
        F: FnOnce(&mut UserSchedule) -> Result<MutationReport, ScheduleError>,
    {
        let slot = self.context.slot(user_id)?;
        let mut guard = slot
            .lock()
            .map_err(|_| ScheduleError::LockPoisoned(user_id.to_string()))?;

        let mut draft = guard.current.clone();
        match op(&mut draft) {
            Ok(report) => {
                guard.commit(draft, self.undo_depth);
                tracing::info!(
                    user = user_id,
                    op = name,
                    scheduled = report.scheduled.len(),
                    unschedulable = report.unschedulable.len(),
                    bumped = report.bumped.len(),
                    "mutation committed"
                );
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(user = user_id, op = name, code = e.code(), error = %e, "mutation rejected");
                Err(e)
            }
        }
    }

    /// Allocate every pending item into the draft's free time.
    ///
    /// Unschedulable items are retried. Existing placements are busy time
    /// and count toward the daily cap.
    fn run_pending(&self, draft: &mut UserSchedule) -> Result<MutationReport, ScheduleError> {
        for item in draft.items.values_mut() {
            if matches!(item.status, ItemStatus::Unschedulable { .. }) {
                item.status = ItemStatus::Pending;
            }
        }
        let Some(horizon) = draft.horizon else {
            tracing::debug!("no horizon set, pending items stay queued");
            return Ok(MutationReport::default());
        };

        let committed: Vec<Interval> = draft.placements.values().map(|p| p.interval).collect();
        let windows = self.planner.calculator().compute_for_events(
            &horizon,
            &draft.fixed_events(),
            &committed,
            &draft.preferences,
        )?;
        let allocation = self
            .planner
            .allocator()
            .allocate_with_committed(&windows, &draft.items(), &committed);

        let mut report = MutationReport::default();
        for decision in allocation.decisions {
            match decision.status {
                ItemStatus::Scheduled { interval } => {
                    draft.commit_placement(&decision.item_id, interval, PlacementSource::Auto);
                    report.scheduled.push(Placement {
                        item_id: decision.item_id,
                        interval,
                        source: PlacementSource::Auto,
                    });
                }
                ItemStatus::Unschedulable { reason } => {
                    if let Some(item) = draft.items.get_mut(&decision.item_id) {
                        item.status = ItemStatus::Unschedulable { reason };
                    }
                    report.unschedulable.push(UnschedulableItem {
                        item_id: decision.item_id,
                        reason,
                    });
                }
                ItemStatus::Pending => {}
            }
        }
        Ok(report)
    }
}
