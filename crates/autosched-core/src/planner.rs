//! One-shot scheduling pipeline.
//!
//! Expansion, availability and allocation wired together for callers that
//! hold a complete input set and want placements back, without going
//! through the per-user mutation gateway.

use std::path::Path;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::availability::{AvailabilityCalculator, AvailabilitySettings, AvailabilityWindow};
use crate::error::{ConfigError, Result, ScheduleError};
use crate::interval::{Horizon, Interval};
use crate::schedule::{split_items, FixedEvent, FlexibleItem, Preference};
use crate::scheduler::{Allocation, SchedulerConfig, SlotAllocator};
use crate::storage::EngineConfig;

/// Everything one scheduling run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanInput {
    pub horizon: Horizon,
    #[serde(default)]
    pub fixed_events: Vec<FixedEvent>,
    #[serde(default)]
    pub preferences: Vec<Preference>,
    #[serde(default)]
    pub items: Vec<FlexibleItem>,
}

impl PlanInput {
    /// Read a JSON input file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a valid input.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let input: PlanInput = serde_json::from_str(&content)?;
        tracing::debug!(
            events = input.fixed_events.len(),
            preferences = input.preferences.len(),
            items = input.items.len(),
            "loaded plan input"
        );
        Ok(input)
    }

    /// Intervals already held by scheduled items; frozen for the run.
    pub fn committed(&self) -> Vec<Interval> {
        self.items.iter().filter_map(FlexibleItem::placement).collect()
    }
}

/// Availability calculator and slot allocator sharing one configuration.
#[derive(Debug, Clone, Default)]
pub struct Planner {
    calculator: AvailabilityCalculator,
    allocator: SlotAllocator,
}

impl Planner {
    /// The allocator's offset is taken from `settings`, so local days agree.
    pub fn new(settings: AvailabilitySettings, config: SchedulerConfig) -> Self {
        let config = SchedulerConfig {
            offset: settings.offset,
            ..config
        };
        Self {
            calculator: AvailabilityCalculator::with_settings(settings),
            allocator: SlotAllocator::with_config(config),
        }
    }

    /// Build from the engine configuration.
    ///
    /// # Errors
    /// Returns an error if the calendar section is invalid.
    pub fn from_config(config: &EngineConfig) -> std::result::Result<Self, ConfigError> {
        Ok(Self::new(
            config.availability_settings()?,
            config.scheduler_config()?,
        ))
    }

    pub fn offset(&self) -> FixedOffset {
        self.calculator.settings().offset
    }

    pub fn calculator(&self) -> &AvailabilityCalculator {
        &self.calculator
    }

    pub fn allocator(&self) -> &SlotAllocator {
        &self.allocator
    }

    /// Free windows left after fixed events and already-scheduled items.
    pub fn availability(
        &self,
        input: &PlanInput,
    ) -> std::result::Result<Vec<AvailabilityWindow>, ScheduleError> {
        self.calculator.compute_for_events(
            &input.horizon,
            &input.fixed_events,
            &input.committed(),
            &input.preferences,
        )
    }

    /// Run allocation over the pending items of `input`.
    ///
    /// Items already scheduled count toward the daily cap.
    pub fn plan(&self, input: &PlanInput) -> std::result::Result<Allocation, ScheduleError> {
        let windows = self.availability(input)?;
        Ok(self
            .allocator
            .allocate_with_committed(&windows, &input.items, &input.committed()))
    }

    /// Like [`Planner::plan`], returning the items with their new statuses.
    ///
    /// Split items come back as their chunks.
    pub fn plan_items(
        &self,
        input: &PlanInput,
    ) -> std::result::Result<Vec<FlexibleItem>, ScheduleError> {
        let allocation = self.plan(input)?;
        let mut items = split_items(&input.items);
        allocation.apply(&mut items);
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::recurrence::RecurrenceRule;
    use crate::schedule::{DaySelector, ItemStatus, TimeWindow, UnscheduledReason};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(day: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, h, 0, 0).unwrap()
    }

    /// Week of Monday 2026-03-02 with a weekly Monday lecture and a weekday 9-5 band.
    fn week_input(items: Vec<FlexibleItem>) -> PlanInput {
        let lecture = FixedEvent::new("lecture", "Lecture", Interval::new(at(2, 10), at(2, 11)).unwrap())
            .with_recurrence(RecurrenceRule::weekly());
        let band = TimeWindow::parse("09:00", "17:00").unwrap();
        let preferences = (0..5)
            .map(|d| Preference::new(DaySelector::Weekday(d), band, 1.0))
            .collect();
        PlanInput {
            horizon: Horizon::new(at(2, 0), at(9, 0)).unwrap(),
            fixed_events: vec![lecture],
            preferences,
            items,
        }
    }

    #[test]
    fn homework_lands_after_monday_lecture() {
        let homework = FlexibleItem::new("Homework", Duration::hours(2), at(4, 17), 1).with_id("hw");
        let items = Planner::default().plan_items(&week_input(vec![homework])).unwrap();
        assert_eq!(items[0].placement(), Some(Interval::new(at(2, 11), at(2, 13)).unwrap()));
    }

    #[test]
    fn scheduled_items_are_frozen_and_block_time() {
        let mut done = FlexibleItem::new("Done", Duration::hours(2), at(4, 17), 0).with_id("done");
        done.status = ItemStatus::Scheduled {
            interval: Interval::new(at(2, 11), at(2, 13)).unwrap(),
        };
        let next = FlexibleItem::new("Next", Duration::hours(3), at(4, 17), 0).with_id("next");
        let items = Planner::default()
            .plan_items(&week_input(vec![done.clone(), next]))
            .unwrap();
        assert_eq!(items[0], done);
        assert_eq!(items[1].placement(), Some(Interval::new(at(2, 13), at(2, 16)).unwrap()));
    }

    #[test]
    fn single_window_goes_to_higher_priority() {
        let lecture = FixedEvent::new("busy", "Busy", Interval::new(at(2, 0), at(2, 9)).unwrap());
        let evening = FixedEvent::new("evening", "Evening", Interval::new(at(2, 11), at(3, 0)).unwrap());
        let input = PlanInput {
            horizon: Horizon::new(at(2, 0), at(3, 0)).unwrap(),
            fixed_events: vec![lecture, evening],
            preferences: vec![],
            items: vec![
                FlexibleItem::new("Low", Duration::hours(2), at(2, 23), 1).with_id("a-low"),
                FlexibleItem::new("High", Duration::hours(2), at(2, 23), 5).with_id("b-high"),
            ],
        };
        let allocation = Planner::default().plan(&input).unwrap();
        assert_eq!(allocation.placements()[0].item_id, "b-high");
        assert_eq!(
            allocation.unschedulable(),
            vec![("a-low", UnscheduledReason::NoFeasibleWindow)]
        );
    }

    #[test]
    fn prescheduled_items_count_toward_daily_cap() {
        let mut done = FlexibleItem::new("Done", Duration::hours(2), at(4, 17), 0).with_id("done");
        done.status = ItemStatus::Scheduled {
            interval: Interval::new(at(2, 11), at(2, 13)).unwrap(),
        };
        let next = FlexibleItem::new("Next", Duration::hours(2), at(4, 17), 0).with_id("next");
        let planner = Planner::new(
            AvailabilitySettings::default(),
            SchedulerConfig {
                max_per_day: Some(Duration::hours(3)),
                ..SchedulerConfig::default()
            },
        );
        let items = planner.plan_items(&week_input(vec![done, next])).unwrap();
        assert_eq!(items[1].placement(), Some(Interval::new(at(3, 9), at(3, 11)).unwrap()));
    }

    #[test]
    fn split_items_come_back_as_chunks() {
        let essay = FlexibleItem::new("Essay", Duration::hours(2), at(4, 17), 0)
            .with_id("essay")
            .with_split_minutes(60);
        let items = Planner::default().plan_items(&week_input(vec![essay])).unwrap();
        let placed: Vec<_> = items
            .iter()
            .map(|i| (i.id.as_str(), i.placement()))
            .collect();
        assert_eq!(
            placed,
            vec![
                ("essay#1", Some(Interval::new(at(2, 9), at(2, 10)).unwrap())),
                ("essay#2", Some(Interval::new(at(2, 11), at(2, 12)).unwrap())),
            ]
        );
    }

    #[test]
    fn planner_offset_drives_allocator_days() {
        let settings = AvailabilitySettings {
            offset: FixedOffset::east_opt(9 * 3600).unwrap(),
            ..AvailabilitySettings::default()
        };
        let planner = Planner::new(settings, SchedulerConfig::default());
        assert_eq!(planner.allocator().config().offset, planner.offset());
    }

    #[test]
    fn load_reports_missing_file_and_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(PlanInput::load(&missing), Err(CoreError::Io(_))));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"horizon": {"from": "2026-03-02T00:00:00Z", "to": "2026-03-01T00:00:00Z"}}"#)
            .unwrap();
        assert!(matches!(PlanInput::load(&bad), Err(CoreError::Json(_))));
    }

    #[test]
    fn plan_input_reads_json() {
        let json = r#"{
            "horizon": {"from": "2026-03-02T00:00:00Z", "to": "2026-03-03T00:00:00Z"},
            "items": [{
                "id": "essay", "title": "Essay", "duration_minutes": 90,
                "deadline": "2026-03-02T18:00:00Z", "priority": 2
            }]
        }"#;
        let input: PlanInput = serde_json::from_str(json).unwrap();
        assert!(input.fixed_events.is_empty());
        assert!(input.items[0].is_pending());
        let allocation = Planner::default().plan(&input).unwrap();
        assert_eq!(allocation.scheduled_count(), 1);
    }
}
