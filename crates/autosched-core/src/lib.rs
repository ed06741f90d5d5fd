//! # Autosched Core Library
//!
//! This library provides the automatic scheduling engine behind a calendar
//! app: it carves free time out of a user's calendar and packs flexible work
//! items into it, then keeps the result consistent while the user drags,
//! resizes and deletes things. A standalone CLI drives the same library.
//!
//! ## Architecture
//!
//! - **Interval Model**: half-open `[start, end)` intervals with overlap,
//!   subtract and merge
//! - **Recurrence Expander**: daily/weekly/monthly rules plus per-date
//!   cancel/move exceptions, expanded lazily over a bounded horizon
//! - **Availability Calculator**: free time per day, weighted by user preferences
//! - **Slot Allocator**: greedy, deterministic placement of pending items
//! - **Mutation Gateway**: per-user serialized edits with conflict checks and undo
//!
//! ## Key Components
//!
//! - [`Interval`]: Value type every other module builds on
//! - [`RecurrenceExpander`]: Occurrences of one fixed event inside a horizon
//! - [`AvailabilityCalculator`]: Preference-weighted free windows
//! - [`SlotAllocator`]: Places flexible items into windows
//! - [`MutationGateway`]: Authoritative per-user schedule
//! - [`EngineConfig`]: TOML configuration

pub mod availability;
pub mod error;
pub mod gateway;
pub mod interval;
pub mod planner;
pub mod recurrence;
pub mod schedule;
pub mod scheduler;
pub mod stats;
pub mod storage;

pub use availability::{AvailabilityCalculator, AvailabilitySettings, AvailabilityWindow};
pub use error::{ConfigError, ConflictSource, CoreError, ScheduleError};
pub use gateway::{MutationGateway, MutationReport, ScheduleContext, UnschedulableItem, UserSchedule};
pub use interval::{merge, overlaps, subtract, Horizon, Interval};
pub use planner::{PlanInput, Planner};
pub use recurrence::{expand_all, Frequency, Occurrence, RecurrenceEnd, RecurrenceExpander, RecurrenceRule};
pub use schedule::{
    DaySelector, EventType, FixedEvent, FlexibleItem, ItemStatus, OccurrenceOverride, Placement,
    split_items, PlacementSource, Preference, TimeWindow, UnscheduledReason,
};
pub use scheduler::{Allocation, Decision, SchedulerConfig, SlotAllocator};
pub use stats::{item_time_by_event_type, scheduled_time, time_by_event_type, EventTypeMinutes};
pub use storage::{data_dir, EngineConfig};
