//! Availability calculation.
//!
//! Turns busy time plus user preferences into preference-weighted free
//! windows, day by day across a horizon:
//! - start from the day (optionally narrowed to active hours)
//! - subtract busy intervals and blackout preferences
//! - cut what remains at preference boundaries and weight each piece
//!
//! Every preference boundary stays a cut, even between pieces of equal
//! weight: a window never spans two preference windows.

use std::collections::BTreeMap;

use chrono::{Duration, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;
use crate::interval::{merge, subtract, Horizon, Interval};
use crate::recurrence::expand_all;
use crate::schedule::{local_instant, EventType, FixedEvent, Preference, TimeWindow};

/// A free, preference-weighted interval eligible to host a flexible item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    /// Local date the window belongs to.
    pub date: NaiveDate,
    pub interval: Interval,
    /// Sum of untargeted preference weights covering the window.
    pub weight: f64,
    /// Extra weight that only applies to items of a given event type.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub affinity: BTreeMap<EventType, f64>,
}

impl AvailabilityWindow {
    /// Weight as seen by an item of `event_type`.
    pub fn weight_for(&self, event_type: EventType) -> f64 {
        self.weight + self.affinity.get(&event_type).copied().unwrap_or(0.0)
    }
}

/// Availability settings
#[derive(Debug, Clone)]
pub struct AvailabilitySettings {
    /// Offset that defines local days, weekdays and times of day
    pub offset: FixedOffset,
    /// Part of each day that can hold work; `None` is the whole day
    pub active_hours: Option<TimeWindow>,
    /// Windows shorter than this are dropped; zero keeps every free piece
    pub min_window: Duration,
}

impl Default for AvailabilitySettings {
    fn default() -> Self {
        Self {
            offset: Utc.fix(),
            active_hours: None,
            min_window: Duration::zero(),
        }
    }
}

/// Computes availability windows.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityCalculator {
    settings: AvailabilitySettings,
}

impl AvailabilityCalculator {
    /// Create a calculator with default settings (UTC, whole days, no minimum)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom settings
    pub fn with_settings(settings: AvailabilitySettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AvailabilitySettings {
        &self.settings
    }

    /// Expand `events` over the horizon and compute availability around them
    /// and any `extra_busy` time (e.g. committed placements).
    pub fn compute_for_events(
        &self,
        horizon: &Horizon,
        events: &[FixedEvent],
        extra_busy: &[Interval],
        preferences: &[Preference],
    ) -> Result<Vec<AvailabilityWindow>, ScheduleError> {
        let mut busy: Vec<Interval> = expand_all(events, horizon, self.settings.offset)?
            .into_iter()
            .map(|o| o.interval)
            .collect();
        busy.extend_from_slice(extra_busy);
        self.compute(horizon, &busy, preferences)
    }

    /// Availability windows across the horizon, ordered by start.
    ///
    /// Busy time is never available regardless of preferences. Identical
    /// inputs always produce identical output.
    pub fn compute(
        &self,
        horizon: &Horizon,
        busy: &[Interval],
        preferences: &[Preference],
    ) -> Result<Vec<AvailabilityWindow>, ScheduleError> {
        for pref in preferences {
            pref.validate()?;
        }
        let busy = merge(busy);
        let offset = self.settings.offset;

        let mut windows = Vec::new();
        for date in horizon.local_days(offset) {
            let Some(day) = self.day_interval(date, horizon) else {
                continue;
            };

            // Spans anchored today plus yesterday's spans that wrap into today.
            let mut weighted: Vec<(Interval, &Preference)> = Vec::new();
            let mut blockers = busy.clone();
            for pref in preferences {
                let anchors = [date.pred_opt(), Some(date)];
                for anchor in anchors.into_iter().flatten() {
                    let Some(span) = pref.span_on(anchor, offset).and_then(|s| s.intersection(&day))
                    else {
                        continue;
                    };
                    if pref.blackout {
                        blockers.push(span);
                    } else {
                        weighted.push((span, pref));
                    }
                }
            }

            let mut day_windows = Vec::new();
            for free in subtract(&day, &blockers) {
                self.partition(date, free, &weighted, &mut day_windows);
            }
            windows.extend(
                day_windows
                    .into_iter()
                    .filter(|w| w.interval.duration() >= self.settings.min_window),
            );
        }

        tracing::debug!(
            from = %horizon.from(),
            to = %horizon.to(),
            windows = windows.len(),
            "computed availability"
        );
        Ok(windows)
    }

    /// Full local day clipped to active hours and the horizon.
    fn day_interval(&self, date: NaiveDate, horizon: &Horizon) -> Option<Interval> {
        let offset = self.settings.offset;
        let (start_min, end_min) = match self.settings.active_hours {
            Some(hours) => (hours.start_minute(), hours.end_minute()),
            None => (0, 24 * 60),
        };
        let start = local_instant(date, start_min, offset)?;
        let end = local_instant(date, end_min, offset)?;
        Interval::new(start, end)
            .ok()?
            .clip(horizon.from(), horizon.to())
    }

    /// Cut `free` at preference boundaries and append weighted pieces.
    fn partition(
        &self,
        date: NaiveDate,
        free: Interval,
        weighted: &[(Interval, &Preference)],
        out: &mut Vec<AvailabilityWindow>,
    ) {
        let mut cuts = vec![free.start(), free.end()];
        for (span, _) in weighted {
            for t in [span.start(), span.end()] {
                if free.contains_instant(t) {
                    cuts.push(t);
                }
            }
        }
        cuts.sort();
        cuts.dedup();

        for pair in cuts.windows(2) {
            let Ok(piece) = Interval::new(pair[0], pair[1]) else {
                continue;
            };

            let mut weight = 0.0;
            let mut affinity: BTreeMap<EventType, f64> = BTreeMap::new();
            for (span, pref) in weighted {
                if !span.contains(&piece) {
                    continue;
                }
                match pref.event_type {
                    Some(event_type) => *affinity.entry(event_type).or_insert(0.0) += pref.weight,
                    None => weight += pref.weight,
                }
            }
            out.push(AvailabilityWindow {
                date,
                interval: piece,
                weight,
                affinity,
            });
        }
    }
}
