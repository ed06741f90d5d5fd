//! Recurrence expansion.
//!
//! A recurring [`FixedEvent`] is stored as a rule plus per-date exceptions.
//! [`RecurrenceExpander`] turns it into the concrete occurrences that touch
//! a bounded [`Horizon`], lazily and in rule order. Calling
//! [`RecurrenceExpander::occurrences`] again restarts the sequence.
//!
//! Occurrence dates are local dates (under the caller's UTC offset) of the
//! rule-computed start. Exceptions are keyed by that date, so moving the
//! anchor of a series never re-targets an unrelated exception.

use chrono::{
    DateTime, Datelike, Days, Duration, FixedOffset, Months, NaiveDate, NaiveTime, Utc,
};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;
use crate::interval::{Horizon, Interval};
use crate::schedule::{FixedEvent, OccurrenceOverride};

/// Consecutive skipped months tolerated before a monthly rule is declared dead.
const MAX_SKIPPED_MONTHS: u32 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

/// Where a series stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceEnd {
    /// Last permitted occurrence date, inclusive.
    Until(NaiveDate),
    /// Total number of rule occurrences, cancelled ones included.
    Count(u32),
}

/// How a fixed event repeats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    /// Every n-th day/week/month.
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// Weekly only: weekdays (0 = Monday) to repeat on. Empty means the anchor's weekday.
    #[serde(default)]
    pub weekdays: Vec<u8>,
    #[serde(default)]
    pub end: Option<RecurrenceEnd>,
}

fn default_interval() -> u32 {
    1
}

impl RecurrenceRule {
    pub fn daily() -> Self {
        Self::new(Frequency::Daily)
    }

    pub fn weekly() -> Self {
        Self::new(Frequency::Weekly)
    }

    pub fn monthly() -> Self {
        Self::new(Frequency::Monthly)
    }

    fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            interval: 1,
            weekdays: Vec::new(),
            end: None,
        }
    }

    pub fn every(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    pub fn on_weekdays(mut self, weekdays: &[u8]) -> Self {
        self.weekdays = weekdays.to_vec();
        self
    }

    pub fn until(mut self, date: NaiveDate) -> Self {
        self.end = Some(RecurrenceEnd::Until(date));
        self
    }

    pub fn count(mut self, count: u32) -> Self {
        self.end = Some(RecurrenceEnd::Count(count));
        self
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.interval == 0 {
            return Err(ScheduleError::invalid_value("interval", "must be at least 1"));
        }
        if !self.weekdays.is_empty() && self.frequency != Frequency::Weekly {
            return Err(ScheduleError::invalid_value(
                "weekdays",
                "only weekly rules may list weekdays",
            ));
        }
        if let Some(wd) = self.weekdays.iter().find(|wd| **wd > 6) {
            return Err(ScheduleError::invalid_value(
                "weekdays",
                format!("weekday {wd} outside 0..=6"),
            ));
        }
        if self.end == Some(RecurrenceEnd::Count(0)) {
            return Err(ScheduleError::invalid_value("count", "must be at least 1"));
        }
        Ok(())
    }
}

/// One concrete instance of a fixed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub event_id: String,
    /// Local date of the rule-computed start; the exception key.
    pub date: NaiveDate,
    pub interval: Interval,
    /// Whether a "moved" exception supplied the interval.
    pub moved: bool,
}

enum Candidate {
    Date(NaiveDate),
    Skip,
    Exhausted,
}

/// Rule-computed occurrence dates from the anchor onward, bounded by the rule's end.
#[derive(Debug, Clone)]
struct RuleDates {
    anchor: NaiveDate,
    rule: Option<RecurrenceRule>,
    step: u32,
    slot: usize,
    emitted: u32,
    finished: bool,
}

impl RuleDates {
    fn new(anchor: NaiveDate, rule: Option<&RecurrenceRule>) -> Self {
        let rule = rule.cloned().map(|mut r| {
            r.weekdays.sort_unstable();
            r.weekdays.dedup();
            r
        });
        Self {
            anchor,
            rule,
            step: 0,
            slot: 0,
            emitted: 0,
            finished: false,
        }
    }
}

fn candidate_at(
    rule: &RecurrenceRule,
    anchor: NaiveDate,
    step: u32,
    slot: usize,
) -> (Candidate, u32, usize) {
    let periods = u64::from(step) * u64::from(rule.interval);
    let next_step = step.saturating_add(1);
    let shift = |days: u64| anchor.checked_add_days(Days::new(days));

    match rule.frequency {
        Frequency::Daily => match shift(periods) {
            Some(d) => (Candidate::Date(d), next_step, 0),
            None => (Candidate::Exhausted, step, 0),
        },
        Frequency::Weekly if rule.weekdays.is_empty() => match shift(periods * 7) {
            Some(d) => (Candidate::Date(d), next_step, 0),
            None => (Candidate::Exhausted, step, 0),
        },
        Frequency::Weekly => {
            let monday = anchor - Duration::days(i64::from(anchor.weekday().num_days_from_monday()));
            let offset = periods * 7 + u64::from(rule.weekdays[slot]);
            let (step_after, slot_after) = if slot + 1 == rule.weekdays.len() {
                (next_step, 0)
            } else {
                (step, slot + 1)
            };
            match monday.checked_add_days(Days::new(offset)) {
                Some(d) => (Candidate::Date(d), step_after, slot_after),
                None => (Candidate::Exhausted, step, slot),
            }
        }
        Frequency::Monthly => {
            let Ok(months) = u32::try_from(periods) else {
                return (Candidate::Exhausted, step, 0);
            };
            let first = anchor.with_day(1).and_then(|d| d.checked_add_months(Months::new(months)));
            match first {
                Some(month) => match NaiveDate::from_ymd_opt(month.year(), month.month(), anchor.day()) {
                    Some(d) => (Candidate::Date(d), next_step, 0),
                    None => (Candidate::Skip, next_step, 0),
                },
                None => (Candidate::Exhausted, step, 0),
            }
        }
    }
}

impl Iterator for RuleDates {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        if self.finished {
            return None;
        }
        let Some(rule) = &self.rule else {
            self.finished = true;
            return Some(self.anchor);
        };

        let mut skipped = 0;
        loop {
            let (candidate, step, slot) = candidate_at(rule, self.anchor, self.step, self.slot);
            self.step = step;
            self.slot = slot;

            let date = match candidate {
                Candidate::Date(d) => d,
                Candidate::Skip => {
                    skipped += 1;
                    if skipped > MAX_SKIPPED_MONTHS {
                        self.finished = true;
                        return None;
                    }
                    continue;
                }
                Candidate::Exhausted => {
                    self.finished = true;
                    return None;
                }
            };

            // Listed weekdays earlier in the anchor's week precede the series.
            if date < self.anchor {
                continue;
            }
            match rule.end {
                Some(RecurrenceEnd::Until(until)) if date > until => {
                    self.finished = true;
                    return None;
                }
                Some(RecurrenceEnd::Count(count)) if self.emitted >= count => {
                    self.finished = true;
                    return None;
                }
                _ => {}
            }
            self.emitted += 1;
            return Some(date);
        }
    }
}

/// Expands one fixed event over a horizon.
#[derive(Debug, Clone)]
pub struct RecurrenceExpander<'a> {
    event: &'a FixedEvent,
    horizon: Horizon,
    offset: FixedOffset,
}

impl<'a> RecurrenceExpander<'a> {
    pub fn new(
        event: &'a FixedEvent,
        horizon: Horizon,
        offset: FixedOffset,
    ) -> Result<Self, ScheduleError> {
        event.validate()?;
        Ok(Self {
            event,
            horizon,
            offset,
        })
    }

    /// Like [`RecurrenceExpander::new`], failing with `InvalidHorizon` when `to <= from`.
    pub fn with_bounds(
        event: &'a FixedEvent,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Result<Self, ScheduleError> {
        Self::new(event, Horizon::new(from, to)?, offset)
    }

    /// A fresh pass over the occurrences touching the horizon.
    pub fn occurrences(&self) -> Occurrences<'a> {
        let local_start = self.event.interval.start().with_timezone(&self.offset);
        let anchor = local_start.date_naive();
        let horizon = self.horizon.as_interval();

        // Latest exception date whose substitute lands inside the horizon;
        // the scan must reach it even after rule starts pass the horizon end.
        let pulled_in = self
            .event
            .exceptions
            .iter()
            .filter_map(|(date, ov)| match ov {
                OccurrenceOverride::Moved { interval } if interval.overlaps(&horizon) => Some(*date),
                _ => None,
            })
            .max();

        Occurrences {
            event: self.event,
            horizon,
            offset: self.offset,
            anchor_time: local_start.time(),
            length: self.event.interval.duration(),
            dates: RuleDates::new(anchor, self.event.recurrence.as_ref()),
            pulled_in,
            done: false,
        }
    }
}

/// Lazy occurrence sequence produced by [`RecurrenceExpander::occurrences`].
#[derive(Debug, Clone)]
pub struct Occurrences<'a> {
    event: &'a FixedEvent,
    horizon: Interval,
    offset: FixedOffset,
    anchor_time: NaiveTime,
    length: Duration,
    dates: RuleDates,
    pulled_in: Option<NaiveDate>,
    done: bool,
}

impl Occurrences<'_> {
    fn rule_interval(&self, date: NaiveDate) -> Option<Interval> {
        let start = date
            .and_time(self.anchor_time)
            .and_local_timezone(self.offset)
            .single()?
            .with_timezone(&Utc);
        Interval::starting_at(start, self.length).ok()
    }
}

impl Iterator for Occurrences<'_> {
    type Item = Occurrence;

    fn next(&mut self) -> Option<Occurrence> {
        while !self.done {
            let Some(date) = self.dates.next() else {
                self.done = true;
                break;
            };
            let Some(rule_iv) = self.rule_interval(date) else {
                continue;
            };

            if rule_iv.start() >= self.horizon.end() && self.pulled_in.map_or(true, |d| date > d) {
                self.done = true;
                break;
            }

            let (interval, moved) = match self.event.exception_for(date) {
                OccurrenceOverride::Cancelled => {
                    tracing::debug!(event = %self.event.id, %date, "occurrence cancelled");
                    continue;
                }
                OccurrenceOverride::Moved { interval } => (interval, true),
                OccurrenceOverride::Unchanged => (rule_iv, false),
            };

            if interval.overlaps(&self.horizon) {
                return Some(Occurrence {
                    event_id: self.event.id.clone(),
                    date,
                    interval,
                    moved,
                });
            }
        }
        None
    }
}

/// Expand every event over the horizon; output sorted by interval then event id.
pub fn expand_all(
    events: &[FixedEvent],
    horizon: &Horizon,
    offset: FixedOffset,
) -> Result<Vec<Occurrence>, ScheduleError> {
    let mut all = Vec::new();
    for event in events {
        all.extend(RecurrenceExpander::new(event, *horizon, offset)?.occurrences());
    }
    all.sort_by(|a, b| {
        a.interval
            .cmp(&b.interval)
            .then_with(|| a.event_id.cmp(&b.event_id))
            .then_with(|| a.date.cmp(&b.date))
    });
    tracing::debug!(events = events.len(), occurrences = all.len(), "expanded fixed events");
    Ok(all)
}
