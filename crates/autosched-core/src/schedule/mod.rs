//! Schedule types: fixed events, preferences, flexible items and placements.
//!
//! These are the records the calling layer hands in and gets back. The
//! engine never persists them; [`crate::gateway`] keeps the per-user copy
//! that mutations run against.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;
use crate::interval::Interval;
use crate::recurrence::RecurrenceRule;

/// Lowest accepted preference weight (discouraged).
pub const WEIGHT_MIN: f64 = -1.0;
/// Highest accepted preference weight (preferred).
pub const WEIGHT_MAX: f64 = 1.0;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Most chunks one split item may produce.
pub const MAX_CHUNKS: i64 = 1_000;

/// Kind of calendar entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventType {
    Class,
    #[serde(rename = "Study Session")]
    Study,
    Leisure,
    Work,
    #[default]
    Other,
}

impl EventType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Class => "Class",
            Self::Study => "Study Session",
            Self::Leisure => "Leisure",
            Self::Work => "Work",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-occurrence override of a recurring event, keyed by occurrence date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OccurrenceOverride {
    #[default]
    Unchanged,
    Moved { interval: Interval },
    Cancelled,
}

/// An immovable calendar occupant, single or recurring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedEvent {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// First occurrence; its local date and time-of-day anchor the recurrence.
    pub interval: Interval,
    #[serde(default)]
    pub event_type: EventType,
    #[serde(default)]
    pub recurrence: Option<RecurrenceRule>,
    #[serde(default)]
    pub exceptions: BTreeMap<NaiveDate, OccurrenceOverride>,
}

impl FixedEvent {
    pub fn new(id: impl Into<String>, title: impl Into<String>, interval: Interval) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            interval,
            event_type: EventType::default(),
            recurrence: None,
            exceptions: BTreeMap::new(),
        }
    }

    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = event_type;
        self
    }

    pub fn with_recurrence(mut self, rule: RecurrenceRule) -> Self {
        self.recurrence = Some(rule);
        self
    }

    /// Drop the occurrence that falls on `date`.
    pub fn cancel_occurrence(&mut self, date: NaiveDate) {
        self.exceptions.insert(date, OccurrenceOverride::Cancelled);
    }

    /// Substitute `interval` for the occurrence that falls on `date`.
    pub fn move_occurrence(&mut self, date: NaiveDate, interval: Interval) {
        self.exceptions
            .insert(date, OccurrenceOverride::Moved { interval });
    }

    pub fn exception_for(&self, date: NaiveDate) -> OccurrenceOverride {
        self.exceptions.get(&date).copied().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.id.is_empty() {
            return Err(ScheduleError::invalid_value("id", "fixed event id is empty"));
        }
        match &self.recurrence {
            Some(rule) => rule.validate(),
            None => Ok(()),
        }
    }
}

/// Days a preference applies to. Weekdays count from Monday (0) to Sunday (6).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DaySelector {
    #[default]
    Any,
    Weekday(u8),
}

impl DaySelector {
    pub fn matches(&self, date: NaiveDate) -> bool {
        match self {
            Self::Any => true,
            Self::Weekday(wd) => date.weekday().num_days_from_monday() == u32::from(*wd),
        }
    }
}

/// A time-of-day window in local minutes since midnight.
///
/// `end <= start` wraps past midnight into the next day; `"00:00"` and
/// `"24:00"` as an end both mean end-of-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TimeWindowRepr", into = "TimeWindowRepr")]
pub struct TimeWindow {
    start: u32,
    end: u32,
}

#[derive(Serialize, Deserialize)]
struct TimeWindowRepr {
    start: String,
    end: String,
}

impl TryFrom<TimeWindowRepr> for TimeWindow {
    type Error = ScheduleError;

    fn try_from(repr: TimeWindowRepr) -> Result<Self, Self::Error> {
        TimeWindow::parse(&repr.start, &repr.end)
    }
}

impl From<TimeWindow> for TimeWindowRepr {
    fn from(w: TimeWindow) -> Self {
        Self {
            start: format_hhmm(w.start),
            end: format_hhmm(w.end),
        }
    }
}

impl TimeWindow {
    /// Build from minutes since midnight; both ends must be within `0..=1440`.
    pub fn from_minutes(start: u32, end: u32) -> Result<Self, ScheduleError> {
        if start >= MINUTES_PER_DAY || end > MINUTES_PER_DAY {
            return Err(ScheduleError::invalid_value(
                "window",
                format!("minutes out of range: {start}..{end}"),
            ));
        }
        if start == end && end != 0 {
            return Err(ScheduleError::invalid_value("window", "window is empty"));
        }
        Ok(Self { start, end })
    }

    /// Parse two `HH:MM` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, ScheduleError> {
        Self::from_minutes(parse_hhmm(start)?, parse_hhmm(end)?)
    }

    pub fn start_minute(&self) -> u32 {
        self.start
    }

    pub fn end_minute(&self) -> u32 {
        self.end
    }

    pub fn wraps_midnight(&self) -> bool {
        self.end <= self.start
    }

    /// The concrete interval this window covers when anchored on `date`.
    pub fn span_on(&self, date: NaiveDate, offset: FixedOffset) -> Option<Interval> {
        let start = local_instant(date, self.start, offset)?;
        let end_day = if self.wraps_midnight() {
            date.succ_opt()?
        } else {
            date
        };
        let end = local_instant(end_day, self.end, offset)?;
        Interval::new(start, end).ok()
    }
}

/// Convert a local date plus minutes-since-midnight into a UTC instant.
pub(crate) fn local_instant(
    date: NaiveDate,
    minute: u32,
    offset: FixedOffset,
) -> Option<DateTime<Utc>> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    let local = midnight + Duration::minutes(i64::from(minute));
    local
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse `HH:MM`, accepting `24:00` as end-of-day.
pub(crate) fn parse_hhmm(value: &str) -> Result<u32, ScheduleError> {
    let invalid = || ScheduleError::invalid_value("time", format!("expected HH:MM, got '{value}'"));

    let (h, m) = value.split_once(':').ok_or_else(invalid)?;
    let hour: u32 = h.trim().parse().map_err(|_| invalid())?;
    let minute: u32 = m.trim().parse().map_err(|_| invalid())?;
    if minute >= 60 || hour > 24 || (hour == 24 && minute != 0) {
        return Err(invalid());
    }
    Ok(hour * 60 + minute)
}

fn format_hhmm(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// A user's time preference.
///
/// Overlapping preferences combine by summing weights. A blackout
/// preference removes its window from availability instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    #[serde(default)]
    pub days: DaySelector,
    pub window: TimeWindow,
    #[serde(default)]
    pub weight: f64,
    /// Only items of this type feel the weight.
    #[serde(default)]
    pub event_type: Option<EventType>,
    #[serde(default)]
    pub blackout: bool,
}

impl Preference {
    pub fn new(days: DaySelector, window: TimeWindow, weight: f64) -> Self {
        Self {
            days,
            window,
            weight,
            event_type: None,
            blackout: false,
        }
    }

    /// A blackout over `window` on the selected days.
    pub fn blackout(days: DaySelector, window: TimeWindow) -> Self {
        Self {
            days,
            window,
            weight: 0.0,
            event_type: None,
            blackout: true,
        }
    }

    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = Some(event_type);
        self
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        if !self.weight.is_finite() || !(WEIGHT_MIN..=WEIGHT_MAX).contains(&self.weight) {
            return Err(ScheduleError::invalid_value(
                "weight",
                format!("{} outside [{WEIGHT_MIN}, {WEIGHT_MAX}]", self.weight),
            ));
        }
        if let DaySelector::Weekday(wd) = self.days {
            if wd > 6 {
                return Err(ScheduleError::invalid_value(
                    "days",
                    format!("weekday {wd} outside 0..=6"),
                ));
            }
        }
        Ok(())
    }

    /// The interval this preference covers for the occurrence anchored on `date`.
    pub fn span_on(&self, date: NaiveDate, offset: FixedOffset) -> Option<Interval> {
        if !self.days.matches(date) {
            return None;
        }
        self.window.span_on(date, offset)
    }
}

/// Why the allocator could not place an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnscheduledReason {
    /// No window fits the duration before the deadline
    NoFeasibleWindow,
    /// Duration is zero or negative
    InvalidDuration,
    /// `not_before` is not before the deadline
    DeadlineBeforeEarliestStart,
}

impl UnscheduledReason {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoFeasibleWindow => "NO_FEASIBLE_WINDOW",
            Self::InvalidDuration => "INVALID_DURATION",
            Self::DeadlineBeforeEarliestStart => "DEADLINE_BEFORE_EARLIEST_START",
        }
    }
}

/// Lifecycle of a flexible item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Pending,
    Scheduled { interval: Interval },
    Unschedulable { reason: UnscheduledReason },
}

/// Work the engine must place into free time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlexibleItem {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub duration_minutes: i64,
    /// Placements must end at or before this instant.
    pub deadline: DateTime<Utc>,
    /// Higher runs first among equal deadlines.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub event_type: EventType,
    /// Placements must not start before this instant.
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
    /// Local time of day the item may be placed in, on any day.
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
    /// Place the item as independent chunks of at most this many minutes.
    #[serde(default)]
    pub split_minutes: Option<i64>,
    /// Id of the item this chunk was split from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_of: Option<String>,
    #[serde(default)]
    pub status: ItemStatus,
}

impl FlexibleItem {
    /// Create a pending item with a fresh id.
    pub fn new(
        title: impl Into<String>,
        duration: Duration,
        deadline: DateTime<Utc>,
        priority: i32,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            description: None,
            duration_minutes: duration.num_minutes(),
            deadline,
            priority,
            event_type: EventType::default(),
            not_before: None,
            time_window: None,
            split_minutes: None,
            part_of: None,
            status: ItemStatus::Pending,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_event_type(mut self, event_type: EventType) -> Self {
        self.event_type = event_type;
        self
    }

    pub fn with_not_before(mut self, not_before: DateTime<Utc>) -> Self {
        self.not_before = Some(not_before);
        self
    }

    pub fn with_time_window(mut self, window: TimeWindow) -> Self {
        self.time_window = Some(window);
        self
    }

    pub fn with_split_minutes(mut self, minutes: i64) -> Self {
        self.split_minutes = Some(minutes);
        self
    }

    /// `None` when the minute count does not fit a [`Duration`].
    pub fn duration(&self) -> Option<Duration> {
        Duration::try_minutes(self.duration_minutes)
    }

    /// How many chunks the item is placed as.
    ///
    /// `None` when `split_minutes` is not positive or the split would give
    /// more than [`MAX_CHUNKS`] chunks.
    pub fn chunk_count(&self) -> Option<i64> {
        let Some(size) = self.split_minutes else {
            return Some(1);
        };
        if size <= 0 {
            return None;
        }
        let count = self.duration_minutes / size + i64::from(self.duration_minutes % size > 0);
        (count <= MAX_CHUNKS).then_some(count.max(1))
    }

    /// The chunks this item is placed as, in order.
    ///
    /// An item that needs no split comes back as a single clone. Otherwise
    /// chunk `n` gets id `{id}#{n}`, zero-padded so ids sort in chunk order,
    /// and the remainder goes to the last chunk.
    pub fn chunks(&self) -> Vec<FlexibleItem> {
        let (Some(count), Some(size)) = (self.chunk_count(), self.split_minutes) else {
            return vec![self.clone()];
        };
        if count <= 1 {
            return vec![self.clone()];
        }

        let width = count.to_string().len();
        let mut remaining = self.duration_minutes;
        let mut chunks = Vec::new();
        for n in 1..=count {
            let minutes = remaining.min(size);
            remaining -= minutes;
            chunks.push(FlexibleItem {
                id: format!("{}#{n:0width$}", self.id),
                title: format!("{} ({n}/{count})", self.title),
                duration_minutes: minutes,
                split_minutes: None,
                part_of: Some(self.id.clone()),
                status: ItemStatus::Pending,
                ..self.clone()
            });
        }
        chunks
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, ItemStatus::Pending)
    }

    pub fn placement(&self) -> Option<Interval> {
        match self.status {
            ItemStatus::Scheduled { interval } => Some(interval),
            _ => None,
        }
    }
}

/// Expand pending split items into their chunks; other items pass through.
pub fn split_items(items: &[FlexibleItem]) -> Vec<FlexibleItem> {
    items
        .iter()
        .flat_map(|item| {
            if item.is_pending() {
                item.chunks()
            } else {
                vec![item.clone()]
            }
        })
        .collect()
}

/// Who put a placement where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementSource {
    /// The slot allocator
    Auto,
    /// A user move or resize
    Manual,
}

/// The committed interval assignment for a flexible item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub item_id: String,
    pub interval: Interval,
    pub source: PlacementSource,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn event_type_uses_labels() {
        let json = serde_json::to_string(&EventType::Study).unwrap();
        assert_eq!(json, "\"Study Session\"");
        let decoded: EventType = serde_json::from_str("\"Class\"").unwrap();
        assert_eq!(decoded, EventType::Class);
    }

    #[test]
    fn parse_hhmm_bounds() {
        assert_eq!(parse_hhmm("09:30").unwrap(), 570);
        assert_eq!(parse_hhmm("24:00").unwrap(), 1440);
        assert!(parse_hhmm("24:01").is_err());
        assert!(parse_hhmm("9").is_err());
        assert!(parse_hhmm("10:60").is_err());
    }

    #[test]
    fn time_window_spans_and_wraps() {
        let utc = FixedOffset::east_opt(0).unwrap();
        let day = TimeWindow::parse("09:00", "17:00").unwrap();
        let span = day.span_on(date(2), utc).unwrap();
        assert_eq!(span.start(), Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap());
        assert_eq!(span.end(), Utc.with_ymd_and_hms(2026, 3, 2, 17, 0, 0).unwrap());

        let night = TimeWindow::parse("22:00", "02:00").unwrap();
        assert!(night.wraps_midnight());
        let span = night.span_on(date(2), utc).unwrap();
        assert_eq!(span.end(), Utc.with_ymd_and_hms(2026, 3, 3, 2, 0, 0).unwrap());

        let evening = TimeWindow::parse("20:00", "00:00").unwrap();
        let span = evening.span_on(date(2), utc).unwrap();
        assert_eq!(span.end(), Utc.with_ymd_and_hms(2026, 3, 3, 0, 0, 0).unwrap());
    }

    #[test]
    fn time_window_serializes_as_hhmm() {
        let w = TimeWindow::parse("08:05", "24:00").unwrap();
        let json = serde_json::to_value(w).unwrap();
        assert_eq!(json["start"], "08:05");
        assert_eq!(json["end"], "24:00");
        assert!(serde_json::from_str::<TimeWindow>(r#"{"start":"10:00","end":"10:00"}"#).is_err());
    }

    #[test]
    fn preference_weight_is_range_checked() {
        let w = TimeWindow::parse("09:00", "17:00").unwrap();
        assert!(Preference::new(DaySelector::Any, w, 1.0).validate().is_ok());
        assert!(Preference::new(DaySelector::Any, w, 1.5).validate().is_err());
        assert!(Preference::new(DaySelector::Any, w, f64::NAN).validate().is_err());
        assert!(Preference::new(DaySelector::Weekday(7), w, 0.0).validate().is_err());
    }

    #[test]
    fn weekday_selector_counts_from_monday() {
        // 2026-03-02 is a Monday.
        assert!(DaySelector::Weekday(0).matches(date(2)));
        assert!(!DaySelector::Weekday(0).matches(date(3)));
        assert!(DaySelector::Weekday(6).matches(date(8)));
    }

    #[test]
    fn flexible_item_defaults_to_pending() {
        let json = r#"{
            "id": "hw-1",
            "title": "Homework",
            "duration_minutes": 120,
            "deadline": "2026-03-04T17:00:00Z"
        }"#;
        let item: FlexibleItem = serde_json::from_str(json).unwrap();
        assert!(item.is_pending());
        assert_eq!(item.priority, 0);
        assert_eq!(item.event_type, EventType::Other);
        assert_eq!(item.duration(), Some(Duration::hours(2)));
        assert_eq!(item.time_window, None);
        assert_eq!(item.split_minutes, None);
    }

    #[test]
    fn duration_out_of_range_is_none() {
        let deadline = Utc.with_ymd_and_hms(2026, 3, 4, 17, 0, 0).unwrap();
        let mut item = FlexibleItem::new("Huge", Duration::hours(1), deadline, 0);
        item.duration_minutes = i64::MAX;
        assert_eq!(item.duration(), None);
    }

    #[test]
    fn split_gives_sized_chunks_with_remainder_last() {
        let deadline = Utc.with_ymd_and_hms(2026, 3, 4, 17, 0, 0).unwrap();
        let item = FlexibleItem::new("Essay", Duration::minutes(150), deadline, 2)
            .with_id("essay")
            .with_split_minutes(60);
        assert_eq!(item.chunk_count(), Some(3));

        let chunks = item.chunks();
        let shape: Vec<_> = chunks
            .iter()
            .map(|c| (c.id.as_str(), c.duration_minutes))
            .collect();
        assert_eq!(shape, vec![("essay#1", 60), ("essay#2", 60), ("essay#3", 30)]);
        assert!(chunks.iter().all(|c| c.part_of.as_deref() == Some("essay")
            && c.split_minutes.is_none()
            && c.priority == 2
            && c.deadline == deadline));
        assert_eq!(chunks[2].title, "Essay (3/3)");
    }

    #[test]
    fn chunk_ids_sort_in_chunk_order() {
        let deadline = Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap();
        let item = FlexibleItem::new("Reading", Duration::minutes(600), deadline, 0)
            .with_id("r")
            .with_split_minutes(50);
        let ids: Vec<String> = item.chunks().into_iter().map(|c| c.id).collect();
        assert_eq!(ids.first().map(String::as_str), Some("r#01"));
        assert_eq!(ids.last().map(String::as_str), Some("r#12"));
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(sorted, ids);
    }

    #[test]
    fn split_larger_than_duration_is_a_single_item() {
        let deadline = Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap();
        let item = FlexibleItem::new("Short", Duration::minutes(30), deadline, 0)
            .with_id("s")
            .with_split_minutes(45);
        assert_eq!(item.chunks(), vec![item.clone()]);
    }

    #[test]
    fn invalid_splits_have_no_chunk_count() {
        let deadline = Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap();
        let base = FlexibleItem::new("X", Duration::minutes(MAX_CHUNKS + 1), deadline, 0);
        assert_eq!(base.clone().with_split_minutes(0).chunk_count(), None);
        assert_eq!(base.clone().with_split_minutes(-5).chunk_count(), None);
        assert_eq!(base.clone().with_split_minutes(1).chunk_count(), None);
        assert_eq!(base.with_split_minutes(2).chunk_count(), Some(MAX_CHUNKS / 2 + 1));
    }

    #[test]
    fn split_items_leaves_scheduled_items_alone() {
        let deadline = Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap();
        let pending = FlexibleItem::new("P", Duration::hours(2), deadline, 0)
            .with_id("p")
            .with_split_minutes(60);
        let mut placed = pending.clone().with_id("done");
        placed.status = ItemStatus::Scheduled {
            interval: Interval::starting_at(deadline - Duration::hours(3), Duration::hours(2)).unwrap(),
        };
        let ids: Vec<String> = split_items(&[pending, placed])
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec!["p#1", "p#2", "done"]);
    }

    #[test]
    fn fixed_event_exceptions_round_trip_by_date() {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let iv = Interval::starting_at(start, Duration::hours(1)).unwrap();
        let mut event = FixedEvent::new("lecture", "Lecture", iv);
        event.cancel_occurrence(date(9));

        let json = serde_json::to_string(&event).unwrap();
        let decoded: FixedEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.exception_for(date(9)), OccurrenceOverride::Cancelled);
        assert_eq!(decoded.exception_for(date(16)), OccurrenceOverride::Unchanged);
    }
}
