//! Half-open time intervals and the horizon type.
//!
//! Everything above this module reasons about busy and free time through
//! [`Interval`]: a value type `[start, end)` with `start < end`. The
//! constructor is the only way in (serde included), so the free functions
//! [`overlaps`], [`subtract`] and [`merge`] are total over their inputs.

use std::fmt;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// A half-open interval `[start, end)` of UTC instants.
///
/// # Invariants
/// `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "IntervalRepr", into = "IntervalRepr")]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct IntervalRepr {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<IntervalRepr> for Interval {
    type Error = ScheduleError;

    fn try_from(repr: IntervalRepr) -> Result<Self, Self::Error> {
        Interval::new(repr.start, repr.end)
    }
}

impl From<Interval> for IntervalRepr {
    fn from(iv: Interval) -> Self {
        Self {
            start: iv.start,
            end: iv.end,
        }
    }
}

impl Interval {
    /// Create an interval, rejecting `start >= end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ScheduleError> {
        if start >= end {
            return Err(ScheduleError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    /// Create an interval from a start and a length.
    ///
    /// A length that runs past the representable range is rejected like an
    /// empty one.
    pub fn starting_at(start: DateTime<Utc>, length: Duration) -> Result<Self, ScheduleError> {
        match start.checked_add_signed(length) {
            Some(end) => Self::new(start, end),
            None => Err(ScheduleError::InvalidInterval { start, end: start }),
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Get duration in minutes
    pub fn duration_minutes(&self) -> i64 {
        self.duration().num_minutes()
    }

    /// Whether the two intervals share any instant. Touching intervals do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn contains_instant(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    /// The common part of two intervals, if any.
    pub fn intersection(&self, other: &Interval) -> Option<Interval> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(Interval { start, end })
    }

    /// Clip both ends into `[lo, hi)`; `None` when nothing remains.
    pub fn clip(&self, lo: DateTime<Utc>, hi: DateTime<Utc>) -> Option<Interval> {
        let start = self.start.max(lo);
        let end = self.end.min(hi);
        (start < end).then_some(Interval { start, end })
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Whether `a` and `b` overlap.
pub fn overlaps(a: &Interval, b: &Interval) -> bool {
    a.overlaps(b)
}

/// Remove all blocker coverage from `a`.
///
/// Returns the remaining pieces left-to-right, non-overlapping and sorted by
/// start. Blockers may arrive unsorted and may overlap each other.
pub fn subtract(a: &Interval, blockers: &[Interval]) -> Vec<Interval> {
    let mut remaining = Vec::new();
    let mut cursor = a.start;

    for blocker in merge(blockers) {
        if blocker.end <= cursor {
            continue;
        }
        if blocker.start >= a.end {
            break;
        }
        if blocker.start > cursor {
            remaining.push(Interval {
                start: cursor,
                end: blocker.start,
            });
        }
        cursor = cursor.max(blocker.end);
        if cursor >= a.end {
            break;
        }
    }

    if cursor < a.end {
        remaining.push(Interval {
            start: cursor,
            end: a.end,
        });
    }

    remaining
}

/// Minimal sorted non-overlapping cover of `intervals`.
///
/// Touching intervals (`a.end == b.start`) are fused.
pub fn merge(intervals: &[Interval]) -> Vec<Interval> {
    let mut sorted = intervals.to_vec();
    sorted.sort();

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for iv in sorted {
        match merged.last_mut() {
            Some(last) if iv.start <= last.end => {
                last.end = last.end.max(iv.end);
            }
            _ => merged.push(iv),
        }
    }
    merged
}

/// The bounded window `[from, to)` a scheduling run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "HorizonRepr", into = "HorizonRepr")]
pub struct Horizon {
    span: Interval,
}

#[derive(Serialize, Deserialize)]
struct HorizonRepr {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl TryFrom<HorizonRepr> for Horizon {
    type Error = ScheduleError;

    fn try_from(repr: HorizonRepr) -> Result<Self, Self::Error> {
        Horizon::new(repr.from, repr.to)
    }
}

impl From<Horizon> for HorizonRepr {
    fn from(h: Horizon) -> Self {
        Self {
            from: h.from(),
            to: h.to(),
        }
    }
}

impl Horizon {
    /// Create a horizon, rejecting `to <= from`.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self, ScheduleError> {
        Interval::new(from, to)
            .map(|span| Self { span })
            .map_err(|_| ScheduleError::InvalidHorizon { from, to })
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.span.start
    }

    pub fn to(&self) -> DateTime<Utc> {
        self.span.end
    }

    pub fn as_interval(&self) -> Interval {
        self.span
    }

    /// Local calendar dates touched by the horizon under `offset`, in order.
    pub fn local_days(&self, offset: FixedOffset) -> impl Iterator<Item = NaiveDate> {
        let first = self.from().with_timezone(&offset).date_naive();
        let last = (self.to() - Duration::nanoseconds(1))
            .with_timezone(&offset)
            .date_naive();
        first.iter_days().take_while(move |d| *d <= last)
    }

    /// A horizon spanning exactly `span`; already well-formed by construction.
    pub fn covering(span: Interval) -> Self {
        Self { span }
    }
}
