//! End-to-end scheduling tests.
//!
//! Drives expansion, availability, allocation and mutation through the
//! public API the way a calling web layer would.

use autosched_core::{
    expand_all, DaySelector, FixedEvent, FlexibleItem, Horizon, Interval, ItemStatus,
    MutationGateway, PlanInput, Planner, Preference, RecurrenceRule, ScheduleError, TimeWindow,
    UnscheduledReason,
};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use indoc::indoc;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

const USER: &str = "student-1";

fn at(day: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, h, 0, 0).unwrap()
}

fn iv(day: u32, h1: u32, h2: u32) -> Interval {
    Interval::new(at(day, h1), at(day, h2)).unwrap()
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
}

fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

/// Weekly Monday lecture, 10:00-11:00, starting Monday 2026-03-02.
fn lecture() -> FixedEvent {
    FixedEvent::new("lecture", "Lecture", iv(2, 10, 11)).with_recurrence(RecurrenceRule::weekly())
}

fn weekday_band() -> Vec<Preference> {
    let band = TimeWindow::parse("09:00", "17:00").unwrap();
    (0..5)
        .map(|d| Preference::new(DaySelector::Weekday(d), band, 1.0))
        .collect()
}

fn gateway_for(horizon: Horizon, events: Vec<FixedEvent>, preferences: Vec<Preference>) -> MutationGateway {
    let gw = MutationGateway::default();
    gw.set_horizon(USER, horizon).unwrap();
    for event in events {
        gw.upsert_fixed_event(USER, event).unwrap();
    }
    gw.set_preferences(USER, preferences).unwrap();
    gw
}

// ============================================================================
// Concrete Scenarios
// ============================================================================

#[test]
fn test_homework_placed_after_lecture_in_preferred_band() {
    let gw = gateway_for(
        Horizon::new(at(2, 0), at(9, 0)).unwrap(),
        vec![lecture()],
        weekday_band(),
    );

    let homework = FlexibleItem::new("Homework", Duration::hours(2), at(4, 17), 1).with_id("homework");
    let report = gw.upsert_item(USER, homework).unwrap();

    assert_eq!(report.scheduled.len(), 1);
    assert_eq!(report.scheduled[0].interval, iv(2, 11, 13));
}

#[test]
fn test_higher_priority_wins_the_only_window() {
    // Only Monday 09:00-11:00 is free.
    let gw = gateway_for(
        Horizon::new(at(2, 0), at(3, 0)).unwrap(),
        vec![
            FixedEvent::new("morning", "Morning", iv(2, 0, 9)),
            FixedEvent::new("rest", "Rest of day", Interval::new(at(2, 11), at(3, 0)).unwrap()),
        ],
        vec![],
    );

    let snapshot = {
        let mut schedule = gw.snapshot(USER).unwrap();
        for item in [
            FlexibleItem::new("Essay", Duration::hours(2), at(2, 23), 1).with_id("essay"),
            FlexibleItem::new("Exam prep", Duration::hours(2), at(2, 23), 5).with_id("exam"),
        ] {
            schedule.items.insert(item.id.clone(), item);
        }
        schedule
    };
    gw.load(USER, snapshot).unwrap();
    let report = gw.reallocate(USER).unwrap();

    assert_eq!(report.scheduled[0].item_id, "exam");
    assert_eq!(report.unschedulable.len(), 1);
    assert_eq!(report.unschedulable[0].item_id, "essay");
    assert_eq!(report.unschedulable[0].reason, UnscheduledReason::NoFeasibleWindow);
}

#[test]
fn test_unschedulable_item_does_not_block_lower_priority() {
    let gw = gateway_for(
        Horizon::new(at(2, 9), at(2, 12)).unwrap(),
        vec![],
        vec![],
    );
    let mut schedule = gw.snapshot(USER).unwrap();
    for item in [
        FlexibleItem::new("Too long", Duration::hours(5), at(2, 12), 9).with_id("a"),
        FlexibleItem::new("Fits", Duration::hours(1), at(2, 12), 1).with_id("b"),
    ] {
        schedule.items.insert(item.id.clone(), item);
    }
    gw.load(USER, schedule).unwrap();
    gw.reallocate(USER).unwrap();

    let s = gw.snapshot(USER).unwrap();
    assert!(matches!(
        s.items["a"].status,
        ItemStatus::Unschedulable {
            reason: UnscheduledReason::NoFeasibleWindow
        }
    ));
    assert_eq!(s.items["b"].placement(), Some(iv(2, 9, 10)));
}

// ============================================================================
// Recurrence Exceptions
// ============================================================================

#[test]
fn test_cancelled_occurrence_only_removes_that_date() {
    let mut event = lecture();
    event.cancel_occurrence(date(9));
    let horizon = Horizon::new(at(2, 0), at(23, 0)).unwrap();

    let dates: Vec<_> = expand_all(&[event], &horizon, utc())
        .unwrap()
        .into_iter()
        .map(|o| o.date)
        .collect();
    assert_eq!(dates, vec![date(2), date(16)]);
}

#[test]
fn test_moved_occurrence_replaces_original_slot() {
    let mut event = lecture();
    event.move_occurrence(date(9), iv(10, 14, 15));
    let horizon = Horizon::new(at(2, 0), at(16, 0)).unwrap();

    let occurrences = expand_all(&[event.clone()], &horizon, utc()).unwrap();
    let intervals: Vec<_> = occurrences.iter().map(|o| o.interval).collect();
    assert_eq!(intervals, vec![iv(2, 10, 11), iv(10, 14, 15)]);
    assert!(occurrences[1].moved);

    // The vacated Monday slot is free, the substitute slot is busy.
    let gw = gateway_for(horizon, vec![event], vec![]);
    gw.upsert_item(
        USER,
        FlexibleItem::new("Old slot", Duration::hours(1), at(9, 11), 0)
            .with_id("old")
            .with_not_before(at(9, 10)),
    )
    .unwrap();
    gw.upsert_item(
        USER,
        FlexibleItem::new("After move", Duration::hours(2), at(10, 17), 0)
            .with_id("new")
            .with_not_before(at(10, 14)),
    )
    .unwrap();

    let s = gw.snapshot(USER).unwrap();
    assert_eq!(s.items["old"].placement(), Some(iv(9, 10, 11)));
    assert_eq!(s.items["new"].placement(), Some(iv(10, 15, 17)));
    s.validate(utc()).unwrap();
}

#[test]
fn test_manual_move_onto_moved_occurrence_conflicts() {
    let mut event = lecture();
    event.move_occurrence(date(9), iv(10, 14, 15));
    let gw = gateway_for(Horizon::new(at(2, 0), at(16, 0)).unwrap(), vec![event], vec![]);
    gw.upsert_item(USER, FlexibleItem::new("HW", Duration::hours(1), at(12, 0), 0).with_id("hw"))
        .unwrap();

    let err = gw.move_item(USER, "hw", iv(10, 14, 15)).unwrap_err();
    assert!(matches!(err, ScheduleError::OverlapConflict { .. }));
    gw.move_item(USER, "hw", iv(9, 10, 11)).unwrap();
}

// ============================================================================
// Determinism
// ============================================================================

fn plan_input() -> PlanInput {
    serde_json::from_str(indoc! {r#"
        {
          "horizon": {"from": "2026-03-02T00:00:00Z", "to": "2026-03-07T00:00:00Z"},
          "fixed_events": [{
            "id": "lecture", "title": "Lecture", "event_type": "Class",
            "interval": {"start": "2026-03-02T10:00:00Z", "end": "2026-03-02T11:00:00Z"},
            "recurrence": {"frequency": "daily"}
          }],
          "preferences": [
            {"days": "any", "window": {"start": "09:00", "end": "12:00"}, "weight": 1.0},
            {"days": "any", "window": {"start": "20:00", "end": "02:00"}, "weight": -1.0}
          ],
          "items": [
            {"id": "c", "title": "C", "duration_minutes": 45, "deadline": "2026-03-05T00:00:00Z", "priority": 1},
            {"id": "a", "title": "A", "duration_minutes": 90, "deadline": "2026-03-04T00:00:00Z"},
            {"id": "b", "title": "B", "duration_minutes": 30, "deadline": "2026-03-04T00:00:00Z", "priority": 3,
             "event_type": "Study Session"}
          ]
        }
    "#})
    .unwrap()
}

#[test]
fn test_repeated_runs_are_byte_identical() {
    let planner = Planner::default();
    let first = serde_json::to_string(&planner.plan(&plan_input()).unwrap()).unwrap();
    let second = serde_json::to_string(&planner.plan(&plan_input()).unwrap()).unwrap();
    assert_eq!(first, second);

    let order: Vec<_> = planner
        .plan(&plan_input())
        .unwrap()
        .decisions
        .into_iter()
        .map(|d| d.item_id)
        .collect();
    assert_eq!(order, vec!["b", "a", "c"]);
}

#[test]
fn test_gateway_and_planner_agree() {
    let input = plan_input();
    let planned = Planner::default().plan(&input).unwrap();

    let gw = gateway_for(input.horizon, input.fixed_events.clone(), input.preferences.clone());
    let mut schedule = gw.snapshot(USER).unwrap();
    for item in input.items {
        schedule.items.insert(item.id.clone(), item);
    }
    gw.load(USER, schedule).unwrap();
    gw.reallocate(USER).unwrap();

    let s = gw.snapshot(USER).unwrap();
    for placement in planned.placements() {
        assert_eq!(s.placements[&placement.item_id].interval, placement.interval);
    }
}

// ============================================================================
// Invariants
// ============================================================================

fn arb_items() -> impl Strategy<Value = Vec<FlexibleItem>> {
    prop::collection::vec((15i64..240, 2u32..9, 0u32..24, -2i32..5), 1..15).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(n, (minutes, day, hour, priority))| {
                FlexibleItem::new(format!("Item {n}"), Duration::minutes(minutes), at(day, hour), priority)
                    .with_id(format!("item-{n:02}"))
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_committed_schedule_never_overlaps(items in arb_items()) {
        let gw = gateway_for(
            Horizon::new(at(2, 0), at(9, 0)).unwrap(),
            vec![lecture(), FixedEvent::new("gym", "Gym", iv(3, 17, 19))],
            weekday_band(),
        );
        for item in &items {
            gw.upsert_item(USER, item.clone()).unwrap();
        }

        let s = gw.snapshot(USER).unwrap();
        prop_assert!(s.validate(utc()).is_ok());
        for item in &items {
            if let Some(placed) = s.items[&item.id].placement() {
                prop_assert!(placed.end() <= item.deadline);
                prop_assert_eq!(Some(placed.duration()), item.duration());
            }
        }
        let placements = s.placements();
        for pair in placements.windows(2) {
            prop_assert!(pair[0].interval.end() <= pair[1].interval.start());
        }
    }
}
