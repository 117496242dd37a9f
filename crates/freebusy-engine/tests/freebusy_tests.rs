//! Busy-time computation over events: clipping, merging, recurrence and
//! query-bound handling.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use freebusy_engine::{
    compute_free_busy, compute_free_busy_with, parse_calendar, CalendarComponent, EngineConfig,
    FreeBusyError, FreeBusyQuery, Interval, Recurrence, Status,
};

const EVENT1: &str = include_str!("fixtures/event1.ics");
const EVENT2: &str = include_str!("fixtures/event2.ics");
const ADJACENT: &str = include_str!("fixtures/event_adjacent.ics");
const NONADJACENT: &str = include_str!("fixtures/event_nonadjacent.ics");
const EVENT3_TRANSPARENT: &str = include_str!("fixtures/event3_transparent.ics");
const EVENT3_OPAQUE: &str = include_str!("fixtures/event3_opaque.ics");
const WEEKLY_WITH_OVERRIDE: &str = include_str!("fixtures/weekly_with_override.ics");

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .unwrap()
        .and_hms_opt(h, mi, 0)
        .unwrap()
}

fn load(fixtures: &[&str]) -> Vec<CalendarComponent> {
    fixtures
        .iter()
        .flat_map(|text| parse_calendar(text).expect("fixture should parse"))
        .collect()
}

// ---------------------------------------------------------------------------
// Single events and window clipping
// ---------------------------------------------------------------------------

#[test]
fn single_event_inside_window() {
    let components = load(&[EVENT2]);
    let query = FreeBusyQuery::new(naive(2007, 7, 13, 17, 0)).until(naive(2007, 7, 15, 17, 0));

    let result = compute_free_busy(&query, &components).unwrap();

    assert_eq!(
        result.busy,
        vec![Interval::new(utc(2007, 7, 14, 17, 0), utc(2007, 7, 15, 4, 0))]
    );
}

#[test]
fn event_outside_window_is_ignored() {
    // EVENT1 is a year earlier than the window.
    let components = load(&[EVENT1]);
    let query = FreeBusyQuery::new(utc(2007, 7, 13, 17, 0)).until(utc(2007, 7, 15, 17, 0));

    let result = compute_free_busy(&query, &components).unwrap();

    assert!(!result.has_busy());
}

#[test]
fn naive_and_utc_bounds_agree() {
    let components = load(&[EVENT1, EVENT2, ADJACENT]);
    let naive_query =
        FreeBusyQuery::new(naive(2007, 7, 13, 17, 0)).until(naive(2007, 7, 15, 17, 0));
    let utc_query = FreeBusyQuery::new(utc(2007, 7, 13, 17, 0)).until(utc(2007, 7, 15, 17, 0));

    let from_naive = compute_free_busy(&naive_query, &components).unwrap();
    let from_utc = compute_free_busy(&utc_query, &components).unwrap();

    assert_eq!(from_naive, from_utc);
}

#[test]
fn floating_bounds_follow_configured_zone() {
    let components = load(&[EVENT2]);
    let config = EngineConfig::default().with_floating_timezone(chrono_tz::Europe::Paris);
    // 19:00 in Paris (CEST) is 17:00 UTC.
    let query = FreeBusyQuery::new(naive(2007, 7, 14, 19, 0)).until(naive(2007, 7, 14, 21, 0));

    let result = compute_free_busy_with(&query, &components, &config).unwrap();

    assert_eq!(result.window_start, utc(2007, 7, 14, 17, 0));
    assert_eq!(
        result.busy,
        vec![Interval::new(utc(2007, 7, 14, 17, 0), utc(2007, 7, 14, 19, 0))]
    );
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

#[test]
fn adjacent_events_merge_and_clip_to_window() {
    let components = load(&[EVENT1, EVENT2, ADJACENT]);
    let query = FreeBusyQuery::new(naive(2007, 7, 13, 17, 0)).until(naive(2007, 7, 15, 17, 0));

    let result = compute_free_busy(&query, &components).unwrap();

    assert_eq!(
        result.busy,
        vec![Interval::new(utc(2007, 7, 14, 17, 0), utc(2007, 7, 15, 17, 0))]
    );
}

#[test]
fn window_end_cuts_merged_interval() {
    let components = load(&[EVENT1, EVENT2, ADJACENT]);
    let query = FreeBusyQuery::new(naive(2007, 7, 13, 17, 0)).until(naive(2007, 7, 15, 3, 0));

    let result = compute_free_busy(&query, &components).unwrap();

    assert_eq!(
        result.busy,
        vec![Interval::new(utc(2007, 7, 14, 17, 0), utc(2007, 7, 15, 3, 0))]
    );
}

#[test]
fn gapped_events_stay_separate() {
    let components = load(&[EVENT1, EVENT2, NONADJACENT]);
    let query = FreeBusyQuery::new(naive(2007, 7, 13, 17, 0)).until(naive(2007, 7, 15, 17, 0));

    let result = compute_free_busy(&query, &components).unwrap();

    assert_eq!(
        result.busy,
        vec![
            Interval::new(utc(2007, 7, 14, 17, 0), utc(2007, 7, 15, 4, 0)),
            Interval::new(utc(2007, 7, 15, 6, 0), utc(2007, 7, 15, 17, 0)),
        ]
    );
}

#[test]
fn gapped_event_after_window_end_is_dropped() {
    let components = load(&[EVENT1, EVENT2, NONADJACENT]);
    let query = FreeBusyQuery::new(naive(2007, 7, 13, 17, 0)).until(naive(2007, 7, 15, 3, 0));

    let result = compute_free_busy(&query, &components).unwrap();

    assert_eq!(
        result.busy,
        vec![Interval::new(utc(2007, 7, 14, 17, 0), utc(2007, 7, 15, 3, 0))]
    );
}

#[test]
fn recomputation_is_idempotent() {
    let components = load(&[EVENT1, EVENT2, NONADJACENT, EVENT3_OPAQUE]);
    let query = FreeBusyQuery::new(utc(2006, 1, 1, 0, 0)).until(utc(2008, 1, 1, 0, 0));

    let first = compute_free_busy(&query, &components).unwrap();
    let second = compute_free_busy(&query, &components).unwrap();

    assert_eq!(first, second);
}

// ---------------------------------------------------------------------------
// Transparency, status and recurrence
// ---------------------------------------------------------------------------

#[test]
fn transparent_recurring_event_reports_nothing() {
    let components = load(&[EVENT3_TRANSPARENT]);
    let query = FreeBusyQuery::new(naive(1997, 11, 1, 17, 0)).until(naive(1997, 11, 3, 19, 0));

    let result = compute_free_busy(&query, &components).unwrap();

    assert!(result.busy.is_empty());
}

#[test]
fn opaque_recurring_all_day_event_reports_the_day() {
    let components = load(&[EVENT3_OPAQUE]);
    let query = FreeBusyQuery::new(naive(2007, 11, 1, 17, 0)).until(naive(2007, 11, 3, 19, 0));

    let result = compute_free_busy(&query, &components).unwrap();

    assert_eq!(
        result.busy,
        vec![Interval::new(utc(2007, 11, 2, 0, 0), utc(2007, 11, 3, 0, 0))]
    );
}

#[test]
fn all_day_event_covers_the_local_day_across_dst() {
    // Paris springs forward on 2026-03-29, a 23-hour day.
    let text = "BEGIN:VEVENT\r\nUID:spring\r\nDTSTART;VALUE=DATE:20260329\r\nEND:VEVENT\r\n";
    let config = EngineConfig::default().with_floating_timezone(chrono_tz::Europe::Paris);
    let query = FreeBusyQuery::new(utc(2026, 3, 28, 0, 0)).until(utc(2026, 3, 31, 0, 0));

    let result = compute_free_busy_with(&query, &load(&[text]), &config).unwrap();

    assert_eq!(
        result.busy,
        vec![Interval::new(utc(2026, 3, 28, 23, 0), utc(2026, 3, 29, 22, 0))]
    );
}

#[test]
fn yearly_all_day_event_tracks_local_midnight() {
    // The first instance falls on a 23-hour day; later ones are 24 hours.
    let text = "BEGIN:VEVENT\r\nUID:yearly\r\nDTSTART;VALUE=DATE:20250330\r\n\
                DTEND;VALUE=DATE:20250331\r\nRRULE:FREQ=YEARLY\r\nEND:VEVENT\r\n";
    let config = EngineConfig::default().with_floating_timezone(chrono_tz::Europe::Paris);
    let query = FreeBusyQuery::new(utc(2026, 3, 1, 0, 0)).until(utc(2026, 4, 30, 0, 0));

    let result = compute_free_busy_with(&query, &load(&[text]), &config).unwrap();

    assert_eq!(
        result.busy,
        vec![Interval::new(utc(2026, 3, 29, 22, 0), utc(2026, 3, 30, 22, 0))]
    );
}

#[test]
fn zoned_rule_with_utc_until() {
    let text = "BEGIN:VEVENT\r\nUID:standup\r\n\
                DTSTART;TZID=America/New_York:20260101T090000\r\n\
                DTEND;TZID=America/New_York:20260101T093000\r\n\
                RRULE:FREQ=DAILY;UNTIL=20260103T140000Z\r\nEND:VEVENT\r\n";
    let query = FreeBusyQuery::new(utc(2026, 1, 1, 0, 0)).until(utc(2026, 1, 10, 0, 0));

    let result = compute_free_busy(&query, &load(&[text])).unwrap();

    assert_eq!(
        result.busy,
        vec![
            Interval::new(utc(2026, 1, 1, 14, 0), utc(2026, 1, 1, 14, 30)),
            Interval::new(utc(2026, 1, 2, 14, 0), utc(2026, 1, 2, 14, 30)),
            Interval::new(utc(2026, 1, 3, 14, 0), utc(2026, 1, 3, 14, 30)),
        ]
    );
}

#[test]
fn duration_past_the_calendar_range_is_invalid_input() {
    let text = "BEGIN:VEVENT\r\nUID:forever\r\nDTSTART:20260302T090000Z\r\n\
                DURATION:P15200000000W\r\nEND:VEVENT\r\n";
    let query = FreeBusyQuery::new(utc(2026, 3, 2, 0, 0)).until(utc(2026, 3, 3, 0, 0));

    assert!(matches!(
        compute_free_busy(&query, &load(&[text])),
        Err(FreeBusyError::InvalidInput(_))
    ));
}

#[test]
fn cancelled_event_reports_nothing() {
    let event = CalendarComponent::event("c", utc(2026, 3, 2, 9, 0), utc(2026, 3, 2, 10, 0))
        .with_status(Status::Cancelled);
    let query = FreeBusyQuery::new(utc(2026, 3, 2, 0, 0)).until(utc(2026, 3, 3, 0, 0));

    let result = compute_free_busy(&query, &[event]).unwrap();

    assert!(result.busy.is_empty());
}

#[test]
fn overrides_replace_master_occurrences() {
    // Weekly Paris meeting at 10:00: 03-16 is excluded, 03-09 moved to 14:00,
    // and DST starts on 03-29.
    let components = load(&[WEEKLY_WITH_OVERRIDE]);
    let query = FreeBusyQuery::new(utc(2026, 3, 1, 0, 0)).until(utc(2026, 4, 10, 0, 0));

    let result = compute_free_busy(&query, &components).unwrap();

    assert_eq!(
        result.busy,
        vec![
            Interval::new(utc(2026, 3, 2, 9, 0), utc(2026, 3, 2, 10, 0)),
            Interval::new(utc(2026, 3, 9, 13, 0), utc(2026, 3, 9, 14, 0)),
            Interval::new(utc(2026, 3, 23, 9, 0), utc(2026, 3, 23, 10, 0)),
            Interval::new(utc(2026, 3, 30, 8, 0), utc(2026, 3, 30, 9, 0)),
            Interval::new(utc(2026, 4, 6, 8, 0), utc(2026, 4, 6, 9, 0)),
        ]
    );
}

#[test]
fn rdate_adds_an_occurrence() {
    let event = CalendarComponent::event("r", utc(2026, 3, 2, 9, 0), utc(2026, 3, 2, 10, 0))
        .with_recurrence(Recurrence::default().with_rdate(utc(2026, 3, 4, 15, 0)));
    let query = FreeBusyQuery::new(utc(2026, 3, 1, 0, 0)).until(utc(2026, 3, 8, 0, 0));

    let result = compute_free_busy(&query, &[event]).unwrap();

    assert_eq!(
        result.busy,
        vec![
            Interval::new(utc(2026, 3, 2, 9, 0), utc(2026, 3, 2, 10, 0)),
            Interval::new(utc(2026, 3, 4, 15, 0), utc(2026, 3, 4, 16, 0)),
        ]
    );
}

#[test]
fn open_ended_window_covers_later_occurrences() {
    let event = CalendarComponent::event("d", utc(2026, 3, 2, 9, 0), utc(2026, 3, 2, 10, 0))
        .with_rrule("FREQ=DAILY;COUNT=3");
    let query = FreeBusyQuery::new(utc(2026, 3, 3, 0, 0));

    let result = compute_free_busy(&query, &[event]).unwrap();

    assert_eq!(result.window_end, None);
    assert_eq!(result.busy.len(), 2);
    assert_eq!(result.busy[1].start, utc(2026, 3, 4, 9, 0));
}

#[test]
fn instance_limit_caps_expansion() {
    let event = CalendarComponent::event("d", utc(2026, 1, 1, 9, 0), utc(2026, 1, 1, 10, 0))
        .with_rrule("FREQ=DAILY");
    let config = EngineConfig {
        max_instances: 5,
        ..EngineConfig::default()
    };
    let query = FreeBusyQuery::new(utc(2026, 1, 1, 0, 0)).until(utc(2027, 1, 1, 0, 0));

    let result = compute_free_busy_with(&query, &[event], &config).unwrap();

    assert_eq!(result.busy.len(), 5);
}

// ---------------------------------------------------------------------------
// Degenerate input
// ---------------------------------------------------------------------------

#[test]
fn timed_event_without_end_is_zero_length() {
    let mut event = CalendarComponent::event("z", utc(2026, 3, 2, 9, 0), utc(2026, 3, 2, 9, 0));
    event.end = None;
    let query = FreeBusyQuery::new(utc(2026, 3, 2, 0, 0)).until(utc(2026, 3, 3, 0, 0));

    assert!(compute_free_busy(&query, &[event]).unwrap().busy.is_empty());
}

#[test]
fn event_ending_before_start_is_invalid() {
    let event = CalendarComponent::event("bad", utc(2026, 3, 2, 10, 0), utc(2026, 3, 2, 9, 0));
    let query = FreeBusyQuery::new(utc(2026, 3, 2, 0, 0)).until(utc(2026, 3, 3, 0, 0));

    assert!(matches!(
        compute_free_busy(&query, &[event]),
        Err(FreeBusyError::InvalidInput(_))
    ));
}

#[test]
fn event_without_start_is_invalid() {
    let mut event = CalendarComponent::event("bad", utc(2026, 3, 2, 9, 0), utc(2026, 3, 2, 10, 0));
    event.start = None;
    let query = FreeBusyQuery::new(utc(2026, 3, 2, 0, 0)).until(utc(2026, 3, 3, 0, 0));

    assert!(matches!(
        compute_free_busy(&query, &[event]),
        Err(FreeBusyError::InvalidInput(_))
    ));
}

#[test]
fn inverted_window_is_invalid() {
    let query = FreeBusyQuery::new(utc(2026, 3, 3, 0, 0)).until(utc(2026, 3, 2, 0, 0));

    assert!(matches!(
        compute_free_busy(&query, &[]),
        Err(FreeBusyError::InvalidInput(_))
    ));
}

#[test]
fn unparseable_rule_is_reported() {
    let event = CalendarComponent::event("r", utc(2026, 3, 2, 9, 0), utc(2026, 3, 2, 10, 0))
        .with_rrule("FREQ=SOMETIMES");
    let query = FreeBusyQuery::new(utc(2026, 3, 2, 0, 0)).until(utc(2026, 3, 9, 0, 0));

    assert!(matches!(
        compute_free_busy(&query, &[event]),
        Err(FreeBusyError::InvalidRule(_))
    ));
}

// ---------------------------------------------------------------------------
// Free slots
// ---------------------------------------------------------------------------

#[test]
fn free_slots_fill_the_gaps() {
    let events = vec![
        CalendarComponent::event("a", utc(2026, 3, 2, 10, 0), utc(2026, 3, 2, 11, 0)),
        CalendarComponent::event("b", utc(2026, 3, 2, 13, 0), utc(2026, 3, 2, 14, 0)),
    ];
    let query = FreeBusyQuery::new(utc(2026, 3, 2, 8, 0)).until(utc(2026, 3, 2, 17, 0));

    let result = compute_free_busy(&query, &events).unwrap();
    let free = result.free_slots();

    assert_eq!(free.len(), 3);
    assert_eq!(free[0].duration_minutes, 120);
    assert_eq!(free[1].duration_minutes, 120);
    assert_eq!(free[2].duration_minutes, 180);
    assert_eq!(
        result.first_free_slot(150).map(|s| s.start),
        Some(utc(2026, 3, 2, 14, 0))
    );
    assert_eq!(result.first_free_slot(240), None);
}

#[test]
fn open_ended_window_omits_trailing_free_time() {
    let events = vec![CalendarComponent::event(
        "a",
        utc(2026, 3, 2, 10, 0),
        utc(2026, 3, 2, 11, 0),
    )];
    let query = FreeBusyQuery::new(utc(2026, 3, 2, 8, 0));

    let result = compute_free_busy(&query, &events).unwrap();

    assert_eq!(result.free_slots().len(), 1);
}

#[test]
fn result_serializes_to_json() {
    let events = vec![CalendarComponent::event(
        "a",
        utc(2026, 3, 2, 10, 0),
        utc(2026, 3, 2, 11, 0),
    )];
    let query = FreeBusyQuery::new(utc(2026, 3, 2, 8, 0)).until(utc(2026, 3, 2, 17, 0));

    let result = compute_free_busy(&query, &events).unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["busy"][0]["start"], "2026-03-02T10:00:00Z");
    assert_eq!(json["window_end"], "2026-03-02T17:00:00Z");
}
