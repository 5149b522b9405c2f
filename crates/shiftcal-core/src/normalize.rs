use tracing::{debug, trace, warn};

use crate::datetime::{DayRange, MINUTES_PER_DAY};
use crate::error::CalendarError;
use crate::event::{CalendarEvent, Fragment};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub events: Vec<CalendarEvent>,
    pub rejected: Vec<CalendarError>,
}

/// Splits events that run past midnight into one fragment per day. The
/// first day is marked [`Fragment::Head`]; later days are read-only
/// [`Fragment::Continuation`] views pointing back at the origin id.
#[tracing::instrument(skip_all)]
pub fn normalize<I>(raw: I) -> Normalized
where
    I: IntoIterator<Item = CalendarEvent>,
{
    let mut out = Normalized::default();
    let mut input_count = 0usize;

    for event in raw {
        input_count += 1;
        if let Err(err) = event.validate() {
            warn!(id = event.id, error = %err, "skipping invalid event");
            out.rejected.push(err);
            continue;
        }
        split_into(event, &mut out.events);
    }

    debug!(
        input = input_count,
        fragments = out.events.len(),
        rejected = out.rejected.len(),
        "normalized events"
    );
    out
}

/// Keeps fragments whose day lies inside `range`, preserving order.
pub fn clip_to_range(events: Vec<CalendarEvent>, range: &DayRange) -> Vec<CalendarEvent> {
    events
        .into_iter()
        .filter(|event| range.contains(event.julian_day()))
        .collect()
}

fn split_into(event: CalendarEvent, out: &mut Vec<CalendarEvent>) {
    if !event.event.crosses_midnight() {
        out.push(event);
        return;
    }

    let origin = event.id;
    let total = event.event.duration_minutes;
    let first_index = out.len();

    let mut current = event;
    current.fragment = Fragment::Head;
    let mut index = 0u32;

    while current.event.crosses_midnight() {
        let first = MINUTES_PER_DAY - current.event.start_minute;
        let remainder = current.event.duration_minutes - first;

        let mut next = current.clone();
        next.day = current
            .day
            .succ_opt()
            .expect("calendar day overflowed while splitting an event");
        next.event.start_minute = 0;
        next.event.duration_minutes = remainder;
        index += 1;
        next.fragment = Fragment::Continuation { origin, index };

        current.event.duration_minutes = first;
        trace!(id = origin, day = %current.day, minutes = first, "emitted fragment");
        out.push(current);
        current = next;
    }
    out.push(current);

    let emitted: u32 = out[first_index..]
        .iter()
        .map(|fragment| fragment.event.duration_minutes)
        .sum();
    assert_eq!(emitted, total, "fragments of event {origin} lost duration");
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use super::{clip_to_range, normalize};
    use crate::datetime::{DayRange, JulianDay};
    use crate::error::CalendarError;
    use crate::event::{CalendarEvent, Event, Fragment};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).expect("valid date")
    }

    fn shift(id: i64, on: NaiveDate, start_minute: u32, duration_minutes: u32) -> CalendarEvent {
        let event = Event {
            id,
            name: format!("shift {id}"),
            description: "rota".to_string(),
            start_minute,
            duration_minutes,
            location: "station".to_string(),
            color: 0xFF00_AA00,
            created_at: Utc
                .with_ymd_and_hms(2026, 9, 30, 12, 0, 0)
                .single()
                .expect("valid instant"),
        };
        CalendarEvent::new(id, on, event)
    }

    #[test]
    fn late_evening_event_splits_at_midnight() {
        let out = normalize(vec![shift(1, day(19), 1380, 120)]);
        assert!(out.rejected.is_empty());
        assert_eq!(out.events.len(), 2);

        let head = &out.events[0];
        assert_eq!(head.day, day(19));
        assert_eq!(head.event.start_minute, 1380);
        assert_eq!(head.event.duration_minutes, 60);
        assert_eq!(head.fragment, Fragment::Head);
        assert!(head.is_editable());

        let tail = &out.events[1];
        assert_eq!(tail.day, day(20));
        assert_eq!(tail.event.start_minute, 0);
        assert_eq!(tail.event.duration_minutes, 60);
        assert_eq!(tail.fragment, Fragment::Continuation { origin: 1, index: 1 });
        assert_eq!(tail.origin_id(), 1);
        assert!(!tail.is_editable());
        assert_eq!(tail.event.name, head.event.name);
        assert_eq!(tail.event.location, head.event.location);
        assert_eq!(tail.event.color, head.event.color);
        assert_eq!(tail.created_at, head.created_at);
    }

    #[test]
    fn same_day_events_pass_through_unchanged() {
        let inputs = vec![
            shift(1, day(1), 0, 0),
            shift(2, day(1), 1439, 0),
            shift(3, day(1), 1439, 1),
            shift(4, day(1), 0, 1440),
            shift(5, day(1), 480, 480),
        ];
        let out = normalize(inputs.clone());
        assert_eq!(out.events, inputs);
    }

    #[test]
    fn multi_day_event_yields_one_fragment_per_day() {
        for midnights in 1..=5u32 {
            let duration = 840 + 1440 * (midnights - 1) + 30;
            let out = normalize(vec![shift(9, day(3), 600, duration)]);
            assert_eq!(out.events.len() as u32, midnights + 1);

            let total: u32 = out.events.iter().map(|e| e.event.duration_minutes).sum();
            assert_eq!(total, duration);

            for (offset, fragment) in out.events.iter().enumerate() {
                assert_eq!(fragment.day, day(3) + Duration::days(offset as i64));
                assert!(fragment.event.end_minute() <= 1440);
                assert_eq!(fragment.origin_id(), 9);
            }
        }
    }

    #[test]
    fn exact_multiple_of_a_day_does_not_emit_empty_tail() {
        let out = normalize(vec![shift(2, day(5), 0, 2880)]);
        let durations: Vec<u32> = out.events.iter().map(|e| e.event.duration_minutes).collect();
        assert_eq!(durations, vec![1440, 1440]);
    }

    #[test]
    fn preserves_input_order_across_events() {
        let out = normalize(vec![
            shift(1, day(10), 1300, 300),
            shift(2, day(9), 60, 30),
            shift(3, day(10), 1200, 2000),
        ]);
        let ids: Vec<(i64, NaiveDate)> = out.events.iter().map(|e| (e.origin_id(), e.day)).collect();
        assert_eq!(
            ids,
            vec![
                (1, day(10)),
                (1, day(11)),
                (2, day(9)),
                (3, day(10)),
                (3, day(11)),
                (3, day(12)),
            ]
        );
    }

    #[test]
    fn invalid_rows_are_reported_and_skipped() {
        let out = normalize(vec![
            shift(1, day(1), 60, 60),
            shift(2, day(1), 1440, 0),
            shift(3, day(1), 120, 60),
        ]);
        assert_eq!(out.events.len(), 2);
        assert_eq!(out.rejected.len(), 1);
        assert!(matches!(out.rejected[0], CalendarError::InvalidEvent { id: 2, .. }));
    }

    #[test]
    fn normalizing_twice_is_stable() {
        let once = normalize(vec![shift(4, day(2), 1000, 3000)]).events;
        let twice = normalize(once.clone()).events;
        assert_eq!(once, twice);
    }

    #[test]
    fn clip_drops_fragments_outside_range() {
        let events = normalize(vec![shift(1, day(18), 1380, 120)]).events;
        let range = DayRange::new(
            JulianDay::from_date(day(19)),
            JulianDay::from_date(day(25)),
        );
        let clipped = clip_to_range(events, &range);
        assert_eq!(clipped.len(), 1);
        assert_eq!(clipped[0].day, day(19));
        assert!(clipped[0].is_continuation());
    }
}
