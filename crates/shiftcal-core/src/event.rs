use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::datetime::{DayRange, JulianDay, MINUTES_PER_DAY};
use crate::error::{CalendarError, CalendarResult};

pub type EventId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,

    pub name: String,

    #[serde(default)]
    pub description: String,

    pub start_minute: u32,

    pub duration_minutes: u32,

    #[serde(default)]
    pub location: String,

    /// ARGB packed as `0xAARRGGBB`.
    pub color: u32,

    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn end_minute(&self) -> u32 {
        self.start_minute
            .checked_add(self.duration_minutes)
            .expect("event end minute overflowed")
    }

    pub fn crosses_midnight(&self) -> bool {
        self.end_minute() > MINUTES_PER_DAY
    }
}

/// How a calendar event relates to the stored event it was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fragment {
    Whole,
    /// First day of an event that was split at midnight.
    Head,
    /// Later day of a split event; a read-only view of `origin`.
    Continuation { origin: EventId, index: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: EventId,
    pub day: NaiveDate,
    pub event: Event,
    pub created_at: DateTime<Utc>,
    pub fragment: Fragment,
}

impl CalendarEvent {
    pub fn new(id: EventId, day: NaiveDate, event: Event) -> Self {
        Self {
            id,
            day,
            created_at: event.created_at,
            event,
            fragment: Fragment::Whole,
        }
    }

    pub fn julian_day(&self) -> JulianDay {
        JulianDay::from_date(self.day)
    }

    pub fn origin_id(&self) -> EventId {
        match self.fragment {
            Fragment::Continuation { origin, .. } => origin,
            Fragment::Whole | Fragment::Head => self.id,
        }
    }

    pub fn is_continuation(&self) -> bool {
        matches!(self.fragment, Fragment::Continuation { .. })
    }

    pub fn is_editable(&self) -> bool {
        !self.is_continuation()
    }

    pub fn validate(&self) -> CalendarResult<()> {
        if self.event.start_minute >= MINUTES_PER_DAY {
            return Err(CalendarError::invalid_event(
                self.id,
                format!(
                    "start minute {} is outside 0..{MINUTES_PER_DAY}",
                    self.event.start_minute
                ),
            ));
        }
        Ok(())
    }
}

/// A row exactly as the storage collaborator hands it over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRow {
    pub id: EventId,

    pub day: NaiveDate,

    pub start_minute: i64,

    pub duration_minutes: i64,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub location: String,

    #[serde(default)]
    pub color: u32,

    pub created_at: DateTime<Utc>,
}

impl EventRow {
    /// Days this row touches once split at midnight. Rows with a negative
    /// start or duration only cover their own day.
    pub fn day_span(&self) -> DayRange {
        let first = JulianDay::from_date(self.day);
        let end = self.start_minute.saturating_add(self.duration_minutes);
        if self.start_minute < 0 || self.duration_minutes <= 0 || end <= 0 {
            return DayRange::new(first, first);
        }
        let extra_days = (end - 1) / i64::from(MINUTES_PER_DAY);
        let last = i32::try_from(extra_days)
            .ok()
            .and_then(|days| first.0.checked_add(days))
            .map_or(JulianDay(i32::MAX), JulianDay);
        DayRange::new(first, last)
    }
}

impl TryFrom<EventRow> for CalendarEvent {
    type Error = CalendarError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let start_minute = u32::try_from(row.start_minute)
            .ok()
            .filter(|minute| *minute < MINUTES_PER_DAY)
            .ok_or_else(|| {
                CalendarError::invalid_event(
                    row.id,
                    format!(
                        "start minute {} is outside 0..{MINUTES_PER_DAY}",
                        row.start_minute
                    ),
                )
            })?;
        let duration_minutes = u32::try_from(row.duration_minutes)
            .ok()
            .filter(|duration| start_minute.checked_add(*duration).is_some())
            .ok_or_else(|| {
                CalendarError::invalid_event(
                    row.id,
                    format!("duration {} is not a valid minute count", row.duration_minutes),
                )
            })?;

        let event = Event {
            id: row.id,
            name: row.name,
            description: row.description,
            start_minute,
            duration_minutes,
            location: row.location,
            color: row.color,
            created_at: row.created_at,
        };
        Ok(CalendarEvent::new(row.id, row.day, event))
    }
}

impl From<&CalendarEvent> for EventRow {
    fn from(value: &CalendarEvent) -> Self {
        EventRow {
            id: value.id,
            day: value.day,
            start_minute: i64::from(value.event.start_minute),
            duration_minutes: i64::from(value.event.duration_minutes),
            name: value.event.name.clone(),
            description: value.event.description.clone(),
            location: value.event.location.clone(),
            color: value.event.color,
            created_at: value.created_at,
        }
    }
}
