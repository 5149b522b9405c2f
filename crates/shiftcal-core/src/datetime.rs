use std::fmt;

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday,
};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::CalendarConfig;
use crate::error::{CalendarError, CalendarResult};

/// A point in time carrying its time zone.
pub type Instant = DateTime<Tz>;

/// Julian day of 1970-01-01.
pub const EPOCH_JULIAN_DAY: i32 = 2_440_588;
pub const DAYS_PER_WEEK: i32 = 7;
pub const MINUTES_PER_DAY: u32 = 24 * 60;

// Julian day of 0000-12-31 in the proleptic Gregorian calendar, so that
// `num_days_from_ce() + CE_JULIAN_OFFSET` lands on the Julian day number.
const CE_JULIAN_OFFSET: i32 = 1_721_425;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JulianDay(pub i32);

impl JulianDay {
    pub fn from_date(date: NaiveDate) -> Self {
        JulianDay(date.num_days_from_ce() + CE_JULIAN_OFFSET)
    }

    pub fn to_date(self) -> NaiveDate {
        NaiveDate::from_num_days_from_ce_opt(self.0 - CE_JULIAN_OFFSET)
            .expect("julian day outside the supported calendar range")
    }

    pub fn plus_days(self, days: i32) -> Self {
        JulianDay(
            self.0
                .checked_add(days)
                .expect("julian day arithmetic overflowed"),
        )
    }

    pub fn days_until(self, other: JulianDay) -> i32 {
        other.0 - self.0
    }

    /// Zero-based month (January = 0) of this day.
    pub fn month0(self) -> u32 {
        self.to_date().month0()
    }
}

impl fmt::Display for JulianDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive range of Julian days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DayRange {
    pub first: JulianDay,
    pub last: JulianDay,
}

impl DayRange {
    pub fn new(first: JulianDay, last: JulianDay) -> Self {
        assert!(first <= last, "day range {first}..={last} is inverted");
        Self { first, last }
    }

    pub fn contains(&self, day: JulianDay) -> bool {
        self.first <= day && day <= self.last
    }

    pub fn covers(&self, other: &DayRange) -> bool {
        self.contains(other.first) && self.contains(other.last)
    }

    pub fn overlaps(&self, other: &DayRange) -> bool {
        self.first <= other.last && other.first <= self.last
    }

    pub fn len_days(&self) -> i32 {
        self.first.days_until(self.last) + 1
    }

    pub fn widen(&self, before: i32, after: i32) -> Self {
        DayRange::new(self.first.plus_days(-before), self.last.plus_days(after))
    }
}

impl fmt::Display for DayRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.first, self.last)
    }
}

pub fn weeks_since_epoch(day: JulianDay, week_start: Weekday) -> i32 {
    (day.0 - epoch_reference_day(week_start)).div_euclid(DAYS_PER_WEEK)
}

pub fn julian_day_from_weeks_since_epoch(weeks: i32, week_start: Weekday) -> JulianDay {
    JulianDay(epoch_reference_day(week_start) + weeks * DAYS_PER_WEEK)
}

/// First day of the week containing `day`.
pub fn week_start_day(day: JulianDay, week_start: Weekday) -> JulianDay {
    julian_day_from_weeks_since_epoch(weeks_since_epoch(day, week_start), week_start)
}

// The epoch fell on a Thursday; week zero starts on the last `week_start`
// on or before it.
fn epoch_reference_day(week_start: Weekday) -> i32 {
    let diff = (Weekday::Thu.num_days_from_sunday() as i32
        - week_start.num_days_from_sunday() as i32)
        .rem_euclid(DAYS_PER_WEEK);
    EPOCH_JULIAN_DAY - diff
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateMath {
    zone: Tz,
}

impl DateMath {
    pub fn new(time_zone_id: &str) -> CalendarResult<Self> {
        Ok(Self::with_zone(parse_time_zone(time_zone_id)?))
    }

    pub fn with_zone(zone: Tz) -> Self {
        Self { zone }
    }

    pub fn from_config(cfg: &CalendarConfig) -> CalendarResult<Self> {
        Self::new(&cfg.timezone)
    }

    pub fn time_zone(&self) -> Tz {
        self.zone
    }

    pub fn set_time_zone(&mut self, time_zone_id: &str) -> CalendarResult<()> {
        self.zone = parse_time_zone(time_zone_id)?;
        Ok(())
    }

    /// Re-reads the zone from `cfg`. Returns whether it changed.
    #[tracing::instrument(skip(self, cfg), fields(current = %self.zone))]
    pub fn refresh(&mut self, cfg: &CalendarConfig) -> CalendarResult<bool> {
        let zone = parse_time_zone(&cfg.timezone)?;
        if zone == self.zone {
            debug!("time zone unchanged");
            return Ok(false);
        }
        info!(from = %self.zone, to = %zone, "refreshed time zone");
        self.zone = zone;
        Ok(true)
    }

    pub fn now(&self) -> Instant {
        Utc::now().with_timezone(&self.zone)
    }

    pub fn instant_from_millis(&self, millis: i64) -> Option<Instant> {
        DateTime::<Utc>::from_timestamp_millis(millis).map(|dt| dt.with_timezone(&self.zone))
    }

    pub fn normalize(&self, instant: &Instant) -> Instant {
        instant.with_timezone(&self.zone)
    }

    pub fn julian_day(&self, instant: &Instant) -> JulianDay {
        JulianDay::from_date(self.normalize(instant).date_naive())
    }

    pub fn date(&self, day: JulianDay) -> NaiveDate {
        day.to_date()
    }

    /// Local wall-clock time on `date`. Times inside a DST gap move forward
    /// past the gap; ambiguous times take the earlier offset.
    pub fn at_local(&self, date: NaiveDate, hour: u32, minute: u32) -> Instant {
        let naive = date
            .and_hms_opt(hour.min(23), minute.min(59), 0)
            .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN));
        self.resolve_local(naive)
    }

    pub fn start_of_day(&self, day: JulianDay) -> Instant {
        self.at_local(day.to_date(), 0, 0)
    }

    pub fn first_day_of_month(&self, instant: &Instant) -> NaiveDate {
        let local = self.normalize(instant);
        NaiveDate::from_ymd_opt(local.year(), local.month(), 1)
            .expect("first of month always exists")
    }

    pub fn month_range(&self, year: i32, month0: u32) -> DayRange {
        let first = NaiveDate::from_ymd_opt(year, month0 + 1, 1)
            .expect("month index must be 0..=11");
        let next = if month0 >= 11 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month0 + 2, 1)
        }
        .expect("first of next month always exists");
        DayRange::new(
            JulianDay::from_date(first),
            JulianDay::from_date(next).plus_days(-1),
        )
    }

    pub fn month_title(&self, date: NaiveDate) -> String {
        date.format("%B %Y").to_string()
    }

    fn resolve_local(&self, naive: NaiveDateTime) -> Instant {
        match self.zone.from_local_datetime(&naive) {
            LocalResult::Single(dt) => dt,
            LocalResult::Ambiguous(first, second) => {
                debug!(%first, %second, "ambiguous local time; using earliest");
                if first <= second { first } else { second }
            }
            LocalResult::None => {
                warn!(local = %naive, zone = %self.zone, "local time falls in a DST gap");
                self.zone
                    .from_local_datetime(&(naive + Duration::hours(1)))
                    .earliest()
                    .unwrap_or_else(|| self.zone.from_utc_datetime(&naive))
            }
        }
    }
}

pub fn parse_time_zone(raw: &str) -> CalendarResult<Tz> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        warn!("time zone id was empty");
        return Err(CalendarError::InvalidTimeZone(raw.to_string()));
    }

    trimmed.parse::<Tz>().map_err(|err| {
        warn!(timezone = %trimmed, error = %err, "failed to parse time zone id");
        CalendarError::InvalidTimeZone(trimmed.to_string())
    })
}

pub fn parse_weekday_name(token: &str) -> Option<Weekday> {
    match token.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thur" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}
