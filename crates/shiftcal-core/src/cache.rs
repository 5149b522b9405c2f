use std::collections::BTreeMap;

use tracing::debug;

use crate::datetime::{DayRange, JulianDay};
use crate::event::CalendarEvent;

/// Normalized events of the loaded range, keyed by day.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventCache {
    range: Option<DayRange>,
    by_day: BTreeMap<JulianDay, Vec<CalendarEvent>>,
}

impl EventCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swaps in a freshly normalized batch. Events outside `range` are dropped.
    pub fn replace(&mut self, range: DayRange, events: Vec<CalendarEvent>) {
        let mut by_day: BTreeMap<JulianDay, Vec<CalendarEvent>> = BTreeMap::new();
        for event in events {
            let day = event.julian_day();
            if range.contains(day) {
                by_day.entry(day).or_default().push(event);
            }
        }

        self.range = Some(range);
        self.by_day = by_day;
        debug!(range = %range, days = self.by_day.len(), events = self.len(), "replaced event cache");
    }

    pub fn clear(&mut self) {
        self.range = None;
        self.by_day.clear();
    }

    pub fn range(&self) -> Option<DayRange> {
        self.range
    }

    pub fn events_for_day(&self, day: JulianDay) -> &[CalendarEvent] {
        self.by_day.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Days holding at least one event, ascending.
    pub fn days(&self) -> impl Iterator<Item = JulianDay> + '_ {
        self.by_day.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CalendarEvent> + '_ {
        self.by_day.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_day.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_day.is_empty()
    }
}
