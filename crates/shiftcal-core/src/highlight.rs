use std::cmp::Ordering;

use tracing::{debug, trace};

use crate::config::CalendarConfig;
use crate::datetime::{DAYS_PER_WEEK, JulianDay};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthHighlightState {
    /// Zero-based month (January = 0).
    pub current_month_displayed: u32,
    pub is_scrolling_up: bool,
    pub previous_scroll_position: i64,
}

impl MonthHighlightState {
    pub fn new(current_month_displayed: u32) -> Self {
        Self {
            current_month_displayed,
            is_scrolling_up: false,
            previous_scroll_position: 0,
        }
    }
}

/// One scroll callback from the week list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollSample {
    /// Grows as the list moves towards later weeks.
    pub scroll_offset: i64,
    /// First day of the top visible row.
    pub first_visible_day: JulianDay,
    /// The top row is scrolled out far enough that it no longer counts.
    pub top_row_clipped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthChange {
    pub month: u32,
    /// Step from the previously focused month to `month`.
    pub diff: i32,
    /// Day the new focus is derived from.
    pub anchor: JulianDay,
}

/// Month focus tracking while the week list scrolls. The focused month only
/// moves once the row `scroll_hyst_weeks` below the top of the list belongs
/// to another month, so a single week peeking in from the neighbouring month
/// never flips the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthHighlightTracker {
    hyst_weeks: u32,
    num_weeks: u32,
}

impl MonthHighlightTracker {
    pub fn new(hyst_weeks: u32, num_weeks: u32) -> Self {
        Self {
            hyst_weeks,
            num_weeks,
        }
    }

    pub fn from_config(cfg: &CalendarConfig) -> Self {
        Self::new(cfg.view.scroll_hyst_weeks, cfg.view.num_weeks)
    }

    pub fn on_scroll(
        &self,
        state: MonthHighlightState,
        sample: &ScrollSample,
    ) -> (MonthHighlightState, Option<MonthChange>) {
        let is_scrolling_up = match sample
            .scroll_offset
            .cmp(&state.previous_scroll_position)
        {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => return (state, None),
        };

        let mut next = MonthHighlightState {
            is_scrolling_up,
            previous_scroll_position: sample.scroll_offset,
            ..state
        };

        let row = self.hyst_weeks + u32::from(sample.top_row_clipped);
        if row > self.num_weeks {
            trace!(row, "hysteresis row not on screen");
            return (next, None);
        }

        let week_first = sample
            .first_visible_day
            .plus_days(row as i32 * DAYS_PER_WEEK);
        let candidate = if is_scrolling_up {
            week_first.month0()
        } else {
            week_first.plus_days(DAYS_PER_WEEK - 1).month0()
        };

        if candidate == state.current_month_displayed {
            return (next, None);
        }

        // Scrolling down, anchor one week ahead so the incoming month is
        // picked up before it fills the screen.
        let anchor = if is_scrolling_up {
            week_first
        } else {
            week_first.plus_days(DAYS_PER_WEEK)
        };
        let month = anchor.month0();
        if month == state.current_month_displayed {
            return (next, None);
        }
        let diff = month_diff(state.current_month_displayed, month);
        debug!(
            from = state.current_month_displayed,
            to = month,
            diff,
            up = is_scrolling_up,
            "month focus changed"
        );
        next.current_month_displayed = month;

        (next, Some(MonthChange { month, diff, anchor }))
    }
}

/// Signed month step from `current` to `candidate`, treating the year
/// boundary as adjacent.
pub fn month_diff(current: u32, candidate: u32) -> i32 {
    match (current, candidate) {
        (11, 0) => 1,
        (0, 11) => -1,
        _ => candidate as i32 - current as i32,
    }
}
