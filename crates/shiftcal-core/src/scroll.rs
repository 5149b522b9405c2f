use chrono::{Datelike, Weekday};
use tracing::debug;

use crate::config::CalendarConfig;
use crate::datetime::{
    DAYS_PER_WEEK, DateMath, DayRange, Instant, JulianDay, julian_day_from_weeks_since_epoch,
    week_start_day, weeks_since_epoch,
};

#[derive(Debug, Clone, PartialEq)]
pub struct VisibleWindow {
    pub first_visible: JulianDay,
    pub last_visible: JulianDay,
    pub selected_day: Instant,
    /// Zero-based month (January = 0).
    pub focused_month: u32,
    pub focused_year: i32,
    /// Day range the event cache currently holds.
    pub loaded: Option<DayRange>,
}

impl VisibleWindow {
    pub fn visible_range(&self) -> DayRange {
        DayRange::new(self.first_visible, self.last_visible)
    }

    pub fn is_visible(&self, day: JulianDay) -> bool {
        self.visible_range().contains(day)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrollDecision {
    pub list_position: i32,
    pub should_scroll: bool,
    pub should_animate: bool,
    pub requires_refetch: bool,
    pub window: VisibleWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollPositionResolver {
    week_start: Weekday,
    num_weeks: u32,
    weeks_buffer: u32,
}

impl ScrollPositionResolver {
    pub fn new(week_start: Weekday, num_weeks: u32, weeks_buffer: u32) -> Self {
        assert!(num_weeks > 0, "a window shows at least one week");
        Self {
            week_start,
            num_weeks,
            weeks_buffer,
        }
    }

    pub fn from_config(cfg: &CalendarConfig) -> Self {
        Self::new(
            cfg.week_start(),
            cfg.view.num_weeks,
            cfg.loader.weeks_buffer,
        )
    }

    pub fn week_start(&self) -> Weekday {
        self.week_start
    }

    pub fn num_weeks(&self) -> u32 {
        self.num_weeks
    }

    pub fn list_position(&self, day: JulianDay) -> i32 {
        weeks_since_epoch(day, self.week_start)
    }

    /// Jumps further than this many days are not animated.
    pub fn animate_threshold_days(&self) -> i32 {
        DAYS_PER_WEEK * self.num_weeks as i32 * 2
    }

    pub fn window_days(&self) -> i32 {
        DAYS_PER_WEEK * self.num_weeks as i32
    }

    /// Window showing the month that contains `selected`.
    pub fn initial_window(&self, math: &DateMath, selected: &Instant) -> VisibleWindow {
        let selected = math.normalize(selected);
        let month_start = math.first_day_of_month(&selected);
        let first_visible = week_start_day(JulianDay::from_date(month_start), self.week_start);
        VisibleWindow {
            first_visible,
            last_visible: first_visible.plus_days(self.window_days() - 1),
            focused_month: month_start.month0(),
            focused_year: month_start.year(),
            selected_day: selected,
            loaded: None,
        }
    }

    /// Window after the user scrolled so that the top row starts at
    /// `first_visible`. Focus and selection are left to the month tracker.
    pub fn scrolled_window(&self, window: &VisibleWindow, first_visible: JulianDay) -> VisibleWindow {
        let first_visible = week_start_day(first_visible, self.week_start);
        VisibleWindow {
            first_visible,
            last_visible: first_visible.plus_days(self.window_days() - 1),
            ..window.clone()
        }
    }

    pub fn load_range(&self, window: &VisibleWindow) -> DayRange {
        let buffer = DAYS_PER_WEEK * self.weeks_buffer as i32;
        window.visible_range().widen(buffer, buffer)
    }

    pub fn needs_refetch(&self, window: &VisibleWindow) -> bool {
        window
            .loaded
            .is_none_or(|loaded| !loaded.covers(&window.visible_range()))
    }

    #[tracing::instrument(skip(self, math, target, window), fields(first_visible = %window.first_visible))]
    pub fn resolve(
        &self,
        math: &DateMath,
        target: &Instant,
        window: &VisibleWindow,
        force_scroll: bool,
    ) -> ScrollDecision {
        let target = math.normalize(target);
        let target_day = math.julian_day(&target);
        let position = self.list_position(target_day);
        let first_position = self.list_position(window.first_visible);
        let last_position = first_position + self.num_weeks as i32 - 1;

        if !force_scroll && (first_position..=last_position).contains(&position) {
            debug!(position, first_position, "target already visible");
            return ScrollDecision {
                list_position: first_position,
                should_scroll: false,
                should_animate: false,
                requires_refetch: false,
                window: window.clone(),
            };
        }

        let month_start = math.first_day_of_month(&target);
        let list_position = self.list_position(JulianDay::from_date(month_start));
        let first_visible = julian_day_from_weeks_since_epoch(list_position, self.week_start);

        let window_center = window.first_visible.plus_days(self.window_days() / 2);
        let distance = window_center.days_until(target_day).abs();
        let should_animate = distance < self.animate_threshold_days();

        let resolved = VisibleWindow {
            first_visible,
            last_visible: first_visible.plus_days(self.window_days() - 1),
            selected_day: target,
            focused_month: month_start.month0(),
            focused_year: month_start.year(),
            loaded: window.loaded,
        };
        let requires_refetch = self.needs_refetch(&resolved);

        debug!(
            list_position,
            distance,
            should_animate,
            requires_refetch,
            "resolved scroll target"
        );
        ScrollDecision {
            list_position,
            should_scroll: true,
            should_animate,
            requires_refetch,
            window: resolved,
        }
    }
}
