use chrono::{Datelike, Duration, Timelike};
use tracing::{debug, info, warn};

use crate::bus::{ControllerEvent, EventBus, EventHandler, HandlerId};
use crate::cache::EventCache;
use crate::config::CalendarConfig;
use crate::datetime::{DAYS_PER_WEEK, DateMath, DayRange, Instant, JulianDay, MINUTES_PER_DAY};
use crate::error::{CalendarError, CalendarResult};
use crate::event::{CalendarEvent, EventRow};
use crate::highlight::{MonthHighlightState, MonthHighlightTracker, ScrollSample};
use crate::loader::{EventLoader, LoadOutcome};
use crate::normalize::{clip_to_range, normalize};
use crate::scroll::{ScrollPositionResolver, VisibleWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollState {
    #[default]
    Idle,
    TouchScroll,
    Fling,
}

#[derive(Debug)]
pub struct CalendarController {
    config: CalendarConfig,
    math: DateMath,
    resolver: ScrollPositionResolver,
    tracker: MonthHighlightTracker,
    highlight: MonthHighlightState,
    window: VisibleWindow,
    time: Instant,
    desired_day: Instant,
    user_scrolled: bool,
    should_load: bool,
    scroll_state: ScrollState,
    bus: EventBus,
    loader: Option<EventLoader>,
    pending: Option<(u64, DayRange)>,
    cache: EventCache,
}

impl CalendarController {
    pub fn new(config: CalendarConfig) -> CalendarResult<Self> {
        let now = DateMath::from_config(&config)?.now();
        Self::with_time(config, &now)
    }

    #[tracing::instrument(skip(config, time), fields(timezone = %config.timezone))]
    pub fn with_time(config: CalendarConfig, time: &Instant) -> CalendarResult<Self> {
        let math = DateMath::from_config(&config)?;
        let resolver = ScrollPositionResolver::from_config(&config);
        let tracker = MonthHighlightTracker::from_config(&config);
        let time = math.normalize(time);
        let window = resolver.initial_window(&math, &time);
        let highlight = MonthHighlightState::new(window.focused_month);

        info!(
            time = %time,
            first_visible = %window.first_visible,
            "calendar controller ready"
        );

        Ok(Self {
            config,
            math,
            resolver,
            tracker,
            highlight,
            window,
            time,
            desired_day: time,
            user_scrolled: false,
            should_load: true,
            scroll_state: ScrollState::Idle,
            bus: EventBus::default(),
            loader: None,
            pending: None,
            cache: EventCache::new(),
        })
    }

    /// Hands fetching over to `loader` and starts loading the current window.
    pub fn attach_loader(&mut self, loader: EventLoader) {
        self.loader = Some(loader);
        self.reload_events();
    }

    pub fn time(&self) -> Instant {
        self.time
    }

    pub fn set_time(&mut self, time: &Instant) {
        self.time = self.math.normalize(time);
        debug!(time = %self.time, "controller time set");
    }

    pub fn window(&self) -> &VisibleWindow {
        &self.window
    }

    pub fn highlight(&self) -> MonthHighlightState {
        self.highlight
    }

    pub fn date_math(&self) -> &DateMath {
        &self.math
    }

    pub fn config(&self) -> &CalendarConfig {
        &self.config
    }

    pub fn scroll_state(&self) -> ScrollState {
        self.scroll_state
    }

    /// Generation of the fetch the controller is waiting for.
    pub fn pending_generation(&self) -> Option<u64> {
        self.pending.map(|(generation, _)| generation)
    }

    pub fn is_loading(&self) -> bool {
        self.loader.as_ref().is_some_and(EventLoader::is_loading)
    }

    pub fn register_handler(&mut self, handler: Box<dyn EventHandler>) -> HandlerId {
        self.bus.register(handler)
    }

    pub fn deregister_handler(&mut self, id: HandlerId) -> bool {
        self.bus.deregister(id)
    }

    pub fn send_event(&mut self, event: &ControllerEvent) -> usize {
        self.bus.send(event)
    }

    /// Moves the calendar to `target`. Returns whether an animated scroll
    /// was started.
    #[tracing::instrument(skip(self, target), fields(target = %target))]
    pub fn go_to(&mut self, target: &Instant, animate: bool, force_scroll: bool) -> bool {
        let target = self.math.normalize(target);
        let decision = self
            .resolver
            .resolve(&self.math, &target, &self.window, force_scroll);

        self.time = target;
        self.desired_day = target;
        self.user_scrolled = false;
        if decision.should_scroll {
            self.window = decision.window;
        }

        let month_start = JulianDay::from_date(self.math.first_day_of_month(&target));
        self.set_month_displayed(month_start);

        let animated = animate && decision.should_scroll && decision.should_animate;
        self.bus.send(&ControllerEvent::GoTo {
            selected: target,
            animate: animated,
            force_scroll,
        });

        if decision.requires_refetch && self.wants_load() {
            self.reload_events();
        }
        animated
    }

    pub fn go_to_today(&mut self) -> bool {
        let now = self.math.now();
        self.go_to(&now, true, false)
    }

    pub fn on_scroll(&mut self, sample: ScrollSample) {
        self.window = self
            .resolver
            .scrolled_window(&self.window, sample.first_visible_day);

        let (highlight, change) = self.tracker.on_scroll(self.highlight, &sample);
        self.highlight = highlight;
        if let Some(change) = change {
            self.set_month_displayed(change.anchor);
        }

        if !self.wants_load() {
            return;
        }
        if self.scroll_state == ScrollState::Idle {
            self.reload_events();
        } else {
            self.should_load = true;
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn on_scroll_state_changed(&mut self, state: ScrollState) {
        let previous = std::mem::replace(&mut self.scroll_state, state);
        if state == ScrollState::TouchScroll {
            self.user_scrolled = true;
        }
        if previous == state {
            return;
        }

        if state == ScrollState::Idle {
            if self.should_load || self.wants_load() {
                self.reload_events();
            }
            return;
        }

        if previous == ScrollState::Idle {
            self.desired_day = self.math.now();
            if let Some(loader) = self.loader.as_mut()
                && self.pending.take().is_some()
            {
                loader.cancel();
                self.should_load = true;
            }
        }
    }

    /// Starts a fetch of the current load range. Returns its generation, or
    /// `None` when no loader is attached.
    pub fn reload_events(&mut self) -> Option<u64> {
        let range = self.resolver.load_range(&self.window);
        let Some(loader) = self.loader.as_mut() else {
            self.should_load = true;
            return None;
        };
        let generation = loader.request(range);
        self.pending = Some((generation, range));
        self.should_load = false;
        Some(generation)
    }

    /// Applies every finished fetch. Returns whether the event cache changed.
    pub fn poll_events(&mut self) -> bool {
        let Some(loader) = self.loader.as_mut() else {
            return false;
        };
        let outcomes: Vec<LoadOutcome> = std::iter::from_fn(|| loader.try_next()).collect();

        let mut changed = false;
        for outcome in outcomes {
            changed |= self.apply_outcome(outcome);
        }
        changed
    }

    /// Waits for the in-flight fetch and applies it.
    pub async fn wait_for_events(&mut self) -> bool {
        if self.pending.is_none() {
            return false;
        }
        let Some(loader) = self.loader.as_mut() else {
            return false;
        };
        match loader.next().await {
            Some(outcome) => self.apply_outcome(outcome),
            None => false,
        }
    }

    /// Normalizes `rows` into the event cache for `range` and notifies
    /// handlers. Rows that fail validation are skipped and returned.
    #[tracing::instrument(skip(self, range, rows), fields(range = %range, rows = rows.len()))]
    pub fn load_rows(&mut self, range: DayRange, rows: Vec<EventRow>) -> Vec<CalendarError> {
        let mut rejected = Vec::new();
        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            match CalendarEvent::try_from(row) {
                Ok(event) => events.push(event),
                Err(err) => {
                    warn!(error = %err, "skipping malformed row");
                    rejected.push(err);
                }
            }
        }

        let normalized = normalize(events);
        rejected.extend(normalized.rejected);
        self.cache
            .replace(range, clip_to_range(normalized.events, &range));
        self.window.loaded = Some(range);

        self.bus
            .send(&ControllerEvent::EventsChanged { range: Some(range) });
        rejected
    }

    pub fn events_for_day(&self, day: JulianDay) -> &[CalendarEvent] {
        self.cache.events_for_day(day)
    }

    pub fn event_cache(&self) -> &EventCache {
        &self.cache
    }

    /// Re-reads the time zone from `cfg`, re-expressing the controller's
    /// instants in it. Returns whether the zone changed.
    #[tracing::instrument(skip(self, cfg), fields(timezone = %cfg.timezone))]
    pub fn refresh_time_zone(&mut self, cfg: &CalendarConfig) -> CalendarResult<bool> {
        if !self.math.refresh(cfg)? {
            return Ok(false);
        }
        self.config.timezone = cfg.timezone.clone();
        self.time = self.math.normalize(&self.time);
        self.desired_day = self.math.normalize(&self.desired_day);
        self.window.selected_day = self.math.normalize(&self.window.selected_day);
        self.emit_title();
        self.reload_events();
        Ok(true)
    }

    pub fn title(&self) -> String {
        let range = self.focused_month_range();
        self.math.month_title(range.first.to_date())
    }

    fn focused_month_range(&self) -> DayRange {
        self.math
            .month_range(self.window.focused_year, self.window.focused_month)
    }

    // The visible range is neither cached nor covered by the fetch in flight.
    fn wants_load(&self) -> bool {
        match self.pending {
            Some((_, range)) => !range.covers(&self.window.visible_range()),
            None => self.resolver.needs_refetch(&self.window),
        }
    }

    fn apply_outcome(&mut self, outcome: LoadOutcome) -> bool {
        let range = match self.pending {
            Some((generation, range)) if generation == outcome.generation => range,
            _ => {
                debug!(generation = outcome.generation, "ignoring unexpected fetch result");
                return false;
            }
        };
        self.pending = None;

        match outcome.result {
            Ok(rows) => {
                let rejected = self.load_rows(range, rows);
                if !rejected.is_empty() {
                    warn!(count = rejected.len(), "rows rejected during load");
                }
                true
            }
            Err(err) => {
                warn!(error = %err, range = %outcome.range, "event fetch failed; keeping cached events");
                self.reload_events();
                false
            }
        }
    }

    // Moves the month focus to the month of `anchor` and lets the selected
    // day follow it.
    fn set_month_displayed(&mut self, anchor: JulianDay) {
        let date = anchor.to_date();
        self.window.focused_month = date.month0();
        self.window.focused_year = date.year();
        self.highlight.current_month_displayed = date.month0();

        let desired = self.math.normalize(&self.desired_day);
        let use_desired = desired.year() == date.year() && desired.month0() == date.month0();
        let selected = if use_desired {
            desired
        } else {
            self.math.start_of_day(anchor)
        };
        let selected = round_to_half_hour(selected);
        self.window.selected_day = selected;

        if self.user_scrolled && selected != self.time {
            let offset = if use_desired {
                Duration::zero()
            } else {
                let week = i64::from(MINUTES_PER_DAY) * i64::from(DAYS_PER_WEEK);
                Duration::minutes(week * i64::from(self.resolver.num_weeks()) / 3)
            };
            self.time = selected + offset;
            debug!(time = %self.time, "controller time follows scroll");
        }

        self.emit_title();
    }

    fn emit_title(&mut self) {
        let range = self.focused_month_range();
        let title = self.math.month_title(range.first.to_date());
        debug!(%title, "updating title");
        self.bus.send(&ControllerEvent::UpdateTitle { title, range });
    }
}

fn round_to_half_hour(instant: Instant) -> Instant {
    let minute = if instant.minute() >= 30 { 30 } else { 0 };
    instant
        .with_minute(minute)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(instant)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use chrono::{NaiveDate, TimeZone, Timelike, Utc};

    use super::{CalendarController, ScrollState, round_to_half_hour};
    use crate::bus::{ControllerEvent, EventHandler};
    use crate::config::CalendarConfig;
    use crate::datetime::{DayRange, Instant, JulianDay};
    use crate::event::EventRow;
    use crate::highlight::ScrollSample;

    struct Recorder(Rc<RefCell<Vec<ControllerEvent>>>);

    impl EventHandler for Recorder {
        fn handle_event(&mut self, event: &ControllerEvent) {
            self.0.borrow_mut().push(event.clone());
        }
    }

    fn config() -> CalendarConfig {
        CalendarConfig::from_toml_str(
            r#"
timezone = "Europe/Berlin"

[view]
week_start = "monday"
"#,
        )
        .expect("valid config")
    }

    fn at(controller: &CalendarController, y: i32, m: u32, d: u32, h: u32, min: u32) -> Instant {
        controller
            .date_math()
            .time_zone()
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .expect("valid instant")
    }

    fn controller() -> (CalendarController, Rc<RefCell<Vec<ControllerEvent>>>) {
        controller_in(2026)
    }

    fn controller_in(year: i32) -> (CalendarController, Rc<RefCell<Vec<ControllerEvent>>>) {
        let cfg = config();
        let start = chrono_tz::Europe::Berlin
            .with_ymd_and_hms(year, 10, 19, 9, 15, 0)
            .single()
            .expect("valid instant");
        let mut controller = CalendarController::with_time(cfg, &start).expect("controller");
        let seen = Rc::new(RefCell::new(Vec::new()));
        controller.register_handler(Box::new(Recorder(Rc::clone(&seen))));
        (controller, seen)
    }

    fn jd(y: i32, m: u32, d: u32) -> JulianDay {
        JulianDay::from_date(NaiveDate::from_ymd_opt(y, m, d).expect("valid date"))
    }

    #[test]
    fn go_to_inside_window_keeps_window_and_updates_time() {
        let (mut controller, seen) = controller();
        let before = controller.window().first_visible;
        let target = at(&controller, 2026, 10, 23, 14, 45);

        assert!(!controller.go_to(&target, true, false));
        assert_eq!(controller.window().first_visible, before);
        assert_eq!(controller.time(), target);
        assert_eq!(controller.window().selected_day.minute(), 30);

        let seen = seen.borrow();
        assert!(seen.iter().any(|e| matches!(
            e,
            ControllerEvent::UpdateTitle { title, .. } if title == "October 2026"
        )));
        assert!(matches!(
            seen.last(),
            Some(ControllerEvent::GoTo { animate: false, .. })
        ));
    }

    #[test]
    fn go_to_far_target_jumps_without_animation() {
        let (mut controller, _) = controller();
        let target = controller.time() + chrono::Duration::days(400);

        assert!(!controller.go_to(&target, true, false));
        assert_eq!(controller.window().focused_month, 10);
        assert_eq!(controller.window().focused_year, 2027);
        assert_eq!(controller.title(), "November 2027");
        assert!(controller.window().is_visible(jd(2027, 11, 23)));
    }

    #[test]
    fn go_to_next_month_animates() {
        let (mut controller, _) = controller();
        let target = at(&controller, 2026, 11, 20, 8, 0);
        assert!(controller.go_to(&target, true, false));
        assert!(!controller.go_to(&at(&controller, 2026, 12, 20, 8, 0), false, false));
        assert_eq!(controller.title(), "December 2026");
    }

    #[test]
    fn load_rows_splits_and_clips() {
        let (mut controller, seen) = controller();
        let range = DayRange::new(jd(2026, 10, 1), jd(2026, 10, 31));
        let created_at = Utc
            .with_ymd_and_hms(2026, 9, 1, 0, 0, 0)
            .single()
            .expect("valid timestamp");
        let row = |id, day: JulianDay, start_minute, duration_minutes| EventRow {
            id,
            day: day.to_date(),
            start_minute,
            duration_minutes,
            name: "night shift".to_string(),
            description: String::new(),
            location: String::new(),
            color: 0xFF33_66CC,
            created_at,
        };

        let rejected = controller.load_rows(
            range,
            vec![
                row(1, jd(2026, 9, 30), 1320, 240),
                row(2, jd(2026, 10, 10), 1380, 120),
                row(3, jd(2026, 10, 12), 600, -5),
            ],
        );

        assert_eq!(rejected.len(), 1);
        let first = controller.events_for_day(jd(2026, 10, 1));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].origin_id(), 1);
        assert_eq!(first[0].event.duration_minutes, 120);
        assert!(!first[0].is_editable());

        assert_eq!(controller.events_for_day(jd(2026, 10, 10)).len(), 1);
        assert_eq!(controller.events_for_day(jd(2026, 10, 11)).len(), 1);
        assert_eq!(controller.event_cache().len(), 3);
        assert_eq!(controller.window().loaded, Some(range));
        assert!(matches!(
            seen.borrow().last(),
            Some(ControllerEvent::EventsChanged { range: Some(r) }) if *r == range
        ));
    }

    #[test]
    fn scrolling_moves_focus_and_time_once_user_scrolled() {
        // Leaving idle resets the desired day to now, so stay clear of the
        // current month. 2015 shares its calendar with 2026.
        let (mut controller, _) = controller_in(2015);
        controller.on_scroll_state_changed(ScrollState::TouchScroll);
        assert_eq!(controller.scroll_state(), ScrollState::TouchScroll);

        // Rows from 2015-10-26: the hysteresis row 2015-11-09..15 is November.
        controller.on_scroll(ScrollSample {
            scroll_offset: 400,
            first_visible_day: jd(2015, 10, 26),
            top_row_clipped: false,
        });

        assert_eq!(controller.window().focused_month, 10);
        assert_eq!(controller.highlight().current_month_displayed, 10);
        assert_eq!(controller.title(), "November 2015");
        assert_eq!(controller.window().first_visible, jd(2015, 10, 26));
        // Anchor 2015-11-16 plus two of the six visible weeks.
        assert_eq!(
            controller.date_math().julian_day(&controller.time()),
            jd(2015, 11, 30)
        );

        controller.on_scroll_state_changed(ScrollState::Idle);
        assert_eq!(controller.scroll_state(), ScrollState::Idle);
    }

    #[test]
    fn rounds_to_half_hours() {
        let t = chrono_tz::UTC
            .with_ymd_and_hms(2026, 10, 19, 9, 44, 12)
            .single()
            .expect("valid instant");
        assert_eq!(round_to_half_hour(t).minute(), 30);
        assert_eq!(round_to_half_hour(t).second(), 0);
        let early = t.with_minute(29).expect("valid minute");
        assert_eq!(round_to_half_hour(early).minute(), 0);
    }
}
