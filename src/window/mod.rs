use chrono::{DateTime, Duration, NaiveTime, Utc};

use crate::error::{Error, Result};

/// The `[from, to)` UTC range analytics are computed over. Construction
/// enforces `from <= to`; instances are never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if from > to {
            return Err(Error::InvalidWindow { from, to });
        }
        Ok(Self { from, to })
    }

    /// Default window at startup: the last hour.
    pub fn last_hour(now: DateTime<Utc>) -> Self {
        Self {
            from: now - Duration::hours(1),
            to: now,
        }
    }

    /// Quick-filter preset: UTC midnight `n` days back through now.
    pub fn last_days(n: i64, now: DateTime<Utc>) -> Self {
        let midnight = (now - Duration::days(n))
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc();
        Self {
            from: midnight,
            to: now,
        }
    }

    pub fn from_iso(&self) -> String {
        self.from.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    pub fn to_iso(&self) -> String {
        self.to.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowPhase {
    #[default]
    Idle,
    Editing,
    Applied,
    AutoRefreshing,
}

/// Owns the active window and the auto-refresh bookkeeping. Every mutation
/// bumps `epoch`; the dashboard compares epochs to reset pagination and
/// invalidate all four query slots (a hard invariant, not a convenience).
#[derive(Debug)]
pub struct WindowCoordinator {
    window: TimeWindow,
    phase: WindowPhase,
    last_updated: Option<DateTime<Utc>>,
    refresh_ticks: u64,
    epoch: u64,
}

impl WindowCoordinator {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            window: TimeWindow::last_hour(now),
            phase: WindowPhase::Applied,
            last_updated: None,
            refresh_ticks: 0,
            epoch: 0,
        }
    }

    pub fn window(&self) -> TimeWindow {
        self.window
    }

    pub fn phase(&self) -> WindowPhase {
        self.phase
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn refresh_ticks(&self) -> u64 {
        self.refresh_ticks
    }

    /// Monotonic mutation counter; grows on every window change.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn begin_edit(&mut self) {
        self.phase = WindowPhase::Editing;
    }

    /// Manual apply. A reversed range is rejected whole — the active
    /// window is left untouched (no partial apply).
    pub fn apply(&mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<TimeWindow> {
        let window = TimeWindow::new(from, to)?;
        self.window = window;
        self.phase = WindowPhase::Applied;
        self.epoch += 1;
        Ok(window)
    }

    /// Quick-filter preset. Disabled while auto-refresh owns the window.
    pub fn select_days(&mut self, n: i64, now: DateTime<Utc>) -> Result<TimeWindow> {
        if self.phase == WindowPhase::AutoRefreshing {
            return Err(Error::AutoRefreshActive);
        }
        self.window = TimeWindow::last_days(n, now);
        self.phase = WindowPhase::Applied;
        self.epoch += 1;
        Ok(self.window)
    }

    pub fn auto_refresh_active(&self) -> bool {
        self.phase == WindowPhase::AutoRefreshing
    }

    pub fn set_auto_refresh(&mut self, active: bool) {
        self.phase = if active {
            WindowPhase::AutoRefreshing
        } else {
            WindowPhase::Applied
        };
    }

    /// One auto-refresh tick: reassign `to = now`, leave `from` untouched,
    /// stamp `last_updated`. Ignored unless auto-refresh is active.
    pub fn auto_tick(&mut self, now: DateTime<Utc>) {
        if self.phase != WindowPhase::AutoRefreshing {
            return;
        }
        self.window.to = now;
        self.last_updated = Some(now);
        self.refresh_ticks += 1;
        self.epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, 14, 30, 0).unwrap()
    }

    #[test]
    fn default_window_is_last_hour() {
        let coordinator = WindowCoordinator::new(now());
        let window = coordinator.window();
        assert_eq!(window.to, now());
        assert_eq!(window.to - window.from, Duration::hours(1));
    }

    #[test]
    fn select_days_snaps_from_to_utc_midnight() {
        let mut coordinator = WindowCoordinator::new(now());
        let window = coordinator.select_days(7, now()).unwrap();
        assert_eq!(
            window.from,
            Utc.with_ymd_and_hms(2024, 3, 13, 0, 0, 0).unwrap()
        );
        assert_eq!(window.to, now());
    }

    #[test]
    fn select_days_rejected_while_auto_refreshing() {
        let mut coordinator = WindowCoordinator::new(now());
        coordinator.set_auto_refresh(true);
        assert!(matches!(
            coordinator.select_days(1, now()),
            Err(Error::AutoRefreshActive)
        ));
    }

    #[test]
    fn reversed_apply_is_rejected_and_window_unchanged() {
        let mut coordinator = WindowCoordinator::new(now());
        let before = coordinator.window();
        let epoch = coordinator.epoch();

        let result = coordinator.apply(now(), now() - Duration::hours(2));
        assert!(matches!(result, Err(Error::InvalidWindow { .. })));
        assert_eq!(coordinator.window(), before);
        assert_eq!(coordinator.epoch(), epoch);
    }

    #[test]
    fn equal_bounds_are_a_valid_window() {
        assert!(TimeWindow::new(now(), now()).is_ok());
    }

    #[test]
    fn three_ticks_reassign_to_three_times_and_leave_from_alone() {
        let mut coordinator = WindowCoordinator::new(now());
        let from_before = coordinator.window().from;
        coordinator.set_auto_refresh(true);

        // refresh_minutes = 0.5 → ticks 30s apart.
        for i in 1..=3u64 {
            let tick_time = now() + Duration::seconds(30 * i as i64);
            coordinator.auto_tick(tick_time);
        }

        assert_eq!(coordinator.refresh_ticks(), 3);
        assert_eq!(coordinator.window().from, from_before);
        assert_eq!(coordinator.window().to, now() + Duration::seconds(90));
        assert_eq!(
            coordinator.last_updated(),
            Some(now() + Duration::seconds(90))
        );
    }

    #[test]
    fn tick_outside_auto_refresh_is_a_no_op() {
        let mut coordinator = WindowCoordinator::new(now());
        let before = coordinator.window();
        coordinator.auto_tick(now() + Duration::hours(1));
        assert_eq!(coordinator.window(), before);
        assert_eq!(coordinator.refresh_ticks(), 0);
    }

    #[test]
    fn phases_walk_edit_apply_and_auto_refresh() {
        let mut coordinator = WindowCoordinator::new(now());
        assert_eq!(coordinator.phase(), WindowPhase::Applied);

        coordinator.begin_edit();
        assert_eq!(coordinator.phase(), WindowPhase::Editing);

        coordinator
            .apply(now() - Duration::hours(2), now())
            .unwrap();
        assert_eq!(coordinator.phase(), WindowPhase::Applied);

        coordinator.set_auto_refresh(true);
        assert_eq!(coordinator.phase(), WindowPhase::AutoRefreshing);
        coordinator.set_auto_refresh(false);
        assert_eq!(coordinator.phase(), WindowPhase::Applied);
    }

    #[test]
    fn every_mutation_bumps_epoch() {
        let mut coordinator = WindowCoordinator::new(now());
        let e0 = coordinator.epoch();
        coordinator.select_days(1, now()).unwrap();
        let e1 = coordinator.epoch();
        coordinator
            .apply(now() - Duration::hours(3), now())
            .unwrap();
        let e2 = coordinator.epoch();
        coordinator.set_auto_refresh(true);
        coordinator.auto_tick(now() + Duration::seconds(30));
        let e3 = coordinator.epoch();
        assert!(e0 < e1 && e1 < e2 && e2 < e3);
    }

    #[test]
    fn iso_bounds_are_utc_seconds() {
        let window = TimeWindow::last_days(1, now());
        assert_eq!(window.from_iso(), "2024-03-19T00:00:00Z");
        assert_eq!(window.to_iso(), "2024-03-20T14:30:00Z");
    }
}
