use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::models::WindowQuery;
use crate::api::AnalyticsApi;
use crate::error::Result;
use crate::grid::GridController;
use crate::query::QueryLayer;
use crate::timezone::TimezoneConfig;
use crate::window::{TimeWindow, WindowCoordinator};

/// Per-run fixed context: the session layer's resolved client and role,
/// plus the display zone. Read-only for the whole pipeline.
#[derive(Debug, Clone)]
pub struct DashContext {
    pub client_id: String,
    pub admin: bool,
    pub tz: TimezoneConfig,
}

/// The dashboard state proper: window coordinator, grid controller, and
/// the four query slots. All window mutations route through here so the
/// invariant holds: any window change resets the grid to page 1 and
/// invalidates every slot before the next fetch fires.
pub struct Dashboard {
    pub coordinator: WindowCoordinator,
    pub grid: GridController,
    pub slots: QueryLayer,
}

impl Dashboard {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            coordinator: WindowCoordinator::new(now),
            grid: GridController::new(),
            slots: QueryLayer::default(),
        }
    }

    pub fn window(&self) -> TimeWindow {
        self.coordinator.window()
    }

    pub fn select_days(&mut self, n: i64, now: DateTime<Utc>) -> Result<TimeWindow> {
        let window = self.coordinator.select_days(n, now)?;
        self.after_window_change();
        Ok(window)
    }

    pub fn apply_window(&mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<TimeWindow> {
        let window = self.coordinator.apply(from, to)?;
        self.after_window_change();
        Ok(window)
    }

    pub fn auto_tick(&mut self, now: DateTime<Utc>) {
        let epoch = self.coordinator.epoch();
        self.coordinator.auto_tick(now);
        if self.coordinator.epoch() != epoch {
            self.after_window_change();
        }
    }

    fn after_window_change(&mut self) {
        self.grid.on_window_change();
        self.slots.invalidate_all();
    }
}

pub type SharedDashboard = Arc<Mutex<Dashboard>>;

pub fn shared(now: DateTime<Utc>) -> SharedDashboard {
    Arc::new(Mutex::new(Dashboard::new(now)))
}

/// Issue all slot fetches for the current window concurrently and apply
/// whichever responses are still current. Slots render independently;
/// there is no all-ready gate, and one slot failing never blocks another.
pub async fn refresh_all(
    shared: SharedDashboard,
    api: Arc<dyn AnalyticsApi>,
    ctx: &DashContext,
) {
    let (records_token, records_query, report_token, chart_token, last7_token, window_query) = {
        let mut dash = shared.lock().await;
        let window = dash.window();
        let records_query = dash.grid.to_query(&window, &ctx.client_id);
        dash.grid.mark_fetched();
        let window_query = WindowQuery {
            client_id: ctx.client_id.clone(),
            from_date: window.from_iso(),
            to_date: window.to_iso(),
        };
        (
            dash.slots.records.begin(),
            records_query,
            dash.slots.agent_report.begin(),
            dash.slots.chart.begin(),
            ctx.admin.then(|| dash.slots.last7_days.begin()),
            window_query,
        )
    };

    let records = {
        let shared = shared.clone();
        let api = api.clone();
        tokio::spawn(async move {
            let result = api.fetch_records(&records_query).await;
            shared.lock().await.slots.records.apply(records_token, result);
        })
    };

    let report = {
        let shared = shared.clone();
        let api = api.clone();
        let query = window_query.clone();
        tokio::spawn(async move {
            let result = api.fetch_agent_report(&query).await;
            shared
                .lock()
                .await
                .slots
                .agent_report
                .apply(report_token, result);
        })
    };

    let chart = {
        let shared = shared.clone();
        let api = api.clone();
        let query = window_query.clone();
        tokio::spawn(async move {
            let result = api.fetch_intervals(&query).await;
            shared.lock().await.slots.chart.apply(chart_token, result);
        })
    };

    let last7 = last7_token.map(|token| {
        let shared = shared.clone();
        let api = api.clone();
        let query = window_query.clone();
        tokio::spawn(async move {
            let result = api.fetch_last7(&query).await;
            shared.lock().await.slots.last7_days.apply(token, result);
        })
    });

    let _ = records.await;
    let _ = report.await;
    let _ = chart.await;
    if let Some(last7) = last7 {
        let _ = last7.await;
    }
}

/// Re-fetch the records slot alone — filter, search, page, or page-size
/// changes never disturb the other three slots.
pub async fn refresh_records(
    shared: SharedDashboard,
    api: Arc<dyn AnalyticsApi>,
    ctx: &DashContext,
) {
    let (token, query) = {
        let mut dash = shared.lock().await;
        let window = dash.window();
        let query = dash.grid.to_query(&window, &ctx.client_id);
        dash.grid.mark_fetched();
        (dash.slots.records.begin(), query)
    };
    let result = api.fetch_records(&query).await;
    shared.lock().await.slots.records.apply(token, result);
}

/// The auto-refresh timer: an owned start/stop resource. Starting while
/// active aborts and replaces the running task — two tickers never stack.
#[derive(Default)]
pub struct RefreshTicker {
    handle: Option<JoinHandle<()>>,
}

impl RefreshTicker {
    pub fn new() -> Self {
        Self { handle: None }
    }

    pub fn is_active(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    pub async fn start(
        &mut self,
        minutes: f64,
        shared: SharedDashboard,
        api: Arc<dyn AnalyticsApi>,
        ctx: DashContext,
        notify: Option<tokio::sync::mpsc::UnboundedSender<()>>,
    ) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }

        shared.lock().await.coordinator.set_auto_refresh(true);

        let period = std::time::Duration::from_secs_f64(minutes * 60.0);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately; the cycle proper
            // starts one period out.
            interval.tick().await;
            loop {
                interval.tick().await;
                debug!("auto-refresh tick");
                shared.lock().await.auto_tick(Utc::now());
                refresh_all(shared.clone(), api.clone(), &ctx).await;
                if let Some(ref tx) = notify {
                    let _ = tx.send(());
                }
            }
        });
        self.handle = Some(handle);
    }

    pub async fn stop(&mut self, shared: &SharedDashboard) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        shared.lock().await.coordinator.set_auto_refresh(false);
    }
}

impl Drop for RefreshTicker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{
        AgentReportRow, Last7DaysRow, RawIntervalRow, RecordsPage, RecordsQuery,
    };
    use crate::error::Error;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 20, 14, 30, 0).unwrap()
    }

    fn ctx(admin: bool) -> DashContext {
        DashContext {
            client_id: "acme".into(),
            admin,
            tz: TimezoneConfig::utc(),
        }
    }

    #[derive(Default)]
    struct FakeApi {
        records_calls: AtomicUsize,
        chart_fails: bool,
    }

    #[async_trait]
    impl AnalyticsApi for FakeApi {
        async fn fetch_records(&self, _query: &RecordsQuery) -> crate::error::Result<RecordsPage> {
            self.records_calls.fetch_add(1, Ordering::SeqCst);
            Ok(RecordsPage {
                rows: Vec::new(),
                total_records: 7,
            })
        }

        async fn fetch_agent_report(
            &self,
            _query: &WindowQuery,
        ) -> crate::error::Result<Vec<AgentReportRow>> {
            Ok(Vec::new())
        }

        async fn fetch_intervals(
            &self,
            _query: &WindowQuery,
        ) -> crate::error::Result<Vec<RawIntervalRow>> {
            if self.chart_fails {
                return Err(Error::Fetch {
                    status: 500,
                    message: "interval backend down".into(),
                });
            }
            Ok(Vec::new())
        }

        async fn fetch_last7(
            &self,
            _query: &WindowQuery,
        ) -> crate::error::Result<Vec<Last7DaysRow>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn window_change_resets_page_and_invalidates_slots() {
        let shared = shared(now());
        {
            let mut dash = shared.lock().await;
            dash.grid.set_page(5);
            let token = dash.slots.chart.begin();
            dash.slots.chart.apply(token, Ok(Vec::new()));
            assert!(dash.slots.chart.state().as_ready().is_some());
        }

        shared.lock().await.select_days(2, now()).unwrap();

        let dash = shared.lock().await;
        assert_eq!(dash.grid.pagination().page, 1);
        assert!(dash.slots.chart.state().as_ready().is_none());
        assert!(dash.grid.needs_refetch());
    }

    #[tokio::test]
    async fn refresh_all_fills_slots_and_gates_last7_on_admin() {
        let shared = shared(now());
        let api = Arc::new(FakeApi::default());

        refresh_all(shared.clone(), api.clone(), &ctx(false)).await;
        {
            let dash = shared.lock().await;
            assert!(dash.slots.records.state().as_ready().is_some());
            assert!(dash.slots.agent_report.state().as_ready().is_some());
            assert!(dash.slots.chart.state().as_ready().is_some());
            // Non-admin never issues the last-7-days fetch.
            assert!(dash.slots.last7_days.state().as_ready().is_none());
        }

        refresh_all(shared.clone(), api, &ctx(true)).await;
        let dash = shared.lock().await;
        assert!(dash.slots.last7_days.state().as_ready().is_some());
    }

    #[tokio::test]
    async fn slot_error_does_not_touch_siblings() {
        let shared = shared(now());
        let api = Arc::new(FakeApi {
            chart_fails: true,
            ..Default::default()
        });

        refresh_all(shared.clone(), api, &ctx(false)).await;

        let dash = shared.lock().await;
        assert!(dash.slots.chart.state().error().is_some());
        assert!(dash.slots.records.state().as_ready().is_some());
        assert!(dash.slots.agent_report.state().as_ready().is_some());
    }

    #[tokio::test]
    async fn refresh_records_leaves_other_slots_alone() {
        let shared = shared(now());
        let api = Arc::new(FakeApi::default());

        refresh_all(shared.clone(), api.clone(), &ctx(false)).await;
        shared.lock().await.grid.set_page_size(100);
        refresh_records(shared.clone(), api.clone(), &ctx(false)).await;

        assert_eq!(api.records_calls.load(Ordering::SeqCst), 2);
        let dash = shared.lock().await;
        assert!(dash.slots.agent_report.state().as_ready().is_some());
        assert_eq!(dash.grid.pagination().page, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_advances_to_and_preserves_from() {
        let shared = shared(now());
        let api: Arc<dyn AnalyticsApi> = Arc::new(FakeApi::default());
        let from_before = shared.lock().await.window().from;

        let mut ticker = RefreshTicker::new();
        // refresh_minutes = 0.5 → one tick every 30 seconds.
        ticker
            .start(0.5, shared.clone(), api.clone(), ctx(false), None)
            .await;
        assert!(ticker.is_active());

        // Let the spawned task set up its interval before moving the clock.
        tokio::task::yield_now().await;

        for _ in 0..3 {
            tokio::time::advance(std::time::Duration::from_secs(30)).await;
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
        }

        ticker.stop(&shared).await;

        let dash = shared.lock().await;
        assert_eq!(dash.coordinator.refresh_ticks(), 3);
        assert_eq!(dash.window().from, from_before);
        assert!(dash.coordinator.last_updated().is_some());
        assert!(!dash.coordinator.auto_refresh_active());
    }

    #[tokio::test]
    async fn starting_a_second_ticker_replaces_the_first() {
        let shared = shared(now());
        let api: Arc<dyn AnalyticsApi> = Arc::new(FakeApi::default());

        let mut ticker = RefreshTicker::new();
        ticker
            .start(5.0, shared.clone(), api.clone(), ctx(false), None)
            .await;
        let first = ticker.handle.as_ref().unwrap().abort_handle();

        ticker
            .start(5.0, shared.clone(), api.clone(), ctx(false), None)
            .await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        // Old task aborted, exactly one ticker remains.
        assert!(first.is_finished());
        assert!(ticker.is_active());
        ticker.stop(&shared).await;
    }
}
