//! End-to-end pipeline: wiremock backend → HTTP client → query slots →
//! series/grid shaping, exactly as `dispo dash` drives it.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dispo::api::{AnalyticsApi, HttpApi};
use dispo::dash::{self, DashContext};
use dispo::series::DispositionSeries;
use dispo::timezone::TimezoneConfig;

async fn mock_backend() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/records"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rows": [{
                "call_id": "c-1",
                "caller_id": "5551234",
                "agent": "ada",
                "disposition": "XFER",
                "duration_seconds": 42.0,
                "created_at": "2024-01-01T10:00:00Z",
                "recording_path": "/rec/c-1.wav",
                "total_records": 120
            }],
            "total_records": 120
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/agent-report"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "agent": "ada", "XFER": 30, "DNC": 4 },
            { "agent": "grace", "XFER": 11, "DC": 2 }
        ])))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/intervals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "time_slot": "2024-01-01T22:00:00Z",
                "interval_breakdown": "22:00",
                "xfer_pct": "110",
                "dnc_pct": "oops"
            },
            {
                "time_slot": "2024-01-02T00:00:00Z",
                "interval_breakdown": "00:00",
                "xfer_pct": "12.5"
            }
        ])))
        .mount(&server)
        .await;

    // No /last7 mock: the non-admin run never calls it.
    server
}

fn ctx(base: &MockServer) -> (Arc<dyn AnalyticsApi>, DashContext) {
    let api: Arc<dyn AnalyticsApi> = Arc::new(HttpApi::new(base.uri(), "test-key"));
    let ctx = DashContext {
        client_id: "acme".into(),
        admin: false,
        tz: TimezoneConfig::utc(),
    };
    (api, ctx)
}

#[tokio::test]
async fn refresh_fills_every_non_admin_slot() {
    let server = mock_backend().await;
    let (api, ctx) = ctx(&server);

    let shared = dash::shared(Utc.with_ymd_and_hms(2024, 1, 2, 1, 0, 0).unwrap());
    dash::refresh_all(shared.clone(), api, &ctx).await;

    let dash = shared.lock().await;
    let page = dash.slots.records.state().as_ready().unwrap();
    assert_eq!(page.total_records, 120);

    let report = dash.slots.agent_report.state().as_ready().unwrap();
    assert_eq!(report.len(), 2);
    assert_eq!(report[0].disposition_counts()["XFER"], 30);

    let rows = dash.slots.chart.state().as_ready().unwrap();
    let series = DispositionSeries::build(rows, &ctx.tz);
    // Clamped out-of-range and non-numeric percentages.
    assert_eq!(series.buckets[0].percentages["xfer"], 100.0);
    assert_eq!(series.buckets[0].percentages["dnc"], 0.0);
    // Axis dedup across the date boundary.
    assert_eq!(series.buckets[0].time_label, "2024-01-01");
    assert_eq!(series.buckets[1].time_label, "2024-01-02");

    // last7 was never requested for a non-admin session.
    assert!(dash.slots.last7_days.state().as_ready().is_none());
}

#[tokio::test]
async fn window_change_resets_page_before_the_next_fetch() {
    let server = mock_backend().await;
    let (api, ctx) = ctx(&server);

    let now = Utc.with_ymd_and_hms(2024, 1, 2, 1, 0, 0).unwrap();
    let shared = dash::shared(now);

    {
        let mut dash = shared.lock().await;
        dash.grid.set_page(9);
    }
    shared.lock().await.select_days(3, now).unwrap();
    dash::refresh_records(shared.clone(), api, &ctx).await;

    let dash = shared.lock().await;
    assert_eq!(dash.grid.pagination().page, 1);
    assert!(dash.slots.records.state().as_ready().is_some());
}

#[tokio::test]
async fn page_2_fetch_carries_the_page_param() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/records"))
        .and(query_param("page", "2"))
        .and(query_param("num_of_records", "25"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rows": [],
            "total_records": 60
        })))
        .expect(1)
        .mount(&server)
        .await;
    let (api, ctx) = ctx(&server);

    let shared = dash::shared(Utc::now());
    {
        let mut dash = shared.lock().await;
        dash.grid.set_page_size(25);
        dash.grid.set_page(2);
    }
    dash::refresh_records(shared.clone(), api, &ctx).await;

    let dash = shared.lock().await;
    let page = dash.slots.records.state().as_ready().unwrap();
    // Empty page is a Ready empty state, not an error.
    assert!(page.rows.is_empty());
    assert_eq!(page.total_records, 60);
}
