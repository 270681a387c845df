pub mod models;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Result};
use models::{AgentReportRow, Last7DaysRow, RawIntervalRow, RecordsPage, RecordsQuery, WindowQuery};

/// Seam between the analytics pipeline and the backend. One method per
/// query slot; the exporter reuses `fetch_records` with its own parameters.
#[async_trait]
pub trait AnalyticsApi: Send + Sync {
    async fn fetch_records(&self, query: &RecordsQuery) -> Result<RecordsPage>;
    async fn fetch_agent_report(&self, query: &WindowQuery) -> Result<Vec<AgentReportRow>>;
    async fn fetch_intervals(&self, query: &WindowQuery) -> Result<Vec<RawIntervalRow>>;
    async fn fetch_last7(&self, query: &WindowQuery) -> Result<Vec<Last7DaysRow>>;
}

/// reqwest-backed implementation against the aggregation backend.
pub struct HttpApi {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        pairs: &[(&'static str, String)],
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        debug!("GET {url}");

        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(pairs)
            .send()
            .await
            .map_err(Error::transport)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            return Err(Error::Fetch {
                status: status.as_u16(),
                message: snippet,
            });
        }

        resp.json::<T>().await.map_err(|err| Error::Fetch {
            status: status.as_u16(),
            message: format!("invalid response body: {err}"),
        })
    }
}

#[async_trait]
impl AnalyticsApi for HttpApi {
    async fn fetch_records(&self, query: &RecordsQuery) -> Result<RecordsPage> {
        self.get_json("records", &query.query_pairs()).await
    }

    async fn fetch_agent_report(&self, query: &WindowQuery) -> Result<Vec<AgentReportRow>> {
        self.get_json("agent-report", &query.query_pairs()).await
    }

    async fn fetch_intervals(&self, query: &WindowQuery) -> Result<Vec<RawIntervalRow>> {
        self.get_json("intervals", &query.query_pairs()).await
    }

    async fn fetch_last7(&self, query: &WindowQuery) -> Result<Vec<Last7DaysRow>> {
        self.get_json("last7", &query.query_pairs()).await
    }
}
