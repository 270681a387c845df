use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One call record row, a read-only server projection. Columns the schema
/// doesn't know are quarantined into `extra` rather than trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: String,
    pub caller_id: String,
    pub agent: String,
    pub disposition: String,
    #[serde(default)]
    pub duration_seconds: f64,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
    #[serde(default)]
    pub recording_path: String,
    /// Server-echoed pagination total, not a per-row fact.
    #[serde(default)]
    pub total_records: i64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Records slot response: one page plus the authoritative total.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordsPage {
    #[serde(default)]
    pub rows: Vec<CallRecord>,
    #[serde(default)]
    pub total_records: i64,
}

impl RecordsPage {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Aggregated per-agent disposition counts for the window. Disposition
/// labels are dynamic columns, captured via the flattened map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReportRow {
    pub agent: String,
    #[serde(flatten)]
    pub raw: BTreeMap<String, serde_json::Value>,
}

impl AgentReportRow {
    /// Numeric columns are disposition counts; anything else is ignored.
    pub fn disposition_counts(&self) -> BTreeMap<String, i64> {
        self.raw
            .iter()
            .filter_map(|(label, value)| coerce_count(value).map(|n| (label.clone(), n)))
            .collect()
    }

    pub fn total_calls(&self) -> i64 {
        self.disposition_counts().values().sum()
    }
}

/// One raw interval row from the chart endpoint. `<label>_pct` columns are
/// dynamic; the transformer splits them out of `raw`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawIntervalRow {
    /// ISO-8601 UTC slot start.
    pub time_slot: String,
    /// Wall-clock slice label, "HH:MM".
    pub interval_breakdown: String,
    #[serde(flatten)]
    pub raw: BTreeMap<String, serde_json::Value>,
}

impl RawIntervalRow {
    /// `(label, raw value)` for every `<label>_pct` column.
    pub fn pct_fields(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.raw
            .iter()
            .filter_map(|(key, value)| key.strip_suffix("_pct").map(|label| (label, value)))
    }

    /// Columns that are neither known fields nor `_pct` — kept aside, not trusted.
    pub fn quarantined(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.raw
            .iter()
            .filter(|(key, _)| !key.ends_with("_pct"))
            .map(|(key, value)| (key.as_str(), value))
    }
}

/// Per-day, per-agent disposition breakdown (admin-only consumer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Last7DaysRow {
    pub date: String,
    pub agent: String,
    #[serde(flatten)]
    pub raw: BTreeMap<String, serde_json::Value>,
}

impl Last7DaysRow {
    pub fn disposition_counts(&self) -> BTreeMap<String, i64> {
        self.raw
            .iter()
            .filter_map(|(label, value)| coerce_count(value).map(|n| (label.clone(), n)))
            .collect()
    }
}

fn coerce_count(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Window-scoped parameters shared by every slot fetch. Dates are always
/// normalized UTC before they reach the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowQuery {
    pub client_id: String,
    pub from_date: String,
    pub to_date: String,
}

/// Records fetch parameters: the window plus pagination and the two search
/// channels (fuzzy `search_term`, indexed `caller_id`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordsQuery {
    pub client_id: String,
    pub from_date: String,
    pub to_date: String,
    pub page: u32,
    pub num_of_records: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_term: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_id: Option<String>,
}

impl RecordsQuery {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("client_id", self.client_id.clone()),
            ("from_date", self.from_date.clone()),
            ("to_date", self.to_date.clone()),
            ("page", self.page.to_string()),
            ("num_of_records", self.num_of_records.to_string()),
        ];
        if let Some(ref term) = self.search_term {
            pairs.push(("search_term", term.clone()));
        }
        if let Some(ref caller) = self.caller_id {
            pairs.push(("caller_id", caller.clone()));
        }
        pairs
    }
}

impl WindowQuery {
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("client_id", self.client_id.clone()),
            ("from_date", self.from_date.clone()),
            ("to_date", self.to_date.clone()),
        ]
    }
}
