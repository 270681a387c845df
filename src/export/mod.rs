use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rust_xlsxwriter::Workbook;
use tracing::info;

use crate::api::models::{CallRecord, RecordsQuery};
use crate::api::AnalyticsApi;
use crate::error::{Error, Result};
use crate::window::TimeWindow;

/// Synthetic stat bucket covering every disposition.
pub const TOTAL_CALLS_LABEL: &str = "totalCalls";
/// Unpaginated fetch ceiling for the synthetic total bucket.
pub const TOTAL_CALLS_CEILING: i64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "xlsx" => Some(ExportFormat::Xlsx),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

/// Ephemeral export snapshot; dropped once the file is on disk.
#[derive(Debug)]
pub struct ExportJob {
    pub disposition_label: String,
    pub window: TimeWindow,
    pub rows: Vec<CallRecord>,
}

/// Produces ad-hoc disposition-filtered snapshots. The export fetch is a
/// one-off against the same window/client as the grid and is independent
/// of the grid's own in-flight records slot — it never cancels it.
pub struct Exporter {
    exporting_disposition: Mutex<Option<String>>,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Exporter {
    pub fn new() -> Self {
        Self {
            exporting_disposition: Mutex::new(None),
        }
    }

    pub fn exporting(&self) -> Option<String> {
        self.exporting_disposition.lock().unwrap().clone()
    }

    /// The unpaginated fetch for a clicked stat: `num_of_records` is the
    /// displayed count (or the ceiling for the synthetic total bucket),
    /// and the disposition becomes an uppercased equality `search_term` —
    /// except for the total bucket, which takes everything.
    pub fn build_query(
        label: &str,
        displayed_count: i64,
        window: &TimeWindow,
        client_id: &str,
    ) -> RecordsQuery {
        let is_total = label == TOTAL_CALLS_LABEL;
        RecordsQuery {
            client_id: client_id.to_string(),
            from_date: window.from_iso(),
            to_date: window.to_iso(),
            page: 1,
            num_of_records: if is_total {
                TOTAL_CALLS_CEILING
            } else {
                displayed_count
            },
            search_term: (!is_total).then(|| label.to_uppercase()),
            caller_id: None,
        }
    }

    /// Fetch and write one export file. A second export for the same label
    /// while one is in flight is rejected; the guard is cleared on both
    /// completion and failure so retry is immediate.
    pub async fn export(
        &self,
        api: &dyn AnalyticsApi,
        label: &str,
        displayed_count: i64,
        window: &TimeWindow,
        client_id: &str,
        format: ExportFormat,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        {
            let mut guard = self.exporting_disposition.lock().unwrap();
            if guard.as_deref() == Some(label) {
                return Err(Error::ExportInProgress(label.to_string()));
            }
            *guard = Some(label.to_string());
        }

        let result = self
            .run(api, label, displayed_count, window, client_id, format, out_dir)
            .await;

        *self.exporting_disposition.lock().unwrap() = None;
        result
    }

    async fn run(
        &self,
        api: &dyn AnalyticsApi,
        label: &str,
        displayed_count: i64,
        window: &TimeWindow,
        client_id: &str,
        format: ExportFormat,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        let query = Self::build_query(label, displayed_count, window, client_id);
        let page = api
            .fetch_records(&query)
            .await
            .map_err(|err| Error::Export(err.to_string()))?;

        let job = ExportJob {
            disposition_label: label.to_string(),
            window: *window,
            rows: page.rows,
        };

        let path = out_dir.join(timestamped_filename(label, format.extension(), Utc::now()));
        match format {
            ExportFormat::Csv => {
                let csv = render_csv(&job.rows);
                std::fs::write(&path, csv).map_err(|err| Error::Export(err.to_string()))?;
            }
            ExportFormat::Xlsx => write_xlsx(&job, &path)?,
        }

        info!("exported {} rows to {}", job.rows.len(), path.display());
        Ok(path)
    }
}

/// `<label>_<YYYYMMDDHHMMSS>.<ext>`
fn timestamped_filename(label: &str, ext: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}.{}", label, now.format("%Y%m%d%H%M%S"), ext)
}

/// Header = column names, data rows = comma-joined raw values. No quoting
/// or escaping beyond the base join; the consumer contract is fixed to
/// this exact shape.
fn render_csv(rows: &[CallRecord]) -> String {
    let objects: Vec<serde_json::Map<String, serde_json::Value>> = rows
        .iter()
        .filter_map(|row| match serde_json::to_value(row) {
            Ok(serde_json::Value::Object(map)) => Some(map),
            _ => None,
        })
        .collect();

    let Some(first) = objects.first() else {
        return String::new();
    };

    let header: Vec<&str> = first.keys().map(String::as_str).collect();
    let mut out = header.join(",");
    out.push('\n');

    for object in &objects {
        let cells: Vec<String> = header
            .iter()
            .map(|key| object.get(*key).map(cell_text).unwrap_or_default())
            .collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

fn cell_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Two-sheet workbook: raw results plus a computed summary.
fn write_xlsx(job: &ExportJob, path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();

    let objects: Vec<serde_json::Map<String, serde_json::Value>> = job
        .rows
        .iter()
        .filter_map(|row| match serde_json::to_value(row) {
            Ok(serde_json::Value::Object(map)) => Some(map),
            _ => None,
        })
        .collect();

    let results = workbook.add_worksheet();
    results
        .set_name("Results")
        .map_err(|err| Error::Export(err.to_string()))?;

    if let Some(first) = objects.first() {
        let header: Vec<&str> = first.keys().map(String::as_str).collect();
        for (col, name) in header.iter().enumerate() {
            results
                .write_string(0, col as u16, *name)
                .map_err(|err| Error::Export(err.to_string()))?;
        }
        for (row_idx, object) in objects.iter().enumerate() {
            for (col, key) in header.iter().enumerate() {
                let text = object.get(*key).map(cell_text).unwrap_or_default();
                results
                    .write_string(row_idx as u32 + 1, col as u16, text)
                    .map_err(|err| Error::Export(err.to_string()))?;
            }
        }
    }

    let summary = workbook.add_worksheet();
    summary
        .set_name("Summary")
        .map_err(|err| Error::Export(err.to_string()))?;

    let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
    for row in &job.rows {
        *counts.entry(row.disposition.as_str()).or_default() += 1;
    }

    let meta: Vec<(&str, String)> = vec![
        ("Disposition", job.disposition_label.clone()),
        ("Window from (UTC)", job.window.from_iso()),
        ("Window to (UTC)", job.window.to_iso()),
        ("Total rows", job.rows.len().to_string()),
    ];
    for (idx, (key, value)) in meta.iter().enumerate() {
        summary
            .write_string(idx as u32, 0, *key)
            .map_err(|err| Error::Export(err.to_string()))?;
        summary
            .write_string(idx as u32, 1, value)
            .map_err(|err| Error::Export(err.to_string()))?;
    }

    let mut row_idx = meta.len() as u32 + 1;
    summary
        .write_string(row_idx, 0, "Disposition breakdown")
        .map_err(|err| Error::Export(err.to_string()))?;
    row_idx += 1;
    for (label, count) in counts {
        summary
            .write_string(row_idx, 0, label)
            .map_err(|err| Error::Export(err.to_string()))?;
        summary
            .write_number(row_idx, 1, count as f64)
            .map_err(|err| Error::Export(err.to_string()))?;
        row_idx += 1;
    }

    workbook
        .save(path)
        .map_err(|err| Error::Export(err.to_string()))?;
    Ok(())
}
