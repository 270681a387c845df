use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::warn;

use crate::api::models::RawIntervalRow;
use crate::timezone::TimezoneConfig;

/// One fixed time-slice aggregation row, shaped for charting. Sparse:
/// a label absent from the source row is absent here too.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalBucket {
    pub time_slot_utc: DateTime<Utc>,
    pub interval_breakdown: String,
    pub percentages: BTreeMap<String, f64>,
    /// Local calendar date of the slot.
    pub base_date: NaiveDate,
    /// "`base_date` HH:MM" — date from the slot, time-of-day from
    /// `interval_breakdown`, rendered in the display zone.
    pub full_time_label: String,
    /// Date-only on the first bucket of each date, blank after — keeps the
    /// axis from repeating the same date on every tick.
    pub time_label: String,
}

/// Chart-ready series over one window: ordered buckets, the union of
/// labels seen in any row, and an optional focused label driving the
/// y-axis domain.
#[derive(Debug, Clone, Default)]
pub struct DispositionSeries {
    pub buckets: Vec<IntervalBucket>,
    labels: BTreeSet<String>,
    focused: Option<String>,
}

impl DispositionSeries {
    /// Shape raw interval rows into a series. Rows with an unparseable
    /// `time_slot` are skipped with a warning; everything else is kept.
    pub fn build(rows: &[RawIntervalRow], tz: &TimezoneConfig) -> Self {
        let mut buckets = Vec::with_capacity(rows.len());
        let mut labels = BTreeSet::new();
        let mut seen_dates = BTreeSet::new();

        for row in rows {
            let time_slot_utc = match DateTime::parse_from_rfc3339(&row.time_slot) {
                Ok(dt) => dt.with_timezone(&Utc),
                Err(err) => {
                    warn!("skipping interval row with bad time_slot {:?}: {err}", row.time_slot);
                    continue;
                }
            };

            let mut percentages = BTreeMap::new();
            for (label, value) in row.pct_fields() {
                labels.insert(label.to_string());
                percentages.insert(label.to_string(), parse_pct(Some(value)));
            }

            let base_date = tz.local_date(time_slot_utc);
            let local_time = compose_local_time(time_slot_utc, &row.interval_breakdown, tz);
            let full_time_label = format!("{base_date} {local_time}");
            let time_label = if seen_dates.insert(base_date) {
                base_date.to_string()
            } else {
                String::new()
            };

            buckets.push(IntervalBucket {
                time_slot_utc,
                interval_breakdown: row.interval_breakdown.clone(),
                percentages,
                base_date,
                full_time_label,
                time_label,
            });
        }

        Self {
            buckets,
            labels,
            focused: None,
        }
    }

    /// Union of labels present in any row.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn focused(&self) -> Option<&str> {
        self.focused.as_deref()
    }

    /// Focus one label for the y-axis; toggling the focused label again
    /// clears focus (back to the all-labels view). Unknown labels clear
    /// focus rather than focusing an empty series.
    pub fn toggle_focus(&mut self, label: &str) {
        if self.focused.as_deref() == Some(label) || !self.labels.contains(label) {
            self.focused = None;
        } else {
            self.focused = Some(label.to_string());
        }
    }

    /// Max value across the focused subset (one label when focused, else
    /// all active labels). Zero for an empty series.
    pub fn y_domain(&self) -> f64 {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.percentages.iter())
            .filter(|(label, _)| match self.focused.as_deref() {
                Some(focused) => label.as_str() == focused,
                None => true,
            })
            .map(|(_, value)| *value)
            .fold(0.0, f64::max)
    }
}

/// Parse one raw percentage cell: number or numeric string; non-numeric or
/// missing → 0; result clamped to [0, 100]. Per-field only — bucket-level
/// sums are deliberately not validated (source categories may overlap).
pub fn parse_pct(value: Option<&serde_json::Value>) -> f64 {
    let parsed = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() => v.clamp(0.0, 100.0),
        _ => 0.0,
    }
}

/// Date from the slot, time-of-day from the "HH:MM" breakdown, composed
/// into a fresh UTC instant and rendered in the display zone. Falls back
/// to the slot's own local time when the breakdown doesn't parse.
fn compose_local_time(time_slot_utc: DateTime<Utc>, breakdown: &str, tz: &TimezoneConfig) -> String {
    let composed = NaiveTime::parse_from_str(breakdown, "%H:%M")
        .ok()
        .map(|time| time_slot_utc.date_naive().and_time(time).and_utc())
        .unwrap_or(time_slot_utc);
    tz.to_local(composed).format("%H:%M").to_string()
}
