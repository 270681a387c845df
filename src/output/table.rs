use std::collections::BTreeMap;

use unicode_width::UnicodeWidthStr;

use crate::api::models::{AgentReportRow, Last7DaysRow, RecordsPage};
use crate::grid::PaginationState;
use crate::query::SlotState;
use crate::series::DispositionSeries;
use crate::timezone::TimezoneConfig;
use crate::window::TimeWindow;

/// Format duration in seconds to human-readable string.
pub fn format_duration(seconds: f64) -> String {
    let total = seconds as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{h}h{m:02}m")
    } else if m > 0 {
        format!("{m}m{s:02}s")
    } else {
        format!("{s}s")
    }
}

/// Truncate a string to fit within max_width (respecting unicode width).
fn truncate(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    let mut result = String::new();
    let mut width = 0;
    for ch in s.chars() {
        let cw = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + cw + 3 > max_width {
            result.push_str("...");
            break;
        }
        result.push(ch);
        width += cw;
    }
    result
}

/// Window header line shown above every table.
pub fn print_window(window: &TimeWindow, tz: &TimezoneConfig) {
    println!(
        "Window: {} — {} ({})",
        tz.format_local(window.from),
        tz.format_local(window.to),
        tz.name()
    );
}

/// Summary stats: per-disposition totals across all agents plus the
/// synthetic total bucket. These are the counts an export starts from.
pub fn print_summary(report: &[AgentReportRow]) {
    let mut totals: BTreeMap<String, i64> = BTreeMap::new();
    for row in report {
        for (label, count) in row.disposition_counts() {
            *totals.entry(label).or_default() += count;
        }
    }
    let total_calls: i64 = totals.values().sum();

    println!("\nDispositions:");
    for (label, count) in &totals {
        println!("  {:<16} {}", label, count);
    }
    println!("  {:<16} {}", "total calls", total_calls);
}

/// One page of the record grid.
pub fn print_records(
    page: &RecordsPage,
    pagination: PaginationState,
    tz: &TimezoneConfig,
    admin: bool,
) {
    if page.rows.is_empty() {
        // Deliberate empty state — not an error.
        println!("\nNo records in this window.");
        return;
    }

    let total_pages = (page.total_records as f64 / pagination.page_size as f64).ceil() as i64;
    println!(
        "\nRecords (page {}/{} of {} total):\n",
        pagination.page,
        total_pages.max(1),
        page.total_records
    );

    println!(
        "  {:<20} {:<14} {:<14} {:<8} {:<8} {:<17}",
        "CALL ID", "CALLER", "AGENT", "DISP", "DUR", "CREATED"
    );
    println!("  {}", "-".repeat(84));

    for record in &page.rows {
        println!(
            "  {:<20} {:<14} {:<14} {:<8} {:<8} {:<17}",
            truncate(&record.call_id, 18),
            truncate(&record.caller_id, 12),
            truncate(&record.agent, 12),
            truncate(&record.disposition, 8),
            format_duration(record.duration_seconds),
            tz.format_local(record.created_at),
        );
        if admin {
            if let Some(ref transcription) = record.transcription {
                let text = transcription.replace('\n', " ");
                println!("    {}", truncate(&text, 80));
            }
        }
    }
}

/// Chart series as a bucket table; the tick column is blank on repeated
/// dates, same as the chart axis would be.
pub fn print_series(series: &DispositionSeries) {
    if series.buckets.is_empty() {
        println!("\nNo interval data in this window.");
        return;
    }

    let labels: Vec<&str> = match series.focused() {
        Some(focused) => vec![focused],
        None => series.labels().collect(),
    };

    print!("\n  {:<12} {:<7}", "DATE", "TIME");
    for label in &labels {
        print!(" {:>8}", truncate(label, 8));
    }
    println!();
    println!("  {}", "-".repeat(20 + labels.len() * 9));

    for bucket in &series.buckets {
        let time = bucket
            .full_time_label
            .rsplit(' ')
            .next()
            .unwrap_or(&bucket.interval_breakdown);
        print!("  {:<12} {:<7}", bucket.time_label, time);
        for label in &labels {
            match bucket.percentages.get(*label) {
                Some(value) => print!(" {:>7.1}%", value),
                None => print!(" {:>8}", "-"),
            }
        }
        println!();
    }

    println!("\n  y-domain: 0 — {:.1}", series.y_domain());
    if let Some(focused) = series.focused() {
        println!("  focused: {focused}");
    }
}

/// Per-agent disposition counts for the window.
pub fn print_agent_report(rows: &[AgentReportRow]) {
    if rows.is_empty() {
        println!("\nNo agent activity in this window.");
        return;
    }

    println!("\n  {:<20} {:<40} {:<8}", "AGENT", "DISPOSITIONS", "TOTAL");
    println!("  {}", "-".repeat(70));
    for row in rows {
        let breakdown = row
            .disposition_counts()
            .iter()
            .map(|(label, count)| format!("{label}:{count}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "  {:<20} {:<40} {:<8}",
            truncate(&row.agent, 18),
            truncate(&breakdown, 38),
            row.total_calls()
        );
    }
}

/// Per-day, per-agent breakdown (admin view).
pub fn print_last7(rows: &[Last7DaysRow]) {
    if rows.is_empty() {
        println!("\nNo activity in the last 7 days.");
        return;
    }

    println!("\n  {:<12} {:<20} {:<40}", "DATE", "AGENT", "DISPOSITIONS");
    println!("  {}", "-".repeat(74));
    for row in rows {
        let breakdown = row
            .disposition_counts()
            .iter()
            .map(|(label, count)| format!("{label}:{count}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "  {:<12} {:<20} {:<40}",
            row.date,
            truncate(&row.agent, 18),
            truncate(&breakdown, 38),
        );
    }
}

/// Render a slot that hasn't produced data: spinner placeholder or its own
/// error, without touching the siblings.
pub fn print_slot_status<T>(name: &str, state: &SlotState<T>) -> bool {
    match state {
        SlotState::Ready(_) => true,
        SlotState::Idle => {
            println!("\n[{name}] —");
            false
        }
        SlotState::Loading => {
            println!("\n[{name}] loading...");
            false
        }
        SlotState::Error(message) => {
            println!("\n[{name}] error: {message}");
            false
        }
    }
}
