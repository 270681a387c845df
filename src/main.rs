use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};

use dispo::api::{AnalyticsApi, HttpApi};
use dispo::config::{self, DispoConfig};
use dispo::dash::{self, DashContext, RefreshTicker};
use dispo::export::{ExportFormat, Exporter, TOTAL_CALLS_LABEL};
use dispo::grid::FilterOp;
use dispo::output::{json as json_out, table};
use dispo::query::SlotState;
use dispo::series::DispositionSeries;
use dispo::timezone::{parse_bound, TimezoneConfig};

#[derive(Parser)]
#[command(name = "dispo", version, about = "Disposition Analytics — time-windowed call-center disposition dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Backend base URL (default: from ~/.dispo/config.toml)
    #[arg(long, global = true, env = "DISPO_BASE_URL")]
    base_url: Option<String>,

    /// API key (default: DISPO_API_KEY env or config)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Client to query (default: from config)
    #[arg(long, global = true)]
    client: Option<String>,
}

/// Time window selection shared by the data commands.
#[derive(Args, Debug, Default)]
struct WindowArgs {
    /// Quick filter: from UTC midnight N days ago through now
    #[arg(long, conflicts_with_all = ["from", "to"])]
    days: Option<i64>,

    /// Window start (YYYY-MM-DD or YYYY-MM-DDTHH:MM[:SS], local zone; Z/offset accepted)
    #[arg(long, requires = "to")]
    from: Option<String>,

    /// Window end (same formats as --from)
    #[arg(long, requires = "from")]
    to: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Full dashboard: summary stats, chart, and the first records page
    Dash {
        #[command(flatten)]
        window: WindowArgs,

        /// Keep refreshing on the configured interval until interrupted
        #[arg(long)]
        watch: bool,
    },

    /// Query the record grid
    Records {
        #[command(flatten)]
        window: WindowArgs,

        /// Page number (1-based)
        #[arg(long, default_value = "1")]
        page: u32,

        /// Records per page
        #[arg(long, default_value = "50")]
        page_size: i64,

        /// Indexed lookup by call id
        #[arg(long, conflicts_with_all = ["caller_id", "search"])]
        call_id: Option<String>,

        /// Indexed lookup by caller id
        #[arg(long, conflicts_with = "search")]
        caller_id: Option<String>,

        /// Fuzzy multi-field search
        #[arg(long)]
        search: Option<String>,

        /// Filter to records created on one calendar date (YYYY-MM-DD)
        #[arg(long, conflicts_with_all = ["call_id", "caller_id", "search"])]
        date: Option<String>,
    },

    /// Interval percentage chart for the window
    Chart {
        #[command(flatten)]
        window: WindowArgs,

        /// Focus a single disposition label (y-domain follows it)
        #[arg(long)]
        focus: Option<String>,
    },

    /// Per-agent disposition report for the window
    Report {
        #[command(flatten)]
        window: WindowArgs,
    },

    /// Per-day, per-agent breakdown for the last 7 days (admin only)
    Last7,

    /// Export disposition-filtered records, bypassing pagination
    Export {
        /// Disposition label, or "totalCalls" for everything
        label: String,

        /// Displayed count from the summary stat (sizes the fetch)
        #[arg(long)]
        count: i64,

        /// csv or xlsx
        #[arg(long, default_value = "csv")]
        format: String,

        /// Output directory
        #[arg(long, default_value = ".")]
        out: PathBuf,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Manage ~/.dispo/config.toml
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a commented template config if none exists
    Init,
    /// Show the current config with secrets redacted
    Show,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let json_output = cli.json;

    // Config commands don't need a backend.
    if let Commands::Config { ref action } = cli.command {
        match action {
            ConfigAction::Init => {
                let created = config::init_config()?;
                if created {
                    println!("Wrote {}", config::config_path()?.display());
                } else {
                    println!("Config already exists: {}", config::config_path()?.display());
                }
            }
            ConfigAction::Show => {
                let loaded = DispoConfig::load()?;
                println!("{}", loaded.display_redacted());
            }
        }
        return Ok(());
    }

    let loaded = DispoConfig::load()?;
    let tz = TimezoneConfig::resolve(loaded.timezone_override());

    let client_id = cli
        .client
        .as_deref()
        .or_else(|| loaded.client_id())
        .context("No client id. Provide --client or set [session].client_id in config")?
        .to_string();

    let base_url = cli
        .base_url
        .as_deref()
        .or_else(|| loaded.api.as_ref().and_then(|a| a.base_url.as_deref()))
        .context("No backend URL. Provide --base-url or set [api].base_url in config")?
        .to_string();

    let api_key = config::resolve_credential(
        cli.api_key.as_deref(),
        "DISPO_API_KEY",
        loaded.api.as_ref(),
    )?;

    let api: Arc<dyn AnalyticsApi> = Arc::new(HttpApi::new(base_url, api_key));
    let ctx = DashContext {
        client_id,
        admin: loaded.is_admin(),
        tz,
    };

    match cli.command {
        Commands::Dash { window, watch } => {
            let shared = dash::shared(Utc::now());
            set_window(&shared, &window, &tz).await?;

            dash::refresh_all(shared.clone(), api.clone(), &ctx).await;
            render_dash(&shared, &ctx, json_output).await?;

            if watch {
                let minutes = loaded.refresh_minutes();
                let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
                let mut ticker = RefreshTicker::new();
                ticker
                    .start(minutes, shared.clone(), api.clone(), ctx.clone(), Some(tx))
                    .await;
                eprintln!("\nAuto-refreshing every {minutes} min — Ctrl-C to stop.");

                loop {
                    tokio::select! {
                        Some(()) = rx.recv() => {
                            render_dash(&shared, &ctx, json_output).await?;
                            let dash = shared.lock().await;
                            if let Some(updated) = dash.coordinator.last_updated() {
                                eprintln!("\nlast updated: {}", ctx.tz.format_local(updated));
                            }
                        }
                        _ = tokio::signal::ctrl_c() => break,
                    }
                }
                ticker.stop(&shared).await;
            }
        }

        Commands::Records {
            window,
            page,
            page_size,
            call_id,
            caller_id,
            search,
            date,
        } => {
            let shared = dash::shared(Utc::now());
            set_window(&shared, &window, &tz).await?;
            {
                let mut dash = shared.lock().await;
                if let Some(ref term) = call_id {
                    dash.grid.set_column_filter("call_id", FilterOp::Equals, term);
                } else if let Some(ref term) = caller_id {
                    dash.grid.set_column_filter("caller_id", FilterOp::StartsWith, term);
                } else if let Some(ref term) = search {
                    dash.grid.set_column_filter("any", FilterOp::Contains, term);
                } else if let Some(ref day) = date {
                    dash.grid.set_column_filter("created_at", FilterOp::DateIs, day);
                }
                dash.grid.set_page_size(page_size);
                // Page is applied last: filter and size changes above have
                // already snapped it back to 1.
                dash.grid.set_page(page);
            }

            dash::refresh_records(shared.clone(), api.clone(), &ctx).await;

            let dash = shared.lock().await;
            match dash.slots.records.state() {
                SlotState::Ready(records_page) => {
                    if json_output {
                        json_out::print_json(&serde_json::json!({
                            "window": { "from": dash.window().from_iso(), "to": dash.window().to_iso() },
                            "page": dash.grid.pagination().page,
                            "total_records": records_page.total_records,
                            "rows": records_page.rows,
                        }))?;
                    } else {
                        table::print_window(&dash.window(), &ctx.tz);
                        table::print_records(records_page, dash.grid.pagination(), &ctx.tz, ctx.admin);
                    }
                }
                state => {
                    table::print_slot_status("records", state);
                }
            }
        }

        Commands::Chart { window, focus } => {
            let shared = dash::shared(Utc::now());
            set_window(&shared, &window, &tz).await?;

            let (token, query) = {
                let mut dash = shared.lock().await;
                let active = dash.window();
                let query = dispo::api::models::WindowQuery {
                    client_id: ctx.client_id.clone(),
                    from_date: active.from_iso(),
                    to_date: active.to_iso(),
                };
                (dash.slots.chart.begin(), query)
            };
            let result = api.fetch_intervals(&query).await;
            shared.lock().await.slots.chart.apply(token, result);

            let dash = shared.lock().await;
            match dash.slots.chart.state() {
                SlotState::Ready(rows) => {
                    let mut series = DispositionSeries::build(rows, &ctx.tz);
                    if let Some(ref label) = focus {
                        series.toggle_focus(label);
                    }
                    if json_output {
                        json_out::print_json(&serde_json::json!({
                            "labels": series.labels().collect::<Vec<_>>(),
                            "focused": series.focused(),
                            "y_domain": series.y_domain(),
                            "buckets": series.buckets.iter().map(|b| serde_json::json!({
                                "time_slot": b.time_slot_utc,
                                "time_label": b.time_label,
                                "full_time_label": b.full_time_label,
                                "percentages": b.percentages,
                            })).collect::<Vec<_>>(),
                        }))?;
                    } else {
                        table::print_window(&dash.window(), &ctx.tz);
                        table::print_series(&series);
                    }
                }
                state => {
                    table::print_slot_status("chart", state);
                }
            }
        }

        Commands::Report { window } => {
            let shared = dash::shared(Utc::now());
            set_window(&shared, &window, &tz).await?;
            let active = shared.lock().await.window();

            let query = dispo::api::models::WindowQuery {
                client_id: ctx.client_id.clone(),
                from_date: active.from_iso(),
                to_date: active.to_iso(),
            };
            let rows = api.fetch_agent_report(&query).await?;

            if json_output {
                json_out::print_json(&rows)?;
            } else {
                table::print_window(&active, &ctx.tz);
                table::print_agent_report(&rows);
            }
        }

        Commands::Last7 => {
            if !ctx.admin {
                bail!(dispo::Error::AdminRequired("last7".into()));
            }
            let now = Utc::now();
            let window = dispo::window::TimeWindow::last_days(7, now);
            let query = dispo::api::models::WindowQuery {
                client_id: ctx.client_id.clone(),
                from_date: window.from_iso(),
                to_date: window.to_iso(),
            };
            let rows = api.fetch_last7(&query).await?;

            if json_output {
                json_out::print_json(&rows)?;
            } else {
                table::print_last7(&rows);
            }
        }

        Commands::Export {
            label,
            count,
            format,
            out,
            window,
        } => {
            let format = ExportFormat::from_str(&format)
                .with_context(|| format!("Unknown format: {format}. Use: csv, xlsx"))?;

            let shared = dash::shared(Utc::now());
            set_window(&shared, &window, &tz).await?;
            let active = shared.lock().await.window();

            let exporter = Exporter::new();
            let path = exporter
                .export(api.as_ref(), &label, count, &active, &ctx.client_id, format, &out)
                .await?;

            let what = if label == TOTAL_CALLS_LABEL {
                "all records".to_string()
            } else {
                format!("\"{label}\" records")
            };
            println!("Exported {what} to {}", path.display());
        }

        Commands::Config { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Apply the window flags to the dashboard; defaults to the last hour.
async fn set_window(
    shared: &dash::SharedDashboard,
    args: &WindowArgs,
    tz: &TimezoneConfig,
) -> Result<()> {
    let mut dash = shared.lock().await;
    if let Some(days) = args.days {
        dash.select_days(days, Utc::now())?;
    } else if let (Some(from), Some(to)) = (&args.from, &args.to) {
        let from = parse_bound(from, tz)?;
        let to = parse_bound(to, tz)?;
        dash.apply_window(from, to)?;
    }
    Ok(())
}

/// Render whatever each slot currently holds; slots render independently,
/// so a failed or pending slot never hides its siblings.
async fn render_dash(
    shared: &dash::SharedDashboard,
    ctx: &DashContext,
    json_output: bool,
) -> Result<()> {
    let dash = shared.lock().await;

    if json_output {
        let chart = dash
            .slots
            .chart
            .state()
            .as_ready()
            .map(|rows| DispositionSeries::build(rows, &ctx.tz));
        json_out::print_json(&serde_json::json!({
            "window": { "from": dash.window().from_iso(), "to": dash.window().to_iso() },
            "records": dash.slots.records.state().as_ready(),
            "agent_report": dash.slots.agent_report.state().as_ready(),
            "chart_buckets": chart.map(|series| series.buckets.len()),
            "last7_days": dash.slots.last7_days.state().as_ready(),
        }))?;
        return Ok(());
    }

    table::print_window(&dash.window(), &ctx.tz);

    if table::print_slot_status("summary", dash.slots.agent_report.state()) {
        if let Some(rows) = dash.slots.agent_report.state().as_ready() {
            table::print_summary(rows);
        }
    }

    if table::print_slot_status("chart", dash.slots.chart.state()) {
        if let Some(rows) = dash.slots.chart.state().as_ready() {
            let series = DispositionSeries::build(rows, &ctx.tz);
            table::print_series(&series);
        }
    }

    if table::print_slot_status("records", dash.slots.records.state()) {
        if let Some(page) = dash.slots.records.state().as_ready() {
            table::print_records(page, dash.grid.pagination(), &ctx.tz, ctx.admin);
        }
    }

    if ctx.admin {
        if table::print_slot_status("last 7 days", dash.slots.last7_days.state()) {
            if let Some(rows) = dash.slots.last7_days.state().as_ready() {
                table::print_last7(rows);
            }
        }
    }

    Ok(())
}
