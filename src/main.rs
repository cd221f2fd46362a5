//! CLI entry point for the Masq aggregation engine.
//!
//! Provides subcommands for mirroring the remote observation store live,
//! one-shot aggregation of an observation set, and tailing the detector's
//! live mask counts.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use masq_engine::aggregate::bucket::{Granularity, aggregate};
use masq_engine::aggregate::totals::{headline_totals, totals};
use masq_engine::config::Config;
use masq_engine::engine::{ChartData, EngineHandle};
use masq_engine::live::LivePoller;
use masq_engine::mirror::MirrorHandle;
use masq_engine::output::{TotalsRow, append_totals, export_buckets, print_json};
use masq_engine::record::ObservationRecord;
use masq_engine::store::{ObservationStore, RestStore};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "masq_engine")]
#[command(about = "Live aggregation engine for mask-compliance observations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror the remote observation store and log headline totals live
    Watch {
        /// Time bucketing for the aggregated view
        #[arg(short, long, default_value = "none")]
        granularity: Granularity,

        /// CSV file to append a totals row to on every recomputation
        #[arg(long)]
        totals_log: Option<String>,
    },
    /// Aggregate an observation set once and print the result
    Aggregate {
        /// Path to a JSON array of observation rows; omit to fetch from the
        /// configured store
        #[arg(value_name = "FILE")]
        source: Option<String>,

        /// Time bucketing for the aggregated view
        #[arg(short, long, default_value = "none")]
        granularity: Granularity,

        /// CSV file to write the bucket table to
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Tail the detector's live mask counts (1-second poll)
    Live,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/masq_engine.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("masq_engine.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            granularity,
            totals_log,
        } => watch(granularity, totals_log).await?,
        Commands::Aggregate {
            source,
            granularity,
            output,
        } => aggregate_once(source, granularity, output).await?,
        Commands::Live => tail_live_counts().await?,
    }

    Ok(())
}

/// Runs the full live pipeline: store -> mirror -> engine, logging headline
/// totals on every recomputation until Ctrl-C.
#[tracing::instrument(skip(totals_log), fields(granularity = %granularity))]
async fn watch(granularity: Granularity, totals_log: Option<String>) -> Result<()> {
    let config = Config::from_env()?;
    let store = Arc::new(RestStore::new(config.store)?);

    let mirror = MirrorHandle::spawn(store).await?;
    let engine = EngineHandle::spawn(mirror.subscribe(), granularity);
    let mut chart_rx = engine.subscribe();

    info!("watching observation store, Ctrl-C to stop");
    report(&chart_rx.borrow_and_update().clone(), totals_log.as_deref());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = chart_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                report(&chart_rx.borrow_and_update().clone(), totals_log.as_deref());
            }
        }
    }

    info!("shutting down");
    engine.shutdown().await?;
    mirror.shutdown().await?;
    Ok(())
}

fn report(chart: &ChartData, totals_log: Option<&str>) {
    info!(
        buckets = chart.buckets.len(),
        using = %chart.totals.using,
        not_using = %chart.totals.not_using,
        total = %chart.totals.total,
        "chart data recomputed"
    );

    if let Some(path) = totals_log {
        let row = TotalsRow::new(totals(&chart.buckets));
        if let Err(err) = append_totals(path, &row) {
            warn!(%err, path, "failed to append totals row");
        }
    }
}

/// One-shot aggregation of a record set from a file or the configured store.
#[tracing::instrument(skip(output), fields(granularity = %granularity))]
async fn aggregate_once(
    source: Option<String>,
    granularity: Granularity,
    output: Option<String>,
) -> Result<()> {
    let records = match source {
        Some(path) => load_records(&path)?,
        None => {
            let config = Config::from_env()?;
            let store = RestStore::new(config.store)?;
            store.fetch_all().await?
        }
    };

    let buckets = aggregate(&records, granularity);
    let headline = headline_totals(&buckets);
    info!(
        records = records.len(),
        buckets = buckets.len(),
        using = %headline.using,
        not_using = %headline.not_using,
        total = %headline.total,
        "aggregation complete"
    );
    print_json(&buckets)?;

    if let Some(path) = output {
        export_buckets(&path, &buckets)?;
        info!(path, "bucket table written");
    }

    Ok(())
}

/// Loads observation records from a JSON array file, skipping bad rows.
fn load_records(path: &str) -> Result<Vec<ObservationRecord>> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let rows: Vec<serde_json::Value> =
        serde_json::from_str(&content).context("observation file is not a JSON array")?;

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        match ObservationRecord::from_row(row) {
            Ok(record) => records.push(record),
            Err(err) => warn!(%err, "skipping malformed observation row"),
        }
    }

    Ok(records)
}

/// Polls the detector's count endpoint and logs every change until Ctrl-C.
async fn tail_live_counts() -> Result<()> {
    let config = Config::from_env()?;
    let poller = LivePoller::start(config.count_url)?;
    let mut counts_rx = poller.subscribe();

    info!(video_feed = %config.video_feed_url, "tailing live counts, Ctrl-C to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = counts_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let counts = *counts_rx.borrow_and_update();
                info!(
                    mask = counts.mask_count,
                    no_mask = counts.no_mask_count,
                    "live counts"
                );
            }
        }
    }

    poller.stop().await
}
