//! Logging and metrics setup for the binaries.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const DEFAULT_LOG_FILTER: &str = "keyword_news_bot=info,warn";

/// Compact logs by default, JSON lines with `LOG_FORMAT=json`.
/// `RUST_LOG` overrides the filter.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    // A subscriber may already be installed (tests).
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

pub fn describe_metrics() {
    describe_counter!("ingest_events_total", "Items fetched across all sources");
    describe_counter!("ingest_kept_total", "Items selected as new");
    describe_counter!(
        "ingest_filtered_total",
        "Items dropped during selection, by reason"
    );
    describe_counter!("ingest_provider_errors_total", "Source fetch or parse failures");
    describe_counter!("ingest_fetches_total", "Feed documents downloaded");
    describe_histogram!("ingest_parse_ms", "Feed document parse time in milliseconds");
    describe_gauge!("seen_store_size", "Identifiers in the seen store");
    describe_counter!(
        "notify_attempts_total",
        "Delivery attempts by destination and outcome"
    );
    describe_counter!("scheduler_job_runs_total", "Job runs by job and outcome");
}

/// Serve `/metrics` on `addr`. Must be called inside the Tokio runtime.
pub fn install_prometheus(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("installing Prometheus exporter on {addr}"))?;
    describe_metrics();
    tracing::info!(%addr, "metrics exporter listening");
    Ok(())
}
