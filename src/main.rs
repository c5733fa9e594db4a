//! Keyword News Bot - Binary Entrypoint
//! Loads configuration, wires sources, seen store and destinations into the
//! pipeline, runs the startup job, then ticks the scheduler until Ctrl-C or SIGTERM.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};

use keyword_news_bot::format::{DigestStyle, Formatter};
use keyword_news_bot::ingest::providers::rss::RssProvider;
use keyword_news_bot::quote::HttpQuoteProvider;
use keyword_news_bot::scheduler::shutdown_signal;
use keyword_news_bot::seen::FileSeenStore;
use keyword_news_bot::shorten::TinyUrlShortener;
use keyword_news_bot::{telemetry, AppConfig, Pipeline, Scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cfg = AppConfig::load_default().context("loading configuration")?;
    let tz = cfg.offset()?;
    if let Some(addr) = cfg.metrics_addr {
        telemetry::install_prometheus(addr)?;
    }

    // An unreadable seen store is the one unrecoverable condition.
    let seen = FileSeenStore::open(&cfg.seen_path)
        .with_context(|| format!("opening seen store {}", cfg.seen_path.display()))?;

    let client = RssProvider::default_client()?;
    let registry = cfg.registry();
    let providers = registry.http_providers(&cfg.keyword, &client, cfg.http_timeout());

    let mut formatter = Formatter::new(DigestStyle::for_keyword(&cfg.keyword))
        .with_max_chars(cfg.max_message_chars);
    if cfg.shorten_links {
        formatter = formatter.with_shortener(Arc::new(
            TinyUrlShortener::new(client.clone()).with_timeout(cfg.http_timeout_secs),
        ));
    }

    let notifier = cfg.build_notifiers(&client)?;

    let mut pipeline = Pipeline::new(providers, Box::new(seen), formatter, notifier)
        .with_fetch_delay(cfg.fetch_delay());
    if let Some(q) = &cfg.quote {
        let provider = HttpQuoteProvider::new(&q.label, &q.url, &q.pattern, client.clone())?
            .with_timeout(cfg.http_timeout_secs);
        pipeline = pipeline.with_quote(Box::new(provider));
    }

    let mut scheduler = Scheduler::new(cfg.build_jobs()?, cfg.tick());
    let clock = move || -> DateTime<FixedOffset> { Utc::now().with_timezone(&tz) };

    tracing::info!(
        keyword = %cfg.keyword,
        sources = registry.len(),
        jobs = scheduler.jobs().len(),
        seen = pipeline.seen().len(),
        "keyword news bot starting"
    );

    scheduler.prime(clock());
    if let Some(name) = cfg.startup_job_name() {
        tracing::info!(job = %name, "running startup job");
        scheduler.run_now(&name, clock(), &mut pipeline).await?;
    }

    scheduler.run_until(&mut pipeline, clock, shutdown_signal()).await;

    tracing::info!("bye");
    Ok(())
}
