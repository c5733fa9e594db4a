//! Sends one sample digest to the configured destinations (log only when none are set).

use anyhow::Result;
use chrono::{Duration, Utc};
use keyword_news_bot::format::{Digest, DigestStyle, Formatter};
use keyword_news_bot::ingest::providers::rss::RssProvider;
use keyword_news_bot::quote::Quote;
use keyword_news_bot::{telemetry, AppConfig, Item};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cfg = AppConfig::load_default()?;
    let now = Utc::now().with_timezone(&cfg.offset()?);
    let client = RssProvider::default_client()?;
    let mux = cfg.build_notifiers(&client)?;

    let items = vec![
        Item {
            identifier: "https://example.com/news/1".into(),
            title: format!("{} announces demo digest", cfg.keyword),
            source_name: "Google News".into(),
            publisher: Some("Example Times".into()),
            published_at: now - Duration::minutes(20),
        },
        Item {
            identifier: "https://example.com/video/2".into(),
            title: format!("Behind the scenes at {}", cfg.keyword),
            source_name: "YouTube".into(),
            publisher: None,
            published_at: now - Duration::hours(2),
        },
    ];
    let quote = Quote {
        label: "DEMO".into(),
        value: "12,345".into(),
        change: Some("+0.5%".into()),
        as_of: now.format("%H:%M %d/%m/%Y").to_string(),
    };

    let formatter = Formatter::new(DigestStyle::for_keyword(&cfg.keyword));
    let formatter = formatter.with_max_chars(cfg.max_message_chars);
    let mut digest = Digest::new(items, cfg.max_items, Some(quote))
        .with_headline(Some("Notification demo".into()));
    let text = formatter.render_fitted(&mut digest, now).await;

    let report = mux.dispatch(&text).await;
    for o in &report.outcomes {
        match &o.error {
            None => println!("{}: delivered", o.destination),
            Some(e) => println!("{}: failed ({e})", o.destination),
        }
    }
    println!("notify-demo done");
    Ok(())
}
