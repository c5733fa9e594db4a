// src/ingest/mod.rs
pub mod providers;
pub mod recency;
pub mod registry;
pub mod strategy;
pub mod types;

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use metrics::counter;

use crate::ingest::recency::RecencyWindow;
use crate::ingest::types::{Item, SourceProvider};
use crate::seen::SeenStore;

/// Normalize text: decode entities, strip tags, fold quotes and whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

/// Case-insensitive keyword check used by sources with `match_keyword`.
pub fn mentions_keyword(text: &str, keyword: &str) -> bool {
    let kw = keyword.trim();
    !kw.is_empty() && text.to_lowercase().contains(&kw.to_lowercase())
}

/// Why items were dropped during selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionStats {
    pub fetched: usize,
    pub empty_identifier: usize,
    pub stale: usize,
    pub already_seen: usize,
    pub duplicate_in_batch: usize,
    pub kept: usize,
}

/// Pure selection over already-fetched items, in merge order.
///
/// Empty identifiers are dropped before the store is consulted; the recency
/// window is applied next; then identifiers known to `seen` or already taken
/// earlier in this batch are dropped. Survivors are stably sorted newest first.
pub fn select_new(
    now: DateTime<FixedOffset>,
    raw: Vec<Item>,
    window: RecencyWindow,
    seen: &dyn SeenStore,
) -> (Vec<Item>, SelectionStats) {
    let mut stats = SelectionStats {
        fetched: raw.len(),
        ..Default::default()
    };
    let mut batch: HashSet<String> = HashSet::new();
    let mut keep = Vec::with_capacity(raw.len());

    for item in raw {
        if item.identifier.trim().is_empty() {
            stats.empty_identifier += 1;
            continue;
        }
        if !window.admits(item.published_at, now) {
            stats.stale += 1;
            continue;
        }
        if seen.contains(&item.identifier) {
            stats.already_seen += 1;
            continue;
        }
        if !batch.insert(item.identifier.clone()) {
            stats.duplicate_in_batch += 1;
            continue;
        }
        keep.push(item);
    }

    keep.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    stats.kept = keep.len();
    (keep, stats)
}

/// Fetch one provider; failures are logged and yield no items.
pub async fn fetch_isolated(provider: &dyn SourceProvider, now: DateTime<FixedOffset>) -> Vec<Item> {
    match provider.fetch_latest(now).await {
        Ok(items) => {
            tracing::debug!(provider = provider.name(), count = items.len(), "provider fetched");
            items
        }
        Err(e) => {
            tracing::warn!(error = ?e, provider = provider.name(), "provider error");
            counter!("ingest_provider_errors_total").increment(1);
            Vec::new()
        }
    }
}

/// Run every provider in order, then select the new items.
/// `delay` is slept between consecutive providers.
pub async fn aggregate(
    providers: &[Box<dyn SourceProvider>],
    now: DateTime<FixedOffset>,
    window: RecencyWindow,
    seen: &dyn SeenStore,
    delay: Duration,
) -> (Vec<Item>, SelectionStats) {
    let mut raw = Vec::new();
    for (i, p) in providers.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        raw.append(&mut fetch_isolated(p.as_ref(), now).await);
    }

    let (kept, stats) = select_new(now, raw, window, seen);

    // Telemetry
    counter!("ingest_events_total").increment(stats.fetched as u64);
    counter!("ingest_kept_total").increment(stats.kept as u64);
    counter!("ingest_filtered_total", "reason" => "empty_identifier")
        .increment(stats.empty_identifier as u64);
    counter!("ingest_filtered_total", "reason" => "stale").increment(stats.stale as u64);
    counter!("ingest_filtered_total", "reason" => "seen").increment(stats.already_seen as u64);
    counter!("ingest_filtered_total", "reason" => "duplicate")
        .increment(stats.duplicate_in_batch as u64);

    tracing::info!(
        target: "ingest",
        fetched = stats.fetched,
        kept = stats.kept,
        stale = stats.stale,
        seen = stats.already_seen,
        duplicate = stats.duplicate_in_batch,
        "aggregation finished"
    );

    (kept, stats)
}
