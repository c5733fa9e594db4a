// src/ingest/providers/rss.rs
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use metrics::{counter, histogram};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::ingest::mentions_keyword;
use crate::ingest::strategy::RawEntry;
use crate::ingest::types::{Item, Source, SourceProvider, UNTITLED};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; keyword-news-bot/0.1)";

/// RSS 2.0 / Atom provider for one configured source.
pub struct RssProvider {
    source: Source,
    keyword: Option<String>,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        client: reqwest::Client,
        timeout: Duration,
    },
}

impl RssProvider {
    /// Provider that fetches `source.endpoint` over HTTP with a bounded timeout.
    pub fn http(source: Source, client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            source,
            keyword: None,
            mode: Mode::Http { client, timeout },
        }
    }

    /// Provider that parses the given document instead of fetching.
    pub fn from_fixture(source: Source, xml: &str) -> Self {
        Self {
            source,
            keyword: None,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    /// Keyword used when the source has `match_keyword` enabled.
    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    /// HTTP client shared by all feed providers.
    pub fn default_client() -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("building feed http client")
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    fn to_items(&self, entries: Vec<RawEntry>, now: DateTime<FixedOffset>) -> Vec<Item> {
        let strategy = self.source.strategy;
        let cap = match self.source.max_entries {
            0 => usize::MAX,
            n => n,
        };
        let keyword = self
            .keyword
            .as_deref()
            .filter(|_| self.source.match_keyword);

        let mut out = Vec::with_capacity(entries.len().min(cap));
        for entry in entries.into_iter().take(cap) {
            let publisher = strategy.extract_publisher(&entry);
            let title = strategy.extract_title(&entry, publisher.as_deref());

            if let Some(kw) = keyword {
                if !title.as_deref().is_some_and(|t| mentions_keyword(t, kw)) {
                    continue;
                }
            }

            let identifier = entry
                .link
                .as_deref()
                .or_else(|| entry.field("link"))
                .or_else(|| entry.field("guid").filter(|g| g.starts_with("http")))
                .map(|l| l.trim().to_string())
                .unwrap_or_default();

            out.push(Item {
                identifier,
                title: title.unwrap_or_else(|| UNTITLED.to_string()),
                source_name: self.source.name.clone(),
                publisher,
                published_at: strategy
                    .extract_timestamp(&entry, now.offset())
                    .unwrap_or(now),
            });
        }
        out
    }

    fn parse_document(&self, xml: &str, now: DateTime<FixedOffset>) -> Result<Vec<Item>> {
        let t0 = std::time::Instant::now();
        let entries = parse_entries(xml)
            .with_context(|| format!("parsing feed of {}", self.source.name))?;
        let items = self.to_items(entries, now);

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        Ok(items)
    }
}

#[async_trait]
impl SourceProvider for RssProvider {
    async fn fetch_latest(&self, now: DateTime<FixedOffset>) -> Result<Vec<Item>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_document(s, now),
            Mode::Http { client, timeout } => {
                let body = client
                    .get(&self.source.endpoint)
                    .timeout(*timeout)
                    .send()
                    .await
                    .with_context(|| format!("GET {}", self.source.endpoint))?
                    .error_for_status()
                    .with_context(|| format!("{} returned an error status", self.source.name))?
                    .text()
                    .await
                    .with_context(|| format!("{} body", self.source.name))?;
                counter!("ingest_fetches_total").increment(1);
                self.parse_document(&body, now)
            }
        }
    }

    fn name(&self) -> &str {
        &self.source.name
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn is_entry(name: &str) -> bool {
    name == "item" || name == "entry"
}

/// Atom `<link href="..">`; only `rel="alternate"` (or no rel) counts.
fn atom_href(e: &BytesStart<'_>) -> Option<String> {
    let rel = e
        .try_get_attribute("rel")
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()));
    if rel.as_deref().is_some_and(|r| r != "alternate") {
        return None;
    }
    e.try_get_attribute("href")
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.trim().to_string()))
        .filter(|h| !h.is_empty())
}

/// Read every `<item>` (RSS) or `<entry>` (Atom) into a [`RawEntry`].
/// Elements are keyed by local name, so `dc:date` lands under `date`.
pub fn parse_entries(xml: &str) -> Result<Vec<RawEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<RawEntry> = None;
    // open elements inside the current entry with their accumulated text
    let mut open: Vec<(String, String)> = Vec::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| anyhow!("xml error at byte {}: {e}", reader.buffer_position()))?;
        match event {
            Event::Start(e) => {
                let name = local_name(&e);
                let Some(entry) = current.as_mut() else {
                    if is_entry(&name) {
                        current = Some(RawEntry::default());
                        open.clear();
                    }
                    continue;
                };
                if name == "link" && entry.link.is_none() {
                    entry.link = atom_href(&e);
                }
                open.push((name, String::new()));
            }
            Event::Empty(e) => {
                if let Some(entry) = current.as_mut() {
                    if local_name(&e) == "link" && entry.link.is_none() {
                        entry.link = atom_href(&e);
                    }
                }
            }
            Event::Text(t) => {
                if let Some((_, buf)) = open.last_mut() {
                    match t.unescape() {
                        Ok(s) => buf.push_str(&s),
                        // HTML entities such as &nbsp; are not valid XML
                        Err(_) => buf.push_str(&html_escape::decode_html_entities(
                            &String::from_utf8_lossy(&t),
                        )),
                    }
                }
            }
            Event::CData(c) => {
                if let Some((_, buf)) = open.last_mut() {
                    buf.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                let Some(entry) = current.as_mut() else {
                    continue;
                };
                match open.pop() {
                    Some((name, text)) => {
                        let key = match (name.as_str(), open.last()) {
                            ("name", Some((parent, _))) if parent == "author" => "author",
                            (n, _) => n,
                        };
                        entry.set_if_absent(key, text);
                    }
                    None => {
                        if let Some(done) = current.take() {
                            entries.push(done);
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}
