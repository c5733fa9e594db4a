//! # Auxiliary price quote
//! Point-in-time quote scraped from a web page with a configurable regex.
//!
//! The pattern must define a `value` group and may define `change` and
//! `time`. Anything that goes wrong yields `None` and the digest simply
//! omits the quote paragraph.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use regex::Regex;
use reqwest::Client;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub label: String,
    pub value: String,
    pub change: Option<String>,
    /// Display timestamp; the page's own when it has one.
    pub as_of: String,
}

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn latest(&self, now: DateTime<FixedOffset>) -> Option<Quote>;
}

pub struct HttpQuoteProvider {
    label: String,
    url: String,
    pattern: Regex,
    client: Client,
    timeout: Duration,
}

impl HttpQuoteProvider {
    pub fn new(label: &str, url: &str, pattern: &str, client: Client) -> Result<Self> {
        let pattern = Regex::new(pattern).context("compiling quote pattern")?;
        if !pattern.capture_names().flatten().any(|n| n == "value") {
            anyhow::bail!("quote pattern needs a named `value` group");
        }
        Ok(Self {
            label: label.to_string(),
            url: url.to_string(),
            pattern,
            client,
            timeout: Duration::from_secs(15),
        })
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    async fn fetch_page(&self) -> Result<String> {
        self.client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .context("quote page request")?
            .error_for_status()
            .context("quote page status")?
            .text()
            .await
            .context("quote page body")
    }
}

/// Apply `pattern` to `body`. Pure; used by [`HttpQuoteProvider`].
pub fn extract_quote(
    body: &str,
    pattern: &Regex,
    label: &str,
    now: DateTime<FixedOffset>,
) -> Option<Quote> {
    let caps = pattern.captures(body)?;
    let clean = |name: &str| {
        caps.name(name)
            .map(|m| crate::ingest::normalize_text(m.as_str()))
            .filter(|s| !s.is_empty())
    };
    let value = clean("value")?;
    Some(Quote {
        label: label.to_string(),
        value,
        change: clean("change"),
        as_of: clean("time").unwrap_or_else(|| now.format("%H:%M %d/%m/%Y").to_string()),
    })
}

#[async_trait]
impl QuoteProvider for HttpQuoteProvider {
    async fn latest(&self, now: DateTime<FixedOffset>) -> Option<Quote> {
        let body = match self.fetch_page().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = ?e, url = %self.url, "quote lookup failed");
                return None;
            }
        };
        let quote = extract_quote(&body, &self.pattern, &self.label, now);
        if quote.is_none() {
            tracing::warn!(url = %self.url, "quote pattern did not match");
        }
        quote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(7 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 10, 13, 9, 30, 0)
            .unwrap()
    }

    #[test]
    fn extracts_named_groups() {
        let re = Regex::new(
            r#"(?s)class="price">(?P<value>[^<]+)</span>.*?class="chg">(?P<change>[^<]+)</span>"#,
        )
        .unwrap();
        let html = r#"<div><span class="price">12,450 </span> <span class="chg">+1.2%</span></div>"#;
        let q = extract_quote(html, &re, "MZG", now()).unwrap();
        assert_eq!(q.value, "12,450");
        assert_eq!(q.change.as_deref(), Some("+1.2%"));
        assert_eq!(q.as_of, "09:30 13/10/2025");
    }

    #[test]
    fn no_match_is_none() {
        let re = Regex::new(r"price=(?P<value>\d+)").unwrap();
        assert!(extract_quote("nothing here", &re, "X", now()).is_none());
    }

    #[test]
    fn pattern_without_value_group_is_rejected() {
        assert!(HttpQuoteProvider::new("X", "http://x", r"(\d+)", Client::new()).is_err());
    }
}
