//! # Digest formatting
//! Renders a bounded batch of items into one Telegram-HTML message.
//!
//! Layout:
//! ```text
//! 📢 <b>{headline} (HH:MM dd/mm)</b>
//!
//! 💰 <b>{quote label}</b>: {value} ({change}) · {as of}      (optional)
//!
//! 1. 📰 <b>{title}</b> - {source}
//! 🔗 {link}
//! ```
//! With no items the numbered list is replaced by the "no updates" line.
//! `render_fitted` drops trailing entries until the text fits the message
//! limit, so the digest only names items that were actually sent.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use html_escape::encode_text;

use crate::ingest::types::Item;
use crate::quote::Quote;
use crate::shorten::{LinkShortener, NoopShortener};

pub const DEFAULT_MAX_ITEMS: usize = 10;

/// `sendMessage` text limit, in UTF-16 code units.
pub const TELEGRAM_MAX_CHARS: usize = 4096;

const ELLIPSIS: char = '…';

/// Telegram measures text in UTF-16 code units. Markup is counted too, which
/// over-estimates and keeps the check on the safe side.
pub fn message_len(text: &str) -> usize {
    text.encode_utf16().count()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestStyle {
    pub headline: String,
    pub empty_message: String,
}

impl DigestStyle {
    pub fn for_keyword(keyword: &str) -> Self {
        Self {
            headline: format!("Latest updates on {keyword}"),
            empty_message: format!("No new updates about {keyword}."),
        }
    }
}

/// Ordered items (newest first) plus an optional quote, already truncated.
#[derive(Debug, Clone, Default)]
pub struct Digest {
    pub items: Vec<Item>,
    pub quote: Option<Quote>,
    pub headline: Option<String>,
}

impl Digest {
    /// Keeps the first `max_count` items without reordering them.
    pub fn new(mut items: Vec<Item>, max_count: usize, quote: Option<Quote>) -> Self {
        items.truncate(max_count);
        Self {
            items,
            quote,
            headline: None,
        }
    }

    pub fn with_headline(mut self, headline: Option<String>) -> Self {
        self.headline = headline;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Identifiers of the items that end up in the rendered text.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|i| i.identifier.as_str())
    }
}

pub struct Formatter {
    style: DigestStyle,
    shortener: Arc<dyn LinkShortener>,
    max_chars: usize,
}

impl Formatter {
    pub fn new(style: DigestStyle) -> Self {
        Self {
            style,
            shortener: Arc::new(NoopShortener),
            max_chars: TELEGRAM_MAX_CHARS,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    pub fn with_shortener(mut self, shortener: Arc<dyn LinkShortener>) -> Self {
        self.shortener = shortener;
        self
    }

    pub fn style(&self) -> &DigestStyle {
        &self.style
    }

    fn header(&self, headline: Option<&str>, now: DateTime<FixedOffset>) -> String {
        let headline = headline.unwrap_or(&self.style.headline);
        format!(
            "📢 <b>{} ({})</b>",
            encode_text(headline),
            now.format("%H:%M %d/%m")
        )
    }

    fn preamble(&self, digest: &Digest, now: DateTime<FixedOffset>) -> Vec<String> {
        let mut parts = vec![self.header(digest.headline.as_deref(), now)];
        if let Some(q) = &digest.quote {
            parts.push(quote_paragraph(q));
        }
        parts
    }

    /// Renders every item in `digest`, ignoring the message limit.
    pub async fn render(&self, digest: &Digest, now: DateTime<FixedOffset>) -> String {
        let mut parts = self.preamble(digest, now);

        if digest.items.is_empty() {
            parts.push(encode_text(&self.style.empty_message).into_owned());
        } else {
            for (i, item) in digest.items.iter().enumerate() {
                let link = self.shortener.shorten(&item.identifier).await;
                parts.push(entry_line(i + 1, item, &link));
            }
        }

        parts.join("\n\n")
    }

    /// Like [`render`](Self::render), but keeps the text within `max_chars`.
    ///
    /// Entries are appended in order until the next one would overflow; the
    /// rest are removed from `digest.items`. When not even the first entry
    /// fits, its title is clipped so a single oversized item cannot block
    /// every later run.
    pub async fn render_fitted(&self, digest: &mut Digest, now: DateTime<FixedOffset>) -> String {
        if digest.items.is_empty() {
            return self.render(digest, now).await;
        }

        let mut text = self.preamble(digest, now).join("\n\n");
        let mut used = message_len(&text);
        let mut kept = 0;

        for (i, item) in digest.items.iter().enumerate() {
            let link = self.shortener.shorten(&item.identifier).await;
            let entry = entry_line(i + 1, item, &link);
            let cost = 2 + message_len(&entry);
            if used + cost > self.max_chars {
                if kept == 0 {
                    let budget = self.max_chars.saturating_sub(used + 2);
                    text.push_str("\n\n");
                    text.push_str(&clipped_entry(item, &link, budget));
                    kept = 1;
                }
                break;
            }
            text.push_str("\n\n");
            text.push_str(&entry);
            used += cost;
            kept += 1;
        }

        if kept < digest.items.len() {
            tracing::warn!(
                target: "format",
                kept,
                dropped = digest.items.len() - kept,
                max_chars = self.max_chars,
                "digest exceeds the message limit; deferring trailing items"
            );
            digest.items.truncate(kept);
        }
        text
    }

    /// Header plus quote paragraph, for the quote-poll job.
    pub fn render_quote(&self, quote: &Quote, now: DateTime<FixedOffset>) -> String {
        format!("{}\n\n{}", self.header(Some(&quote.label), now), quote_paragraph(quote))
    }
}

fn entry_line(n: usize, item: &Item, link: &str) -> String {
    format!(
        "{n}. 📰 <b>{}</b> - {}\n🔗 {}",
        encode_text(&item.title),
        encode_text(item.label()),
        encode_text(link)
    )
}

/// First entry with its title shortened until the line fits `budget`.
fn clipped_entry(item: &Item, link: &str, budget: usize) -> String {
    let mut title: Vec<char> = item.title.chars().collect();
    loop {
        let t: String = title.iter().collect();
        let mut clipped = item.clone();
        clipped.title = if title.len() < item.title.chars().count() {
            format!("{t}{ELLIPSIS}")
        } else {
            t
        };
        let line = entry_line(1, &clipped, link);
        if message_len(&line) <= budget || title.is_empty() {
            return line;
        }
        title.pop();
    }
}

fn quote_paragraph(q: &Quote) -> String {
    let change = q
        .change
        .as_deref()
        .map(|c| format!(" ({})", encode_text(c)))
        .unwrap_or_default();
    format!(
        "💰 <b>{}</b>: {}{} · {}",
        encode_text(&q.label),
        encode_text(&q.value),
        change,
        encode_text(&q.as_of)
    )
}
