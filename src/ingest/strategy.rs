//! Per-source normalization strategies.
//!
//! Feeds disagree on where they put the timestamp and title. Instead of
//! branching on the source name, each source descriptor selects a
//! [`Strategy`], and the strategy owns an ordered list of candidate fields for
//! every capability (timestamp, title, publisher).

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use time::{
    format_description::well_known::{Rfc2822, Rfc3339},
    OffsetDateTime,
};

use crate::ingest::normalize_text;

/// Longest title derived from a post body (social feeds).
const DERIVED_TITLE_MAX_CHARS: usize = 140;

/// One `<item>`/`<entry>` as read from the document: element local name →
/// first text seen for it, plus the resolved link.
#[derive(Debug, Clone, Default)]
pub struct RawEntry {
    pub fields: HashMap<String, String>,
    pub link: Option<String>,
}

impl RawEntry {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    /// Record `value` under `name` unless an earlier element already did.
    pub fn set_if_absent(&mut self, name: &str, value: String) {
        if value.trim().is_empty() {
            return;
        }
        self.fields.entry(name.to_string()).or_insert(value);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Standard,
    GoogleNews,
    Social,
}

struct FieldTable {
    timestamp: &'static [&'static str],
    title: &'static [&'static str],
    publisher: &'static [&'static str],
    strip_publisher_suffix: bool,
}

const TIMESTAMP_FIELDS: &[&str] = &["pubDate", "published", "updated", "date", "issued"];
const PUBLISHER_FIELDS: &[&str] = &["source", "author", "creator"];

static STANDARD: FieldTable = FieldTable {
    timestamp: TIMESTAMP_FIELDS,
    title: &["title"],
    publisher: PUBLISHER_FIELDS,
    strip_publisher_suffix: false,
};

static GOOGLE_NEWS: FieldTable = FieldTable {
    timestamp: TIMESTAMP_FIELDS,
    title: &["title"],
    publisher: &["source"],
    strip_publisher_suffix: true,
};

static SOCIAL: FieldTable = FieldTable {
    timestamp: TIMESTAMP_FIELDS,
    title: &["title", "description", "summary", "content"],
    publisher: PUBLISHER_FIELDS,
    strip_publisher_suffix: false,
};

impl Strategy {
    fn table(self) -> &'static FieldTable {
        match self {
            Strategy::Standard => &STANDARD,
            Strategy::GoogleNews => &GOOGLE_NEWS,
            Strategy::Social => &SOCIAL,
        }
    }

    /// First candidate field that parses as a timestamp, converted to `tz`.
    pub fn extract_timestamp(
        self,
        entry: &RawEntry,
        tz: &FixedOffset,
    ) -> Option<DateTime<FixedOffset>> {
        self.table()
            .timestamp
            .iter()
            .filter_map(|f| entry.field(f))
            .find_map(parse_timestamp)
            .map(|dt| dt.with_timezone(tz))
    }

    pub fn extract_publisher(self, entry: &RawEntry) -> Option<String> {
        self.table()
            .publisher
            .iter()
            .filter_map(|f| entry.field(f))
            .map(normalize_text)
            .find(|s| !s.is_empty())
    }

    /// Normalized title, or `None` when no candidate field carries text.
    pub fn extract_title(self, entry: &RawEntry, publisher: Option<&str>) -> Option<String> {
        let table = self.table();
        let title = table
            .title
            .iter()
            .filter_map(|f| entry.field(f))
            .map(normalize_text)
            .find(|s| !s.is_empty())?;

        let title = match publisher {
            Some(p) if table.strip_publisher_suffix => strip_suffix(&title, p),
            _ => title,
        };
        Some(cap_chars(title, DERIVED_TITLE_MAX_CHARS))
    }
}

/// RFC 2822 (RSS `pubDate`) or RFC 3339 (Atom, Dublin Core).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    let odt = OffsetDateTime::parse(raw, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(raw, &Rfc3339))
        .ok();
    if let Some(odt) = odt {
        let offset = FixedOffset::east_opt(odt.offset().whole_seconds())?;
        return DateTime::from_timestamp(odt.unix_timestamp(), odt.nanosecond())
            .map(|utc| utc.with_timezone(&offset));
    }
    // chrono accepts a few legacy zone names `time` rejects
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}

fn strip_suffix(title: &str, publisher: &str) -> String {
    let suffix = format!(" - {publisher}");
    match title.strip_suffix(&suffix) {
        Some(head) if !head.trim().is_empty() => head.trim_end().to_string(),
        _ => title.to_string(),
    }
}

fn cap_chars(s: String, max: usize) -> String {
    if s.chars().count() <= max {
        return s;
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}
