// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, FixedOffset};

use crate::ingest::strategy::Strategy;

/// Shown when a feed entry carries no usable title.
pub const UNTITLED: &str = "(untitled)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub identifier: String,   // canonical link, dedup key
    pub title: String,        // normalized headline
    pub source_name: String,  // e.g. "Google News", "YouTube"
    pub publisher: Option<String>,
    pub published_at: DateTime<FixedOffset>, // reference timezone
}

impl Item {
    /// Label rendered next to the title: the publisher when the feed names one.
    pub fn label(&self) -> &str {
        self.publisher.as_deref().unwrap_or(&self.source_name)
    }
}

/// Source descriptor, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub endpoint: String,
    pub strategy: Strategy,
    /// Keep only entries whose title mentions the keyword.
    pub match_keyword: bool,
    /// Cap on entries taken from one document; 0 = unlimited.
    pub max_entries: usize,
}

impl Source {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            strategy: Strategy::Standard,
            match_keyword: false,
            max_entries: 0,
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn matching_keyword(mut self, on: bool) -> Self {
        self.match_keyword = on;
        self
    }

    pub fn with_max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    /// Fetch and normalize the current entries. `now` is the fallback timestamp.
    async fn fetch_latest(&self, now: DateTime<FixedOffset>) -> Result<Vec<Item>>;
    fn name(&self) -> &str;
}
