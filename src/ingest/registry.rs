// src/ingest/registry.rs
use std::time::Duration;

use crate::ingest::providers::rss::RssProvider;
use crate::ingest::strategy::Strategy;
use crate::ingest::types::{Source, SourceProvider};

/// Account handles for the feeds that follow a page or tag instead of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocialHandles {
    pub facebook_page: Option<String>,
    /// Defaults to the keyword, lowercased with spaces removed.
    pub instagram_tag: Option<String>,
}

pub const DEFAULT_FACEBOOK_PAGE: &str = "mizagroup.vn";

impl Default for SocialHandles {
    fn default() -> Self {
        Self {
            facebook_page: Some(DEFAULT_FACEBOOK_PAGE.to_string()),
            instagram_tag: None,
        }
    }
}

fn hashtag(keyword: &str) -> String {
    keyword
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Static list of sources, fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    pub fn new(sources: Vec<Source>) -> Self {
        Self { sources }
    }

    /// Google News search plus the RSSHub social feeds, built for `keyword`.
    ///
    /// Facebook follows a page id rather than a search, so it comes from
    /// `handles` and is left out when no page is set.
    pub fn defaults_for(keyword: &str, handles: &SocialHandles) -> Self {
        let search = [
            (
                "Google News",
                "https://news.google.com/rss/search?q={keyword}&hl=vi&gl=VN&ceid=VN:vi",
                Strategy::GoogleNews,
            ),
            (
                "YouTube",
                "https://rsshub.app/youtube/search/{keyword}",
                Strategy::Social,
            ),
            (
                "TikTok",
                "https://rsshub.app/tiktok/search/{keyword}",
                Strategy::Social,
            ),
        ];

        let mut sources: Vec<Source> = search
            .into_iter()
            .map(|(name, endpoint, strategy)| {
                Source::new(name, expand_endpoint(endpoint, keyword)).with_strategy(strategy)
            })
            .collect();

        if let Some(page) = handles.facebook_page.as_deref().filter(|p| !p.trim().is_empty()) {
            sources.push(
                Source::new(
                    "Facebook",
                    expand_endpoint("https://rsshub.app/facebook/page/{keyword}", page.trim()),
                )
                .with_strategy(Strategy::Social)
                .matching_keyword(true),
            );
        }

        let tag = handles
            .instagram_tag
            .clone()
            .unwrap_or_else(|| hashtag(keyword));
        sources.push(
            Source::new(
                "Instagram",
                expand_endpoint("https://rsshub.app/instagram/tag/{keyword}", &tag),
            )
            .with_strategy(Strategy::Social),
        );

        Self { sources }
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// One HTTP provider per source, sharing `client`.
    pub fn http_providers(
        &self,
        keyword: &str,
        client: &reqwest::Client,
        timeout: Duration,
    ) -> Vec<Box<dyn SourceProvider>> {
        self.sources
            .iter()
            .cloned()
            .map(|s| {
                Box::new(RssProvider::http(s, client.clone(), timeout).with_keyword(keyword))
                    as Box<dyn SourceProvider>
            })
            .collect()
    }
}

/// Substitute `{keyword}`, percent-encoded for where it sits: form encoding
/// in the query string (space as `+`), path-segment encoding before it
/// (space as `%20`, `/` escaped).
pub fn expand_endpoint(template: &str, keyword: &str) -> String {
    if !template.contains("{keyword}") {
        return template.to_string();
    }
    let (path, query) = match template.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (template, None),
    };
    let mut out = path.replace("{keyword}", &encode_path_segment(keyword));
    if let Some(q) = query {
        out.push('?');
        out.push_str(&q.replace("{keyword}", &encode_query_value(keyword)));
    }
    out
}

fn encode_query_value(keyword: &str) -> String {
    reqwest::Url::parse_with_params("http://x.invalid/", &[("q", keyword)])
        .ok()
        .and_then(|u| u.query().map(|q| q.trim_start_matches("q=").to_string()))
        .unwrap_or_else(|| keyword.replace(' ', "+"))
}

fn encode_path_segment(keyword: &str) -> String {
    let Ok(mut url) = reqwest::Url::parse("http://x.invalid/") else {
        return keyword.replace(' ', "%20");
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear().push(keyword);
    }
    url.path().trim_start_matches('/').to_string()
}
