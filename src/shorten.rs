//! Link shortening. Any failure returns the original URL unchanged.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

const TINYURL_ENDPOINT: &str = "https://tinyurl.com/api-create.php";

#[async_trait]
pub trait LinkShortener: Send + Sync {
    async fn shorten(&self, url: &str) -> String;
}

/// Leaves links untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopShortener;

#[async_trait]
impl LinkShortener for NoopShortener {
    async fn shorten(&self, url: &str) -> String {
        url.to_string()
    }
}

#[derive(Clone)]
pub struct TinyUrlShortener {
    endpoint: String,
    client: Client,
    timeout: Duration,
}

impl TinyUrlShortener {
    pub fn new(client: Client) -> Self {
        Self {
            endpoint: TINYURL_ENDPOINT.to_string(),
            client,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    async fn try_shorten(&self, url: &str) -> anyhow::Result<String> {
        let rsp = self
            .client
            .get(&self.endpoint)
            .query(&[("url", url)])
            .timeout(self.timeout)
            .send()
            .await?
            .error_for_status()?;
        let short = rsp.text().await?.trim().to_string();
        if !short.starts_with("http") {
            anyhow::bail!("unexpected shortener reply: {short:?}");
        }
        Ok(short)
    }
}

#[async_trait]
impl LinkShortener for TinyUrlShortener {
    async fn shorten(&self, url: &str) -> String {
        match self.try_shorten(url).await {
            Ok(short) => short,
            Err(e) => {
                tracing::debug!(error = %e, url, "shortening failed; keeping original link");
                url.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_shortener_returns_original() {
        let s = TinyUrlShortener::new(Client::new())
            .with_endpoint("http://127.0.0.1:9/api-create.php")
            .with_timeout(2);
        assert_eq!(
            s.shorten("https://example.test/a?b=c").await,
            "https://example.test/a?b=c"
        );
    }
}
