use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

use super::{html_to_markup, Notifier};

pub struct SlackNotifier {
    webhook_url: String,
    client: Client,
    timeout: Duration,
}

impl SlackNotifier {
    pub fn new(url: String) -> Self {
        Self {
            webhook_url: url,
            client: Client::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait::async_trait]
impl Notifier for SlackNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        // Slack mrkdwn keeps &amp; &lt; &gt; escaped
        let body = serde_json::json!({ "text": html_to_markup(text, "*", false) });

        self.client
            .post(&self.webhook_url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| e.without_url())
            .context("slack post")?
            .error_for_status()
            .map_err(|e| e.without_url())
            .context("slack non-2xx")?;
        Ok(())
    }

    fn name(&self) -> &str {
        "slack"
    }
}
