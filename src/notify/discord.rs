use super::{html_to_markup, Notifier};
use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Discord caps embed descriptions at 4096 characters.
const DESCRIPTION_MAX_CHARS: usize = 4096;

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
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
impl Notifier for DiscordNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let payload = DiscordWebhookPayload::from_digest(text);

        let rsp = self
            .client
            .post(&self.webhook)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("Discord webhook request failed: {}", e.without_url()))?;
        rsp.error_for_status()
            .map_err(|e| anyhow!("Discord webhook HTTP error: {}", e.without_url()))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "discord"
    }
}

#[derive(Serialize, Debug, PartialEq)]
struct DiscordEmbed {
    title: String,
    description: String,
}

#[derive(Serialize, Debug, PartialEq)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    /// Header line becomes the embed title, the rest its description.
    fn from_digest(html: &str) -> Self {
        let md = html_to_markup(html, "**", true);
        let (title, body) = md.split_once("\n\n").unwrap_or((md.as_str(), ""));
        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                title: title.replace("**", ""),
                description: body.chars().take(DESCRIPTION_MAX_CHARS).collect(),
            }],
        }
    }
}
