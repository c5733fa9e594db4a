// src/notify/mod.rs
pub mod discord;
pub mod email;
pub mod slack;
pub mod telegram;

use anyhow::Result;
use metrics::counter;

/// One notification destination. `send` makes exactly one attempt.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// `text` is Telegram-flavoured HTML (`<b>` plus escaped entities).
    async fn send(&self, text: &str) -> Result<()>;
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub destination: String,
    pub error: Option<String>,
}

impl DeliveryOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub outcomes: Vec<DeliveryOutcome>,
}

impl DispatchReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }

    /// No destinations were configured; nothing was attempted.
    pub fn is_dry_run(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// The digest reached somebody (or there was nobody to reach).
    pub fn accepted(&self) -> bool {
        self.is_dry_run() || self.delivered() > 0
    }
}

/// Fans one message out to every destination, isolating failures.
#[derive(Default)]
pub struct NotifierMux {
    notifiers: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new(notifiers: Vec<Box<dyn Notifier>>) -> Self {
        Self { notifiers }
    }

    pub fn push(&mut self, n: Box<dyn Notifier>) {
        self.notifiers.push(n);
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.notifiers.iter().map(|n| n.name().to_string()).collect()
    }

    /// One attempt per destination, in configuration order. Never fails.
    pub async fn dispatch(&self, text: &str) -> DispatchReport {
        if self.notifiers.is_empty() {
            tracing::info!(target: "notify", "no destinations configured (dry run):\n{text}");
            return DispatchReport::default();
        }

        let mut outcomes = Vec::with_capacity(self.notifiers.len());
        for n in &self.notifiers {
            let destination = n.name().to_string();
            let outcome = match n.send(text).await {
                Ok(()) => {
                    tracing::debug!(target: "notify", destination = %destination, "delivered");
                    counter!("notify_attempts_total", "destination" => destination.clone(), "outcome" => "ok")
                        .increment(1);
                    DeliveryOutcome {
                        destination,
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "notify", destination = %destination, error = ?e, "delivery failed");
                    counter!("notify_attempts_total", "destination" => destination.clone(), "outcome" => "error")
                        .increment(1);
                    DeliveryOutcome {
                        destination,
                        error: Some(format!("{e:#}")),
                    }
                }
            };
            outcomes.push(outcome);
        }
        DispatchReport { outcomes }
    }
}

/// Convert the digest HTML for destinations that speak Markdown-ish markup.
/// `<b>` becomes `bold`, other tags are dropped; entities are decoded unless
/// the target expects them escaped (Slack).
pub fn html_to_markup(html: &str, bold: &str, decode_entities: bool) -> String {
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?i)</?[a-z][^>]*>").unwrap());

    let out = html
        .replace("<b>", bold)
        .replace("</b>", bold);
    let out = re_tags.replace_all(&out, "");
    if decode_entities {
        html_escape::decode_html_entities(&out).into_owned()
    } else {
        out.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_conversion() {
        let html = "📢 <b>News &amp; views</b>\n🔗 https://x/?a=1&amp;b=2";
        assert_eq!(
            html_to_markup(html, "**", true),
            "📢 **News & views**\n🔗 https://x/?a=1&b=2"
        );
        assert_eq!(
            html_to_markup(html, "*", false),
            "📢 *News &amp; views*\n🔗 https://x/?a=1&amp;b=2"
        );
        assert_eq!(html_to_markup("<i>x</i> &lt;y&gt;", "", true), "x <y>");
    }

    #[test]
    fn report_acceptance() {
        let ok = DeliveryOutcome {
            destination: "a".into(),
            error: None,
        };
        let bad = DeliveryOutcome {
            destination: "b".into(),
            error: Some("boom".into()),
        };
        assert!(DispatchReport::default().accepted());
        assert!(DispatchReport {
            outcomes: vec![bad.clone(), ok]
        }
        .accepted());
        assert!(!DispatchReport {
            outcomes: vec![bad]
        }
        .accepted());
    }
}
