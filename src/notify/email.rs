use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};
use std::time::Duration;

use super::{html_to_markup, Notifier};

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
    name: String,
}

impl EmailNotifier {
    pub fn new(host: &str, user: String, pass: String, from: &str, to: &str) -> Result<Self> {
        let creds = Credentials::new(user, pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .with_context(|| format!("invalid SMTP host {host}"))?
            .credentials(creds)
            .timeout(Some(Duration::from_secs(20)))
            .build();

        let from: Mailbox = from.parse().context("invalid email `from` address")?;
        let to: Mailbox = to.parse().context("invalid email `to` address")?;

        Ok(Self {
            name: format!("email:{}", to.email),
            mailer,
            from,
            to,
        })
    }
}

/// First line (digest header) becomes the subject.
fn subject_and_body(text: &str) -> (String, String) {
    let plain = html_to_markup(text, "", true);
    let subject = plain.lines().next().unwrap_or_default().trim().to_string();
    (subject, plain)
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let (subject, body) = subject_and_body(text);

        let msg = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
