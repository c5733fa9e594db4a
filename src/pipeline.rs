//! # Job pipeline
//! fetch → filter → dedup → render → dispatch → mark seen.
//!
//! Rendered items are recorded in the seen store only after the dispatch was
//! accepted (delivered somewhere, or a dry run). When every destination
//! failed nothing is recorded and the next cadence tries again.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};

use crate::format::{Digest, Formatter};
use crate::ingest::types::SourceProvider;
use crate::ingest::{aggregate, SelectionStats};
use crate::notify::{DispatchReport, NotifierMux};
use crate::quote::QuoteProvider;
use crate::scheduler::{DigestJob, JobAction, JobRunner};
use crate::seen::SeenStore;

/// What one digest run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub selection: SelectionStats,
    /// Items that made it into the rendered text.
    pub rendered: usize,
    /// `None` when the run stayed quiet.
    pub dispatch: Option<DispatchReport>,
    /// Identifiers newly written to the seen store.
    pub marked: usize,
}

pub struct Pipeline {
    providers: Vec<Box<dyn SourceProvider>>,
    seen: Box<dyn SeenStore>,
    formatter: Formatter,
    notifier: NotifierMux,
    quote: Option<Box<dyn QuoteProvider>>,
    fetch_delay: Duration,
    last_quote: Option<String>,
}

impl Pipeline {
    pub fn new(
        providers: Vec<Box<dyn SourceProvider>>,
        seen: Box<dyn SeenStore>,
        formatter: Formatter,
        notifier: NotifierMux,
    ) -> Self {
        Self {
            providers,
            seen,
            formatter,
            notifier,
            quote: None,
            fetch_delay: Duration::ZERO,
            last_quote: None,
        }
    }

    pub fn with_quote(mut self, quote: Box<dyn QuoteProvider>) -> Self {
        self.quote = Some(quote);
        self
    }

    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    pub fn seen(&self) -> &dyn SeenStore {
        self.seen.as_ref()
    }

    pub fn notifier(&self) -> &NotifierMux {
        &self.notifier
    }

    pub async fn run_digest(
        &mut self,
        job: &DigestJob,
        now: DateTime<FixedOffset>,
    ) -> Result<CycleReport> {
        self.seen.reload().context("reloading seen store")?;

        let (items, selection) = aggregate(
            &self.providers,
            now,
            job.window,
            self.seen.as_ref(),
            self.fetch_delay,
        )
        .await;

        let mut report = CycleReport {
            selection,
            ..Default::default()
        };

        if items.is_empty() && !job.send_when_empty {
            tracing::info!(target: "pipeline", "no new items; staying quiet");
            return Ok(report);
        }

        let quote = match (&self.quote, job.include_quote) {
            (Some(q), true) => q.latest(now).await,
            _ => None,
        };

        let mut digest =
            Digest::new(items, job.max_items, quote).with_headline(job.headline.clone());
        // Entries past the message limit are dropped here and stay unseen.
        let text = self.formatter.render_fitted(&mut digest, now).await;
        report.rendered = digest.items.len();

        let dispatch = self.notifier.dispatch(&text).await;

        if dispatch.accepted() {
            for id in digest.identifiers() {
                if self
                    .seen
                    .add(id)
                    .with_context(|| format!("recording {id} as seen"))?
                {
                    report.marked += 1;
                }
            }
        } else {
            tracing::warn!(
                target: "pipeline",
                failed = dispatch.failed(),
                "every destination failed; items stay unseen for the next run"
            );
        }

        tracing::info!(
            target: "pipeline",
            rendered = report.rendered,
            delivered = dispatch.delivered(),
            failed = dispatch.failed(),
            marked = report.marked,
            "digest dispatched"
        );
        report.dispatch = Some(dispatch);
        Ok(report)
    }

    /// Quote-only message. Returns `None` when nothing was sent.
    pub async fn run_quote(
        &mut self,
        only_on_change: bool,
        now: DateTime<FixedOffset>,
    ) -> Option<DispatchReport> {
        let Some(provider) = &self.quote else {
            tracing::warn!(target: "pipeline", "quote job scheduled but no quote source configured");
            return None;
        };
        let quote = provider.latest(now).await?;

        if only_on_change && self.last_quote.as_deref() == Some(quote.value.as_str()) {
            tracing::debug!(target: "pipeline", value = %quote.value, "quote unchanged");
            return None;
        }

        let text = self.formatter.render_quote(&quote, now);
        let report = self.notifier.dispatch(&text).await;
        if report.accepted() {
            self.last_quote = Some(quote.value);
        }
        Some(report)
    }

    pub async fn announce(&self, message: &str) -> DispatchReport {
        let text = html_escape::encode_text(message);
        self.notifier.dispatch(&text).await
    }
}

#[async_trait::async_trait]
impl JobRunner for Pipeline {
    async fn run(
        &mut self,
        job: &str,
        action: &JobAction,
        now: DateTime<FixedOffset>,
    ) -> Result<()> {
        match action {
            JobAction::Digest(d) => {
                let report = self
                    .run_digest(d, now)
                    .await
                    .with_context(|| format!("digest job {job}"))?;
                tracing::debug!(target: "pipeline", job, ?report, "digest run");
            }
            JobAction::Quote { only_on_change } => {
                self.run_quote(*only_on_change, now).await;
            }
            JobAction::Announce { message } => {
                self.announce(message).await;
            }
        }
        Ok(())
    }
}
