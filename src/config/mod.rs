// src/config/mod.rs
//! Runtime configuration: one TOML file plus environment overrides.
//!
//! Lookup order:
//! 1) $NEWS_BOT_CONFIG_PATH (must exist when set)
//! 2) config/news_bot.toml
//! 3) built-in defaults
//!
//! Secret fields written as `"ENV"` are read from the environment.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{FixedOffset, NaiveTime, Weekday};
use serde::Deserialize;

use crate::format::{DEFAULT_MAX_ITEMS, TELEGRAM_MAX_CHARS};
use crate::ingest::recency::RecencyWindow;
use crate::ingest::registry::{expand_endpoint, SocialHandles, SourceRegistry, DEFAULT_FACEBOOK_PAGE};
use crate::ingest::strategy::Strategy;
use crate::ingest::types::Source;
use crate::notify::discord::DiscordNotifier;
use crate::notify::email::EmailNotifier;
use crate::notify::slack::SlackNotifier;
use crate::notify::telegram::TelegramNotifier;
use crate::notify::{Notifier, NotifierMux};
use crate::scheduler::{Cadence, DigestJob, Job, JobAction};

pub const ENV_CONFIG_PATH: &str = "NEWS_BOT_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/news_bot.toml";

/// Longest accepted recency window.
pub const MAX_WINDOW_DAYS: i64 = 366;

fn default_keyword() -> String {
    "Miza".to_string()
}
fn default_utc_offset() -> String {
    "+07:00".to_string()
}
fn default_seen_path() -> PathBuf {
    PathBuf::from("data/seen_links.txt")
}
fn default_tick_secs() -> u64 {
    60
}
fn default_http_timeout_secs() -> u64 {
    15
}
fn default_fetch_delay_ms() -> u64 {
    1000
}
fn default_max_items() -> usize {
    DEFAULT_MAX_ITEMS
}
fn default_facebook_page() -> String {
    DEFAULT_FACEBOOK_PAGE.to_string()
}
fn default_max_message_chars() -> usize {
    TELEGRAM_MAX_CHARS
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_keyword")]
    pub keyword: String,
    /// Reference timezone as `+HH:MM` / `-HH:MM`.
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
    #[serde(default = "default_seen_path")]
    pub seen_path: PathBuf,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    /// Pause between consecutive source fetches.
    #[serde(default = "default_fetch_delay_ms")]
    pub fetch_delay_ms: u64,
    /// Default digest size for jobs that don't set their own.
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// Digest text limit; trailing entries past it wait for the next run.
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    #[serde(default)]
    pub shorten_links: bool,
    /// Job run once before the loop; defaults to the first interval digest.
    #[serde(default)]
    pub startup_job: Option<String>,
    /// Prometheus listener, e.g. "0.0.0.0:9000".
    #[serde(default)]
    pub metrics_addr: Option<SocketAddr>,
    /// Page id for the built-in Facebook feed; empty leaves it out.
    #[serde(default = "default_facebook_page")]
    pub facebook_page: String,
    /// Hashtag for the built-in Instagram feed; defaults to the keyword.
    #[serde(default)]
    pub instagram_tag: Option<String>,
    /// Empty = built-in source list for the keyword.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub destinations: Vec<DestinationConfig>,
    #[serde(default)]
    pub quote: Option<QuoteConfig>,
    /// Empty = hourly check, daily and weekly summary.
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    /// May contain `{keyword}`.
    pub endpoint: String,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub match_keyword: bool,
    #[serde(default)]
    pub max_entries: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DestinationConfig {
    Telegram {
        token: String,
        /// Comma-separated when resolved from the environment.
        chat_id: String,
    },
    Discord {
        webhook_url: String,
    },
    Slack {
        webhook_url: String,
    },
    Email {
        smtp_host: String,
        user: String,
        pass: String,
        from: String,
        to: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteConfig {
    pub label: String,
    pub url: String,
    /// Regex with a named `value` group; `change` and `time` are optional.
    pub pattern: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CadenceConfig {
    IntervalMinutes(u64),
    /// "HH:MM"
    Daily(String),
    Weekly { day: String, at: String },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowConfig {
    SameDayOrWithinHours(i64),
    RollingHours(i64),
    RollingDays(i64),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionConfig {
    Digest {
        window: WindowConfig,
        #[serde(default)]
        max_items: Option<usize>,
        #[serde(default)]
        include_quote: bool,
        #[serde(default)]
        send_when_empty: bool,
        #[serde(default)]
        headline: Option<String>,
    },
    Quote {
        #[serde(default)]
        only_on_change: bool,
    },
    Announce {
        message: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub cadence: CadenceConfig,
    #[serde(flatten)]
    pub action: ActionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            keyword: default_keyword(),
            utc_offset: default_utc_offset(),
            seen_path: default_seen_path(),
            tick_secs: default_tick_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            fetch_delay_ms: default_fetch_delay_ms(),
            max_items: default_max_items(),
            max_message_chars: default_max_message_chars(),
            shorten_links: false,
            startup_job: None,
            metrics_addr: None,
            facebook_page: default_facebook_page(),
            instagram_tag: None,
            sources: Vec::new(),
            destinations: Vec::new(),
            quote: None,
            jobs: Vec::new(),
        }
    }
}

fn default_jobs() -> Vec<JobConfig> {
    vec![
        JobConfig {
            name: "hourly-check".into(),
            cadence: CadenceConfig::IntervalMinutes(60),
            action: ActionConfig::Digest {
                window: WindowConfig::SameDayOrWithinHours(24),
                max_items: None,
                include_quote: false,
                send_when_empty: false,
                headline: None,
            },
        },
        JobConfig {
            name: "daily-summary".into(),
            cadence: CadenceConfig::Daily("21:00".into()),
            action: ActionConfig::Digest {
                window: WindowConfig::RollingHours(24),
                max_items: None,
                include_quote: true,
                send_when_empty: true,
                headline: Some("Daily summary".into()),
            },
        },
        JobConfig {
            name: "weekly-summary".into(),
            cadence: CadenceConfig::Weekly {
                day: "sun".into(),
                at: "20:00".into(),
            },
            action: ActionConfig::Digest {
                window: WindowConfig::RollingDays(7),
                max_items: Some(20),
                include_quote: false,
                send_when_empty: true,
                headline: Some("Weekly summary".into()),
            },
        },
    ]
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s).context("parsing config TOML")?;
        if cfg.jobs.is_empty() {
            cfg.jobs = default_jobs();
        }
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&data).with_context(|| format!("in {}", path.display()))
    }

    /// Env var, then `config/news_bot.toml`, then defaults. Env overrides are
    /// applied and the result validated.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            Self::load_from(&pb)?
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::load_from(Path::new(DEFAULT_CONFIG_PATH))?
        } else {
            tracing::info!("no config file found; using built-in defaults");
            Self {
                jobs: default_jobs(),
                ..Self::default()
            }
        };
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = env_nonempty("NEWS_KEYWORD") {
            self.keyword = v;
        }
        if let Some(v) = env_nonempty("NEWS_UTC_OFFSET") {
            self.utc_offset = v;
        }
        if let Some(v) = env_nonempty("NEWS_SEEN_PATH") {
            self.seen_path = PathBuf::from(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.keyword.trim().is_empty() {
            bail!("keyword must not be empty");
        }
        if self.tick_secs == 0 {
            bail!("tick_secs must be > 0");
        }
        if self.max_items == 0 {
            bail!("max_items must be > 0");
        }
        if !(1..=TELEGRAM_MAX_CHARS).contains(&self.max_message_chars) {
            bail!("max_message_chars must be between 1 and {TELEGRAM_MAX_CHARS}");
        }
        self.offset()?;

        let mut names = HashSet::new();
        for job in &self.jobs {
            if !names.insert(job.name.as_str()) {
                bail!("duplicate job name {:?}", job.name);
            }
            job.cadence()
                .with_context(|| format!("job {:?}", job.name))?;
            job.check_action()
                .with_context(|| format!("job {:?}", job.name))?;
        }
        if let Some(start) = &self.startup_job {
            if !names.contains(start.as_str()) {
                bail!("startup_job {start:?} is not a configured job");
            }
        }
        Ok(())
    }

    pub fn offset(&self) -> Result<FixedOffset> {
        parse_offset(&self.utc_offset)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn fetch_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_delay_ms)
    }

    pub fn registry(&self) -> SourceRegistry {
        if self.sources.is_empty() {
            return SourceRegistry::defaults_for(&self.keyword, &self.social_handles());
        }
        SourceRegistry::new(
            self.sources
                .iter()
                .map(|s| {
                    Source::new(s.name.clone(), expand_endpoint(&s.endpoint, &self.keyword))
                        .with_strategy(s.strategy)
                        .matching_keyword(s.match_keyword)
                        .with_max_entries(s.max_entries)
                })
                .collect(),
        )
    }

    pub fn social_handles(&self) -> SocialHandles {
        let page = self.facebook_page.trim();
        SocialHandles {
            facebook_page: (!page.is_empty()).then(|| page.to_string()),
            instagram_tag: self
                .instagram_tag
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        }
    }

    pub fn build_jobs(&self) -> Result<Vec<Job>> {
        self.jobs
            .iter()
            .map(|j| -> Result<Job> {
                j.check_action()
                    .with_context(|| format!("job {:?}", j.name))?;
                Ok(Job::new(
                    j.name.clone(),
                    j.cadence()?,
                    j.action(self.max_items),
                ))
            })
            .collect()
    }

    /// Explicit `startup_job`, else the first interval digest job.
    pub fn startup_job_name(&self) -> Option<String> {
        if let Some(name) = &self.startup_job {
            return Some(name.clone());
        }
        self.jobs
            .iter()
            .find(|j| {
                matches!(j.cadence, CadenceConfig::IntervalMinutes(_))
                    && matches!(j.action, ActionConfig::Digest { .. })
            })
            .map(|j| j.name.clone())
    }

    /// Configured destinations, or one Telegram chat per id in
    /// `TELEGRAM_CHAT_ID` when none are configured and the bot env is set.
    pub fn build_notifiers(&self, client: &reqwest::Client) -> Result<NotifierMux> {
        let timeout = self.http_timeout_secs;
        let mut mux = NotifierMux::default();

        let destinations = if self.destinations.is_empty() {
            telegram_from_env().into_iter().collect::<Vec<_>>()
        } else {
            self.destinations.clone()
        };

        for d in &destinations {
            for n in build_destination(d, client, timeout)? {
                mux.push(n);
            }
        }

        if mux.is_empty() {
            tracing::warn!("no notification destinations configured; digests will only be logged");
        } else {
            tracing::info!(destinations = ?mux.names(), "notification destinations ready");
        }
        Ok(mux)
    }
}

impl JobConfig {
    pub fn cadence(&self) -> Result<Cadence> {
        match &self.cadence {
            CadenceConfig::IntervalMinutes(0) => bail!("interval_minutes must be > 0"),
            CadenceConfig::IntervalMinutes(m) => Ok(Cadence::Interval(Duration::from_secs(m * 60))),
            CadenceConfig::Daily(at) => Ok(Cadence::Daily(parse_time(at)?)),
            CadenceConfig::Weekly { day, at } => {
                let day = Weekday::from_str(day.trim())
                    .map_err(|_| anyhow!("invalid weekday {day:?}"))?;
                Ok(Cadence::Weekly(day, parse_time(at)?))
            }
        }
    }

    fn check_action(&self) -> Result<()> {
        if let ActionConfig::Digest {
            window, max_items, ..
        } = &self.action
        {
            if *max_items == Some(0) {
                bail!("max_items must be > 0");
            }
            window.check()?;
        }
        Ok(())
    }

    pub fn action(&self, default_max_items: usize) -> JobAction {
        match &self.action {
            ActionConfig::Digest {
                window,
                max_items,
                include_quote,
                send_when_empty,
                headline,
            } => JobAction::Digest(DigestJob {
                window: window.to_window(),
                max_items: max_items.unwrap_or(default_max_items),
                include_quote: *include_quote,
                send_when_empty: *send_when_empty,
                headline: headline.clone(),
            }),
            ActionConfig::Quote { only_on_change } => JobAction::Quote {
                only_on_change: *only_on_change,
            },
            ActionConfig::Announce { message } => JobAction::Announce {
                message: message.clone(),
            },
        }
    }
}

impl WindowConfig {
    /// Positive and at most [`MAX_WINDOW_DAYS`].
    pub fn check(self) -> Result<()> {
        let (value, limit, unit) = match self {
            WindowConfig::SameDayOrWithinHours(h) => (h, MAX_WINDOW_DAYS * 24, "hours"),
            WindowConfig::RollingHours(h) => (h, MAX_WINDOW_DAYS * 24, "hours"),
            WindowConfig::RollingDays(d) => (d, MAX_WINDOW_DAYS, "days"),
        };
        if !(1..=limit).contains(&value) {
            bail!("window of {value} {unit} is outside 1..={limit}");
        }
        Ok(())
    }

    pub fn to_window(self) -> RecencyWindow {
        match self {
            WindowConfig::SameDayOrWithinHours(h) => RecencyWindow::same_day_or_hours(h),
            WindowConfig::RollingHours(h) => RecencyWindow::rolling_hours(h),
            WindowConfig::RollingDays(d) => RecencyWindow::rolling_days(d),
        }
    }
}

fn env_nonempty(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `"ENV"` (any case) means: read `var` from the environment.
pub fn resolve_secret(value: &str, var: &str) -> Result<String> {
    if value.trim().eq_ignore_ascii_case("env") {
        env_nonempty(var).ok_or_else(|| anyhow!("Missing {var} env var"))
    } else {
        Ok(value.to_string())
    }
}

fn telegram_from_env() -> Option<DestinationConfig> {
    let token = env_nonempty("TELEGRAM_BOT_TOKEN")?;
    let chat_id = env_nonempty("TELEGRAM_CHAT_ID")?;
    Some(DestinationConfig::Telegram { token, chat_id })
}

fn build_destination(
    d: &DestinationConfig,
    client: &reqwest::Client,
    timeout: u64,
) -> Result<Vec<Box<dyn Notifier>>> {
    let out: Vec<Box<dyn Notifier>> = match d {
        DestinationConfig::Telegram { token, chat_id } => {
            let token = resolve_secret(token, "TELEGRAM_BOT_TOKEN")?;
            let chat_ids = resolve_secret(chat_id, "TELEGRAM_CHAT_ID")?;
            chat_ids
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(|c| {
                    Box::new(
                        TelegramNotifier::new(token.clone(), c.to_string())
                            .with_client(client.clone())
                            .with_timeout(timeout),
                    ) as Box<dyn Notifier>
                })
                .collect()
        }
        DestinationConfig::Discord { webhook_url } => {
            let url = resolve_secret(webhook_url, "DISCORD_WEBHOOK_URL")?;
            vec![Box::new(
                DiscordNotifier::new(url)
                    .with_client(client.clone())
                    .with_timeout(timeout),
            )]
        }
        DestinationConfig::Slack { webhook_url } => {
            let url = resolve_secret(webhook_url, "SLACK_WEBHOOK_URL")?;
            vec![Box::new(
                SlackNotifier::new(url)
                    .with_client(client.clone())
                    .with_timeout(timeout),
            )]
        }
        DestinationConfig::Email {
            smtp_host,
            user,
            pass,
            from,
            to,
        } => {
            let pass = resolve_secret(pass, "SMTP_PASS")?;
            vec![Box::new(EmailNotifier::new(
                smtp_host,
                user.clone(),
                pass,
                from,
                to,
            )?)]
        }
    };
    Ok(out)
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .with_context(|| format!("invalid time of day {s:?} (expected HH:MM)"))
}

/// Parse `+HH:MM`, `-HH:MM` or `+HH`.
pub fn parse_offset(s: &str) -> Result<FixedOffset> {
    let s = s.trim();
    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => bail!("invalid UTC offset {s:?} (expected +HH:MM)"),
    };
    let (h, m) = rest.split_once(':').unwrap_or((rest, "0"));
    let h: i32 = h
        .parse()
        .with_context(|| format!("invalid UTC offset {s:?}"))?;
    let m: i32 = m
        .parse()
        .with_context(|| format!("invalid UTC offset {s:?}"))?;
    if !(0..60).contains(&m) {
        bail!("invalid UTC offset {s:?}");
    }
    FixedOffset::east_opt(sign * (h * 3600 + m * 60))
        .ok_or_else(|| anyhow!("UTC offset out of range: {s:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_parse() {
        assert_eq!(parse_offset("+07:00").unwrap().local_minus_utc(), 7 * 3600);
        assert_eq!(parse_offset("-05:30").unwrap().local_minus_utc(), -(5 * 3600 + 1800));
        assert_eq!(parse_offset("+09").unwrap().local_minus_utc(), 9 * 3600);
        assert!(parse_offset("07:00").is_err());
        assert!(parse_offset("+7:75").is_err());
        assert!(parse_offset("+30:00").is_err());
    }

    #[test]
    fn cadences_parse() {
        let job = |cadence| JobConfig {
            name: "j".into(),
            cadence,
            action: ActionConfig::Quote {
                only_on_change: false,
            },
        };
        assert_eq!(
            job(CadenceConfig::IntervalMinutes(30)).cadence().unwrap(),
            Cadence::Interval(Duration::from_secs(1800))
        );
        assert_eq!(
            job(CadenceConfig::Weekly {
                day: "Sunday".into(),
                at: "20:00".into()
            })
            .cadence()
            .unwrap(),
            Cadence::Weekly(Weekday::Sun, NaiveTime::from_hms_opt(20, 0, 0).unwrap())
        );
        assert!(job(CadenceConfig::IntervalMinutes(0)).cadence().is_err());
        assert!(job(CadenceConfig::Daily("25:00".into())).cadence().is_err());
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig {
            jobs: default_jobs(),
            ..AppConfig::default()
        };
        cfg.validate().unwrap();
        assert_eq!(cfg.startup_job_name().as_deref(), Some("hourly-check"));
        assert_eq!(cfg.registry().len(), 5);
        assert_eq!(cfg.max_message_chars, TELEGRAM_MAX_CHARS);
    }

    fn digest_job(window: WindowConfig, max_items: Option<usize>) -> JobConfig {
        JobConfig {
            name: "j".into(),
            cadence: CadenceConfig::IntervalMinutes(60),
            action: ActionConfig::Digest {
                window,
                max_items,
                include_quote: false,
                send_when_empty: false,
                headline: None,
            },
        }
    }

    #[test]
    fn rejects_empty_digests_and_unbounded_windows() {
        let with_job = |job| AppConfig {
            jobs: vec![job],
            ..AppConfig::default()
        };

        with_job(digest_job(WindowConfig::RollingDays(7), Some(5)))
            .validate()
            .unwrap();
        assert!(with_job(digest_job(WindowConfig::RollingDays(7), Some(0)))
            .validate()
            .is_err());
        assert!(with_job(digest_job(WindowConfig::RollingHours(0), None))
            .validate()
            .is_err());
        assert!(with_job(digest_job(WindowConfig::SameDayOrWithinHours(-3), None))
            .validate()
            .is_err());
        assert!(with_job(digest_job(WindowConfig::RollingDays(i64::MAX), None))
            .validate()
            .is_err());

        let zero_default = AppConfig {
            max_items: 0,
            jobs: default_jobs(),
            ..AppConfig::default()
        };
        assert!(zero_default.validate().is_err());

        let huge_message = AppConfig {
            max_message_chars: 10_000,
            jobs: default_jobs(),
            ..AppConfig::default()
        };
        assert!(huge_message.validate().is_err());
    }
}
