// tests/pipeline_e2e.rs
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, FixedOffset, TimeZone};
use keyword_news_bot::format::{message_len, DigestStyle, Formatter};
use keyword_news_bot::ingest::providers::rss::RssProvider;
use keyword_news_bot::ingest::recency::RecencyWindow;
use keyword_news_bot::ingest::strategy::Strategy;
use keyword_news_bot::ingest::types::{Source, SourceProvider};
use keyword_news_bot::notify::{Notifier, NotifierMux};
use keyword_news_bot::scheduler::{Cadence, DigestJob, Job, JobAction, Scheduler};
use keyword_news_bot::seen::{FileSeenStore, SeenStore};
use keyword_news_bot::Pipeline;
use parking_lot::Mutex;

fn now() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(7 * 3600)
        .unwrap()
        .with_ymd_and_hms(2025, 10, 13, 12, 0, 0)
        .unwrap()
}

fn fixture(name: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{name}")).expect("fixture")
}

fn providers() -> Vec<Box<dyn SourceProvider>> {
    vec![
        Box::new(RssProvider::from_fixture(
            Source::new("Google News", "fixture://gn").with_strategy(Strategy::GoogleNews),
            &fixture("google_news.xml"),
        )),
        Box::new(
            RssProvider::from_fixture(
                Source::new("Facebook", "fixture://fb")
                    .with_strategy(Strategy::Social)
                    .matching_keyword(true),
                &fixture("rsshub_social.xml"),
            )
            .with_keyword("Miza"),
        ),
        Box::new(RssProvider::from_fixture(
            Source::new("YouTube", "fixture://yt").with_strategy(Strategy::Social),
            &fixture("youtube_atom.xml"),
        )),
    ]
}

#[derive(Clone, Default)]
struct Inbox(Arc<Mutex<Vec<String>>>);

#[async_trait::async_trait]
impl Notifier for Inbox {
    async fn send(&self, text: &str) -> Result<()> {
        self.0.lock().push(text.to_string());
        Ok(())
    }
    fn name(&self) -> &str {
        "inbox"
    }
}

struct Down;

#[async_trait::async_trait]
impl Notifier for Down {
    async fn send(&self, _text: &str) -> Result<()> {
        anyhow::bail!("gateway timeout")
    }
    fn name(&self) -> &str {
        "down"
    }
}

fn check_job() -> DigestJob {
    DigestJob {
        window: RecencyWindow::same_day_or_hours(24),
        max_items: 10,
        include_quote: false,
        send_when_empty: false,
        headline: None,
    }
}

fn pipeline(seen: FileSeenStore, notifiers: Vec<Box<dyn Notifier>>) -> Pipeline {
    pipeline_with(Formatter::new(DigestStyle::for_keyword("Miza")), seen, notifiers)
}

fn pipeline_with(
    formatter: Formatter,
    seen: FileSeenStore,
    notifiers: Vec<Box<dyn Notifier>>,
) -> Pipeline {
    Pipeline::new(providers(), Box::new(seen), formatter, NotifierMux::new(notifiers))
}

#[tokio::test]
async fn fixture_cycle_sends_once_then_stays_quiet() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seen.txt");
    let inbox = Inbox::default();

    let mut p = pipeline(
        FileSeenStore::open(&path).unwrap(),
        vec![Box::new(Down), Box::new(inbox.clone())],
    );
    let report = p.run_digest(&check_job(), now()).await.unwrap();

    assert_eq!(report.selection.fetched, 8);
    assert_eq!(report.selection.empty_identifier, 1);
    assert_eq!(report.selection.stale, 2);
    assert_eq!(report.selection.duplicate_in_batch, 1);
    assert_eq!(report.rendered, 4);
    assert_eq!(report.marked, 4);

    {
        let sent = inbox.0.lock();
        assert_eq!(sent.len(), 1);
        let text = &sent[0];
        // newest first: 11:00, 10:00, 09:00, 08:30
        let order = [
            "1. 📰 <b>Giấy Miza mở rộng nhà máy tại Bắc Ninh</b> - Tuổi Trẻ",
            "2. 📰 <b>Miza tuyển dụng kỹ sư vận hành 2025</b> - Miza Official",
            "3. 📰 <b>Miza công bố kết quả kinh doanh quý 3</b> - VnExpress",
            "4. 📰 <b>Tham quan nhà máy giấy Miza</b> - Miza Channel",
        ];
        for line in order {
            assert!(text.contains(line), "missing {line:?} in\n{text}");
        }
        assert!(text.contains("🔗 https://www.youtube.com/watch?v=miza001&amp;feature=rss"));
    }

    // restart: a fresh pipeline over the same file finds nothing new
    let mut p = pipeline(
        FileSeenStore::open(&path).unwrap(),
        vec![Box::new(inbox.clone())],
    );
    let report = p.run_digest(&check_job(), now()).await.unwrap();
    assert_eq!(report.selection.kept, 0);
    assert_eq!(report.selection.already_seen, 4);
    assert!(report.dispatch.is_none());
    assert_eq!(inbox.0.lock().len(), 1);
}

#[tokio::test]
async fn all_destinations_down_means_retry_next_cadence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seen.txt");

    let mut p = pipeline(FileSeenStore::open(&path).unwrap(), vec![Box::new(Down)]);
    let report = p.run_digest(&check_job(), now()).await.unwrap();
    assert_eq!(report.rendered, 4);
    assert_eq!(report.marked, 0);
    assert!(p.seen().is_empty());

    let inbox = Inbox::default();
    let mut p = pipeline(
        FileSeenStore::open(&path).unwrap(),
        vec![Box::new(inbox.clone())],
    );
    let report = p.run_digest(&check_job(), now()).await.unwrap();
    assert_eq!(report.marked, 4);
    assert_eq!(inbox.0.lock().len(), 1);
}

#[tokio::test]
async fn scheduler_drives_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let inbox = Inbox::default();
    let mut p = pipeline(
        FileSeenStore::open(dir.path().join("seen.txt")).unwrap(),
        vec![Box::new(inbox.clone())],
    );

    let mut weekly = check_job();
    weekly.window = RecencyWindow::rolling_days(7);
    weekly.send_when_empty = true;
    weekly.headline = Some("Weekly summary".into());

    let mut s = Scheduler::new(
        vec![
            Job::new(
                "hourly-check",
                Cadence::Interval(std::time::Duration::from_secs(3600)),
                JobAction::Digest(check_job()),
            ),
            Job::new(
                "weekly-summary",
                Cadence::Interval(std::time::Duration::from_secs(7 * 24 * 3600)),
                JobAction::Digest(weekly),
            ),
        ],
        std::time::Duration::from_secs(60),
    );

    // startup: the periodic check runs before the loop
    assert!(s.run_now("hourly-check", now(), &mut p).await.unwrap());
    assert_eq!(inbox.0.lock().len(), 1);

    // the weekly digest only picks up what the check did not report
    assert!(s.run_now("weekly-summary", now(), &mut p).await.unwrap());
    let sent = inbox.0.lock();
    assert_eq!(sent.len(), 2);
    assert!(sent[1].starts_with("📢 <b>Weekly summary (12:00 13/10)</b>"));
    assert!(sent[1].contains("Cổ phiếu MZG tăng trần phiên cuối tuần"));
    assert!(sent[1].contains("Miza year in review"));
    assert!(!sent[1].contains("Tham quan nhà máy giấy Miza"));
}

#[tokio::test]
async fn oversized_digest_sends_what_fits_and_defers_the_rest() {
    const LIMIT: usize = 400;
    let dir = tempfile::tempdir().unwrap();
    let inbox = Inbox::default();
    let formatter = || Formatter::new(DigestStyle::for_keyword("Miza")).with_max_chars(LIMIT);
    let path = dir.path().join("seen.txt");

    let mut p = pipeline_with(
        formatter(),
        FileSeenStore::open(&path).unwrap(),
        vec![Box::new(inbox.clone())],
    );
    let first = p.run_digest(&check_job(), now()).await.unwrap();
    assert_eq!(first.selection.kept, 4);
    assert!(first.rendered >= 1 && first.rendered < 4, "{first:?}");
    assert_eq!(first.marked, first.rendered);
    assert_eq!(p.seen().len(), first.rendered);

    // later runs pick up the deferred items until everything went out
    let mut total = first.marked;
    for _ in 0..4 {
        if total == 4 {
            break;
        }
        let report = p.run_digest(&check_job(), now()).await.unwrap();
        assert!(report.marked >= 1);
        total += report.marked;
    }
    assert_eq!(total, 4);

    let sent = inbox.0.lock();
    assert!(sent.len() >= 2);
    for text in sent.iter() {
        assert!(message_len(text) <= LIMIT, "{} > {LIMIT}", message_len(text));
    }
}
