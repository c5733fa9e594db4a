// tests/seen_store.rs
use std::fs;

use chrono::{DateTime, Duration, FixedOffset, TimeZone};
use keyword_news_bot::ingest::recency::RecencyWindow;
use keyword_news_bot::ingest::select_new;
use keyword_news_bot::ingest::types::Item;
use keyword_news_bot::seen::{FileSeenStore, SeenStore};

fn now() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(7 * 3600)
        .unwrap()
        .with_ymd_and_hms(2025, 10, 13, 12, 0, 0)
        .unwrap()
}

fn batch() -> Vec<Item> {
    ["https://n/1", "https://n/2", "https://n/3"]
        .iter()
        .enumerate()
        .map(|(i, id)| Item {
            identifier: id.to_string(),
            title: format!("news {i}"),
            source_name: "Google News".into(),
            publisher: None,
            published_at: now() - Duration::hours(i as i64),
        })
        .collect()
}

#[test]
fn missing_file_is_an_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("state").join("seen.txt");
    let s = FileSeenStore::open(&p).unwrap();
    assert!(s.is_empty());
    // parent directory is prepared, the file is not
    assert!(p.parent().unwrap().is_dir());
    assert!(!p.exists());
}

#[test]
fn second_run_over_unchanged_sources_yields_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("seen.txt");
    let window = RecencyWindow::same_day_or_hours(24);

    {
        let mut store = FileSeenStore::open(&p).unwrap();
        let (kept, _) = select_new(now(), batch(), window, &store);
        assert_eq!(kept.len(), 3);
        for it in &kept {
            assert!(store.add(&it.identifier).unwrap());
        }
    }

    // fresh process
    let store = FileSeenStore::open(&p).unwrap();
    assert_eq!(store.len(), 3);
    let (kept, stats) = select_new(now(), batch(), window, &store);
    assert!(kept.is_empty());
    assert_eq!(stats.already_seen, 3);
}

#[test]
fn records_are_newline_delimited_and_append_only() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("seen.txt");
    let mut s = FileSeenStore::open(&p).unwrap();

    assert!(s.add("https://a").unwrap());
    assert!(s.add("https://b").unwrap());
    assert!(!s.add("https://a").unwrap());
    assert_eq!(fs::read_to_string(&p).unwrap(), "https://a\nhttps://b\n");

    assert!(s.add("").is_err());
    assert!(s.add("https://x\nhttps://y").is_err());
    assert_eq!(fs::read_to_string(&p).unwrap(), "https://a\nhttps://b\n");
}

#[test]
fn reload_picks_up_external_appends() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("seen.txt");
    let mut s = FileSeenStore::open(&p).unwrap();
    s.add("https://a").unwrap();

    let mut other = FileSeenStore::open(&p).unwrap();
    other.add("https://b").unwrap();

    assert!(!s.contains("https://b"));
    s.reload().unwrap();
    assert!(s.contains("https://b"));
    assert_eq!(s.len(), 2);
}
