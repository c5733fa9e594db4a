// tests/recency.rs
use chrono::{DateTime, Duration, FixedOffset, TimeZone};
use keyword_news_bot::ingest::recency::{is_within, RecencyWindow};
use keyword_news_bot::ingest::types::Item;

fn tz() -> FixedOffset {
    FixedOffset::east_opt(7 * 3600).unwrap()
}

fn item_at(published_at: DateTime<FixedOffset>) -> Item {
    Item {
        identifier: "https://x".into(),
        title: "t".into(),
        source_name: "s".into(),
        publisher: None,
        published_at,
    }
}

#[test]
fn last_24_hours_boundary() {
    let now = tz().with_ymd_and_hms(2025, 10, 13, 12, 0, 0).unwrap();
    let w = RecencyWindow::rolling_hours(24);
    assert!(is_within(&item_at(now - Duration::hours(23)), w, now));
    assert!(!is_within(&item_at(now - Duration::hours(25)), w, now));
}

#[test]
fn same_day_is_more_permissive_than_the_duration() {
    // 23:30 local; an item from 00:10 today is 23h20m old
    let now = tz().with_ymd_and_hms(2025, 10, 13, 23, 30, 0).unwrap();
    let early = tz().with_ymd_and_hms(2025, 10, 13, 0, 10, 0).unwrap();
    assert!(is_within(&item_at(early), RecencyWindow::same_day_or_hours(2), now));
    assert!(!is_within(&item_at(early), RecencyWindow::rolling_hours(2), now));

    // yesterday evening still counts through the rolling part
    let now = tz().with_ymd_and_hms(2025, 10, 13, 1, 0, 0).unwrap();
    let late = tz().with_ymd_and_hms(2025, 10, 12, 22, 0, 0).unwrap();
    assert!(is_within(&item_at(late), RecencyWindow::same_day_or_hours(6), now));
}

#[test]
fn calendar_day_is_judged_in_the_reference_timezone() {
    // 2025-10-12 18:00Z is already 2025-10-13 01:00 in +07:00
    let now = tz().with_ymd_and_hms(2025, 10, 13, 20, 0, 0).unwrap();
    let utc_stamp = FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2025, 10, 12, 18, 0, 0)
        .unwrap();
    assert!(is_within(&item_at(utc_stamp), RecencyWindow::same_day_or_hours(1), now));
}

#[test]
fn weekly_window() {
    let now = tz().with_ymd_and_hms(2025, 10, 13, 12, 0, 0).unwrap();
    let w = RecencyWindow::rolling_days(7);
    assert!(is_within(&item_at(now - Duration::days(6)), w, now));
    assert!(!is_within(&item_at(now - Duration::days(8)), w, now));
}
