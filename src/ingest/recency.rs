//! # Recency windows
//! Pure time-window checks. Every comparison is done in the offset of `now`,
//! which callers take from the configured reference timezone, so "today"
//! means the same calendar date for every source.

use chrono::{DateTime, Duration, FixedOffset};

use crate::ingest::types::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecencyWindow {
    /// Same calendar day as `now`, or younger than the duration (whichever admits more).
    SameDayOrWithin(Duration),
    /// Strictly the rolling duration.
    Rolling(Duration),
}

impl RecencyWindow {
    pub fn same_day_or_hours(hours: i64) -> Self {
        Self::SameDayOrWithin(Duration::hours(hours))
    }

    pub fn rolling_hours(hours: i64) -> Self {
        Self::Rolling(Duration::hours(hours))
    }

    pub fn rolling_days(days: i64) -> Self {
        Self::Rolling(Duration::days(days))
    }

    /// Items stamped in the future count as recent.
    pub fn admits(&self, published_at: DateTime<FixedOffset>, now: DateTime<FixedOffset>) -> bool {
        let published = published_at.with_timezone(now.offset());
        let age = now.signed_duration_since(published);
        match self {
            RecencyWindow::Rolling(d) => age <= *d,
            RecencyWindow::SameDayOrWithin(d) => {
                published.date_naive() == now.date_naive() || age <= *d
            }
        }
    }
}

pub fn is_within(item: &Item, window: RecencyWindow, now: DateTime<FixedOffset>) -> bool {
    window.admits(item.published_at, now)
}
