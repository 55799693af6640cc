//! Ordering for the vote and view listings
//!
//! An entry's rank is the start of its publish day in the reference zone
//! plus its counter in seconds, so newer days always rank first and the
//! counter only breaks ties within a day.

use chrono::{DateTime, Duration, TimeZone, Utc};
use chrono_tz::Tz;

use crate::entry::NewsEntry;

pub fn ranking_key(published_at: DateTime<Utc>, counter: i64, zone: Tz) -> DateTime<Utc> {
    let local_day = published_at.with_timezone(&zone).date_naive();
    let day_start = local_day
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| zone.from_local_datetime(&midnight).earliest())
        .map(|start| start.with_timezone(&Utc))
        .unwrap_or(published_at);

    day_start + Duration::seconds(counter)
}

pub fn rank_by_votes(entries: &mut [NewsEntry], zone: Tz) {
    entries.sort_by_key(|e| std::cmp::Reverse(ranking_key(e.published_at(), e.votes, zone)));
}

pub fn rank_by_views(entries: &mut [NewsEntry], zone: Tz) {
    entries.sort_by_key(|e| std::cmp::Reverse(ranking_key(e.published_at(), e.views, zone)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn entry(link: &str, published: DateTime<Utc>, votes: i64) -> NewsEntry {
        let mut e = NewsEntry::new(link, "title", published).unwrap();
        e.set_published_at(published, published);
        e.votes = votes;
        e
    }

    #[test]
    fn test_key_truncates_to_local_day() {
        // 23:30 UTC is already the next day in Berlin
        let published = Utc.with_ymd_and_hms(2024, 7, 14, 23, 30, 0).unwrap();
        let key = ranking_key(published, 5, chrono_tz::Europe::Berlin);
        assert_eq!(key, at(2024, 7, 14, 22) + Duration::seconds(5));
    }

    #[test]
    fn test_newer_day_wins_over_votes() {
        let mut entries = vec![
            entry("https://a.com/old", at(2024, 7, 13, 10), 50),
            entry("https://a.com/new", at(2024, 7, 14, 10), 1),
        ];
        rank_by_votes(&mut entries, chrono_tz::Europe::Berlin);
        assert_eq!(entries[0].link(), "https://a.com/new");
    }

    #[test]
    fn test_votes_break_ties_within_day() {
        let mut entries = vec![
            entry("https://a.com/early-low", at(2024, 7, 14, 6), 1),
            entry("https://a.com/late-high", at(2024, 7, 14, 18), 3),
            entry("https://a.com/mid", at(2024, 7, 14, 12), 2),
        ];
        rank_by_votes(&mut entries, chrono_tz::Europe::Berlin);
        let links: Vec<_> = entries.iter().map(|e| e.link()).collect();
        assert_eq!(
            links,
            vec![
                "https://a.com/late-high",
                "https://a.com/mid",
                "https://a.com/early-low"
            ]
        );
    }

    #[test]
    fn test_rank_by_views() {
        let mut a = entry("https://a.com/a", at(2024, 7, 14, 6), 0);
        a.views = 10;
        let mut b = entry("https://a.com/b", at(2024, 7, 14, 7), 0);
        b.views = 2;
        let mut entries = vec![b, a];
        rank_by_views(&mut entries, chrono_tz::UTC);
        assert_eq!(entries[0].link(), "https://a.com/a");
    }
}
