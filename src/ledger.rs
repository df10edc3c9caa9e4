//! Per-day, per-domain active viewing time.
//!
//! Buckets are keyed by the local calendar day (`YYYY-MM-DD`). There is no
//! reset operation: a new day simply starts with an empty bucket, and buckets
//! older than [`RETENTION_DAYS`] are dropped whenever something is recorded.

use chrono::{DateTime, Duration, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const RETENTION_DAYS: i64 = 30;

pub type DailyTimeStats = BTreeMap<String, u64>;

pub fn day_key<Tz: TimeZone>(now: &DateTime<Tz>) -> String {
    now.date_naive().format("%Y-%m-%d").to_string()
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(transparent)]
pub struct TimeLedger {
    days: BTreeMap<String, DailyTimeStats>,
}

impl TimeLedger {
    pub fn record_seconds<Tz: TimeZone>(&mut self, domain: &str, seconds: u64, now: &DateTime<Tz>) {
        let today = day_key(now);
        let entry = self
            .days
            .entry(today)
            .or_default()
            .entry(domain.to_string())
            .or_insert(0);
        *entry = entry.saturating_add(seconds);

        self.purge(now);
    }

    pub fn today_seconds<Tz: TimeZone>(&self, domain: &str, now: &DateTime<Tz>) -> u64 {
        self.days
            .get(&day_key(now))
            .and_then(|stats| stats.get(domain))
            .copied()
            .unwrap_or(0)
    }

    pub fn today<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DailyTimeStats {
        self.days.get(&day_key(now)).cloned().unwrap_or_default()
    }

    /// Buckets with a parseable day-key, oldest first.
    pub fn days(&self) -> impl Iterator<Item = (NaiveDate, &DailyTimeStats)> {
        self.days.iter().filter_map(|(key, stats)| {
            NaiveDate::parse_from_str(key, "%Y-%m-%d")
                .ok()
                .map(|date| (date, stats))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    fn purge<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) {
        let cutoff = day_key(&(now.clone() - Duration::days(RETENTION_DAYS)));
        self.days.retain(|key, _| key.as_str() >= cutoff.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_day_key_format() {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 23, 59, 59).unwrap();
        assert_eq!(day_key(&now), "2024-03-07");
    }

    #[test]
    fn test_record_accumulates() {
        let mut ledger = TimeLedger::default();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();

        let mut previous = 0;
        for _ in 0..10 {
            ledger.record_seconds("reddit.com", 5, &now);
            let total = ledger.today_seconds("reddit.com", &now);
            assert!(total > previous);
            previous = total;
        }

        assert_eq!(ledger.today_seconds("reddit.com", &now), 50);
        assert_eq!(ledger.today_seconds("x.com", &now), 0);
    }

    #[test]
    fn test_new_day_starts_empty() {
        let mut ledger = TimeLedger::default();
        let monday = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 0).unwrap();
        let tuesday = Utc.with_ymd_and_hms(2024, 1, 2, 0, 1, 0).unwrap();

        ledger.record_seconds("reddit.com", 600, &monday);
        assert_eq!(ledger.today_seconds("reddit.com", &tuesday), 0);
        assert_eq!(ledger.today_seconds("reddit.com", &monday), 600);
    }

    #[test]
    fn test_purge_keeps_thirty_days() {
        let mut ledger = TimeLedger::default();
        let day_one = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        for offset in 0..31 {
            ledger.record_seconds("a.com", 5, &(day_one + Duration::days(offset)));
        }
        assert!(ledger.days.contains_key("2024-01-01"));

        ledger.record_seconds("a.com", 5, &(day_one + Duration::days(31)));
        assert!(!ledger.days.contains_key("2024-01-01"));
        for offset in 1..31 {
            let key = day_key(&(day_one + Duration::days(offset)));
            assert!(ledger.days.contains_key(&key), "missing {}", key);
        }
    }

    #[test]
    fn test_serialises_as_plain_map() {
        let mut ledger = TimeLedger::default();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        ledger.record_seconds("a.com", 5, &now);

        let json = serde_json::to_value(&ledger).unwrap();
        assert_eq!(json["2024-01-01"]["a.com"], 5);
    }
}
