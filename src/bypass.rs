use crate::models::ActiveBypass;
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

/// Temporary per-domain grants. Entries with `expires_at <= now` count as absent;
/// [`BypassStore::list_active`] also drops them so the persisted list stays small.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(transparent)]
pub struct BypassStore {
    entries: Vec<ActiveBypass>,
}

impl BypassStore {
    /// Replaces any earlier grant for the same domain.
    pub fn grant<Tz: TimeZone>(&mut self, domain: &str, duration_minutes: u32, now: &DateTime<Tz>) -> i64 {
        let expires_at = now.timestamp_millis() + i64::from(duration_minutes) * 60 * 1000;
        self.entries.retain(|b| b.domain != domain);
        self.entries.push(ActiveBypass {
            domain: domain.to_string(),
            expires_at,
        });
        expires_at
    }

    pub fn is_active<Tz: TimeZone>(&self, domain: &str, now: &DateTime<Tz>) -> bool {
        let now_ms = now.timestamp_millis();
        self.entries
            .iter()
            .any(|b| b.domain == domain && b.expires_at > now_ms)
    }

    pub fn list_active<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Vec<ActiveBypass> {
        self.sweep(now);
        self.entries.clone()
    }

    /// Drops expired entries, returning how many were removed.
    pub fn sweep<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> usize {
        let now_ms = now.timestamp_millis();
        let before = self.entries.len();
        self.entries.retain(|b| b.expires_at > now_ms);
        before - self.entries.len()
    }

    pub fn clear(&mut self, domain: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|b| b.domain != domain);
        before != self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Raw entries, expired ones included.
    pub fn iter(&self) -> impl Iterator<Item = &ActiveBypass> {
        self.entries.iter()
    }
}
