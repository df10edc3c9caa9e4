use crate::bypass::BypassStore;
use crate::ledger::TimeLedger;
use crate::pomodoro::PomodoroState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BlockMode {
    Block,
    Friction,
    TimeLimit,
}

/// A single site rule. `pattern` is a bare domain (`reddit.com`) or a
/// domain with a path prefix (`youtube.com/shorts`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SiteRule {
    pub id: String,
    pub pattern: String,
    pub mode: BlockMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_limit_minutes: Option<u32>,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
}

impl SiteRule {
    pub fn new(id: &str, pattern: &str, mode: BlockMode) -> Self {
        Self {
            id: id.to_string(),
            pattern: pattern.to_string(),
            mode,
            daily_limit_minutes: None,
            enabled: true,
            hidden: None,
        }
    }

    pub fn time_limit(id: &str, pattern: &str, minutes: u32) -> Self {
        Self {
            daily_limit_minutes: Some(minutes),
            ..Self::new(id, pattern, BlockMode::TimeLimit)
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SiteCategory {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub sites: Vec<SiteRule>,
    #[serde(default)]
    pub is_custom: bool,
}

/// A recurring weekly window. `days` holds weekdays 0 (Sunday) to 6 (Saturday),
/// times are local wall-clock `HH:MM`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub days: BTreeSet<u8>,
    pub start_time: String,
    pub end_time: String,
    pub enabled: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveBypass {
    pub domain: String,
    /// Epoch milliseconds.
    pub expires_at: i64,
}

/// Everything the background process persists besides settings.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    #[serde(default)]
    pub time_stats: TimeLedger,
    #[serde(default)]
    pub pomodoro_state: PomodoroState,
    #[serde(default)]
    pub active_bypasses: BypassStore,
    /// Day-key of the last daily reset applied to the pomodoro counters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reset_day: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_mode_wire_names() {
        assert_eq!(
            serde_json::to_string(&BlockMode::TimeLimit).unwrap(),
            "\"time-limit\""
        );
        let mode: BlockMode = serde_json::from_str("\"friction\"").unwrap();
        assert_eq!(mode, BlockMode::Friction);
    }

    #[test]
    fn test_site_rule_omits_absent_limit() {
        let rule = SiteRule::new("x", "x.com", BlockMode::Block);
        let json = serde_json::to_value(&rule).unwrap();
        assert!(json.get("dailyLimitMinutes").is_none());

        let limited = SiteRule::time_limit("r", "reddit.com", 30);
        let json = serde_json::to_value(&limited).unwrap();
        assert_eq!(json["dailyLimitMinutes"], 30);
    }

    #[test]
    fn test_database_tolerates_missing_keys() {
        let db: Database = serde_json::from_str("{}").unwrap();
        assert!(db.active_bypasses.is_empty());
        assert!(db.last_reset_day.is_none());
    }
}
