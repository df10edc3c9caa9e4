//! The blocking decision.
//!
//! Checks run in a fixed order and stop at the first that settles the answer:
//! global switch, schedule gate, rule match, bypass, pomodoro break, rule mode.
//! Anything unexpected resolves to [`Decision::Allow`].

use crate::bypass::BypassStore;
use crate::config::Settings;
use crate::ledger::TimeLedger;
use crate::matcher::{extract_domain, find_matching_rule};
use crate::models::BlockMode;
use crate::pomodoro::PomodoroState;
use crate::schedule::blocking_eligible;
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};

pub const DAILY_LIMIT_REASON: &str = "daily limit reached";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Allowed, but a daily budget is running down.
    AllowWithRemaining(u64),
    Blocked { mode: BlockMode, reason: String },
    FrictionRequired { reason: String },
}

pub fn decide<Tz: TimeZone>(
    url: &str,
    now: &DateTime<Tz>,
    settings: &Settings,
    ledger: &TimeLedger,
    bypasses: &BypassStore,
    pomodoro: &PomodoroState,
) -> Decision {
    if !settings.enabled {
        return Decision::Allow;
    }

    if !blocking_eligible(&settings.schedules, now) {
        return Decision::Allow;
    }

    let domain = extract_domain(url);
    let Some(rule) = find_matching_rule(url, &settings.site_categories) else {
        return Decision::Allow;
    };

    if bypasses.is_active(&domain, now) {
        return Decision::Allow;
    }

    if pomodoro.phase.is_break() {
        return Decision::Allow;
    }

    match rule.mode {
        BlockMode::Block => Decision::Blocked {
            mode: BlockMode::Block,
            reason: format!("{} is blocked", rule.pattern),
        },
        BlockMode::Friction => Decision::FrictionRequired {
            reason: format!("{} is blocked", rule.pattern),
        },
        BlockMode::TimeLimit => {
            let Some(minutes) = rule.daily_limit_minutes else {
                log::warn!("Time-limit rule '{}' has no limit, allowing", rule.id);
                return Decision::Allow;
            };
            let spent = ledger.today_seconds(&domain, now);
            let limit = u64::from(minutes) * 60;
            if spent < limit {
                Decision::AllowWithRemaining(limit - spent)
            } else {
                Decision::Blocked {
                    mode: BlockMode::TimeLimit,
                    reason: DAILY_LIMIT_REASON.to_string(),
                }
            }
        }
    }
}

/// Wire form of a decision, as answered to `CHECK_BLOCKED`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CheckBlockedResponse {
    pub is_blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<BlockMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_time: Option<u64>,
}

impl From<Decision> for CheckBlockedResponse {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Allow => Self::default(),
            Decision::AllowWithRemaining(seconds) => Self {
                remaining_time: Some(seconds),
                ..Self::default()
            },
            Decision::Blocked { mode, reason } => Self {
                is_blocked: true,
                mode: Some(mode),
                reason: Some(reason),
                remaining_time: None,
            },
            Decision::FrictionRequired { reason } => Self {
                is_blocked: true,
                mode: Some(BlockMode::Friction),
                reason: Some(reason),
                remaining_time: None,
            },
        }
    }
}
