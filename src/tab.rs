//! Caller-side logic for one browsing context.
//!
//! A `TabSession` asks the background whether its page is blocked on load,
//! reports visible time through heartbeats, keeps a local countdown for
//! time-limited sites, runs the friction challenge, and clears a limited
//! bypass when the user navigates away. Every round-trip can go unanswered;
//! an unanswered check means "not blocked".

use crate::config::{FrictionSettings, DEFAULT_DELAY_SECONDS, DEFAULT_PHRASE};
use crate::engine::{CheckBlockedResponse, DAILY_LIMIT_REASON};
use crate::error::FrictionError;
use crate::matcher::extract_domain;
use crate::models::BlockMode;
use crate::protocol::{Message, Response, Transport};
use chrono::{DateTime, Duration, Local};

pub const HEARTBEAT_INTERVAL_SECS: u64 = 5;
pub const RESYNC_INTERVAL_SECS: i64 = 30;
pub const WARNING_THRESHOLD_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct FrictionChallenge {
    pub started_at: DateTime<Local>,
    pub delay_seconds: u64,
    pub phrase: Option<String>,
}

impl FrictionChallenge {
    /// Falls back to the default delay and phrase for anything missing.
    pub fn new(settings: Option<&FrictionSettings>, now: DateTime<Local>) -> Self {
        let delay_seconds = settings
            .map(|f| f.delay_seconds)
            .filter(|&d| d > 0)
            .unwrap_or(DEFAULT_DELAY_SECONDS);
        let require_phrase = settings.map_or(true, |f| f.require_phrase);
        let phrase = settings
            .map(|f| f.phrase.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_PHRASE.to_string());

        Self {
            started_at: now,
            delay_seconds,
            phrase: require_phrase.then_some(phrase),
        }
    }

    pub fn seconds_left(&self, now: DateTime<Local>) -> u64 {
        let waited = (now - self.started_at).num_seconds().max(0) as u64;
        self.delay_seconds.saturating_sub(waited)
    }

    /// 0.0 .. 1.0 through the delay.
    pub fn progress(&self, now: DateTime<Local>) -> f64 {
        let left = self.seconds_left(now) as f64;
        1.0 - left / self.delay_seconds as f64
    }

    pub fn check(&self, now: DateTime<Local>, typed: &str) -> Result<(), FrictionError> {
        let left = self.seconds_left(now);
        if left > 0 {
            return Err(FrictionError::StillWaiting(left));
        }
        match &self.phrase {
            Some(phrase) if typed.to_lowercase() != phrase.to_lowercase() => {
                Err(FrictionError::PhraseMismatch)
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Loading,
    Free,
    Blocked { reason: String },
    Friction(FrictionChallenge),
    Countdown { remaining: u64 },
}

impl View {
    pub fn is_warning(&self) -> bool {
        matches!(self, View::Countdown { remaining } if *remaining < WARNING_THRESHOLD_SECS)
    }
}

/// How the page went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unload {
    /// Real navigation or tab close.
    Navigate,
    /// Hidden into the back/forward cache; the page may come back.
    PageHide,
}

pub struct TabSession<T: Transport> {
    transport: T,
    url: String,
    domain: String,
    view: View,
    last_sync: Option<DateTime<Local>>,
    /// Set once this tab got through by completing friction.
    bypassed: bool,
}

impl<T: Transport> TabSession<T> {
    pub fn new(transport: T, url: &str) -> Self {
        Self {
            transport,
            url: url.to_string(),
            domain: extract_domain(url),
            view: View::Loading,
            last_sync: None,
            bypassed: false,
        }
    }

    pub fn view(&self) -> &View {
        &self.view
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn load(&mut self, now: DateTime<Local>) -> &View {
        self.view = match self.check_blocked(now) {
            None => View::Free,
            Some(response) => self.view_for(response, now),
        };
        &self.view
    }

    /// Called on every heartbeat interval by the embedding timer.
    pub fn heartbeat(&mut self, visible: bool, now: DateTime<Local>) {
        if !visible {
            return;
        }
        if !matches!(self.view, View::Free | View::Countdown { .. }) || self.domain.is_empty() {
            return;
        }

        let message = Message::Heartbeat {
            domain: self.domain.clone(),
            seconds: HEARTBEAT_INTERVAL_SECS,
        };
        if self.transport.send(message).is_none() {
            log::warn!("Heartbeat for {} went unanswered", self.domain);
        }

        if let View::Countdown { remaining } = self.view {
            self.countdown(remaining.saturating_sub(HEARTBEAT_INTERVAL_SECS), now);
        }
    }

    fn countdown(&mut self, mut remaining: u64, now: DateTime<Local>) {
        let resync_due = self
            .last_sync
            .map_or(true, |last| now - last >= Duration::seconds(RESYNC_INTERVAL_SECS));
        if resync_due {
            if let Some(response) = self.check_blocked(now) {
                if response.is_blocked && response.mode == Some(BlockMode::TimeLimit) {
                    self.view = View::Blocked {
                        reason: DAILY_LIMIT_REASON.to_string(),
                    };
                    return;
                }
                if let Some(server_remaining) = response.remaining_time {
                    remaining = server_remaining;
                }
            }
        }

        self.view = if remaining == 0 {
            View::Blocked {
                reason: DAILY_LIMIT_REASON.to_string(),
            }
        } else {
            View::Countdown { remaining }
        };
    }

    /// Finishes the friction challenge. Only success reaches the background;
    /// a failed or abandoned attempt changes nothing.
    pub fn complete_friction(&mut self, typed: &str, now: DateTime<Local>) -> Result<(), FrictionError> {
        let View::Friction(challenge) = &self.view else {
            return Err(FrictionError::NotActive);
        };
        challenge.check(now, typed)?;

        let message = Message::FrictionCompleted {
            domain: self.domain.clone(),
        };
        if self.transport.send(message).is_none() {
            log::warn!("Friction completion for {} went unanswered", self.domain);
        }
        self.bypassed = true;
        self.view = View::Free;
        Ok(())
    }

    /// Page teardown. A limited bypass ends when the tab that earned it really
    /// leaves the domain; an unlimited one rides out its timer. Tabs that never
    /// went through friction leave other tabs' bypasses alone.
    pub fn unload(&mut self, kind: Unload, next_url: Option<&str>) {
        if !self.bypassed || kind == Unload::PageHide || self.domain.is_empty() {
            return;
        }
        if next_url.is_some_and(|next| extract_domain(next) == self.domain) {
            return;
        }

        let limited = match self.transport.send(Message::GetSettings) {
            Some(Response::Settings(settings)) => settings.friction.bypass_limited,
            _ => return,
        };
        if limited {
            let message = Message::ClearBypass {
                domain: self.domain.clone(),
            };
            if self.transport.send(message).is_none() {
                log::warn!("Bypass clear for {} went unanswered", self.domain);
            }
        }
    }

    fn check_blocked(&mut self, now: DateTime<Local>) -> Option<CheckBlockedResponse> {
        self.last_sync = Some(now);
        match self.transport.send(Message::CheckBlocked(self.url.clone())) {
            Some(Response::CheckBlocked(response)) => Some(response),
            Some(other) => {
                log::warn!("Unexpected reply to CHECK_BLOCKED: {:?}", other);
                None
            }
            None => {
                log::warn!("No reply to CHECK_BLOCKED for {}, assuming not blocked", self.url);
                None
            }
        }
    }

    fn view_for(&mut self, response: CheckBlockedResponse, now: DateTime<Local>) -> View {
        if response.is_blocked {
            return match response.mode {
                Some(BlockMode::Friction) => {
                    let friction = match self.transport.send(Message::GetSettings) {
                        Some(Response::Settings(settings)) => Some(settings.friction),
                        _ => None,
                    };
                    View::Friction(FrictionChallenge::new(friction.as_ref(), now))
                }
                Some(BlockMode::TimeLimit) => View::Blocked {
                    reason: DAILY_LIMIT_REASON.to_string(),
                },
                _ => View::Blocked {
                    reason: response.reason.unwrap_or_default(),
                },
            };
        }
        match response.remaining_time {
            Some(remaining) if remaining > 0 => View::Countdown { remaining },
            _ => View::Free,
        }
    }
}
