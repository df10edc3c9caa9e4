use crate::config::{Settings, SettingsStore};
use crate::engine::{decide, CheckBlockedResponse};
use crate::ledger::day_key;
use crate::models::ActiveBypass;
use crate::pomodoro::{PhaseChange, PomodoroAction, PomodoroPhase, PomodoroState};
use crate::protocol::{Message, Response, Transport};
use crate::storage::Storage;
use anyhow::Result;
use chrono::{DateTime, Duration, Local};
use std::path::Path;

pub const SWEEP_INTERVAL_SECS: i64 = 60;

/// What a tick did, for the caller to surface.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    pub phase_change: Option<PhaseChange>,
    pub daily_reset: bool,
    pub swept: usize,
}

/// The single authority over settings and persisted state for one process.
/// Browsing contexts reach it only through [`Message`]s.
pub struct Background {
    storage: Storage,
    settings: SettingsStore,
    last_tick: Option<DateTime<Local>>,
    last_sweep: Option<DateTime<Local>>,
}

impl Background {
    pub fn open(base_dir: &Path) -> Result<Self> {
        Ok(Self {
            storage: Storage::open(base_dir),
            settings: SettingsStore::open(base_dir)?,
            last_tick: None,
            last_sweep: None,
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn settings(&mut self) -> &Settings {
        self.settings.current()
    }

    pub fn handle(&mut self, message: Message) -> Response {
        self.handle_at(message, Local::now())
    }

    pub fn handle_at(&mut self, message: Message, now: DateTime<Local>) -> Response {
        match self.dispatch(message, now) {
            Ok(response) => response,
            Err(err) => {
                log::error!("Message handler error: {:#}", err);
                Response::error(format!("{:#}", err))
            }
        }
    }

    /// Parses and handles a raw JSON message, answering with JSON.
    pub fn handle_json(&mut self, data: &str) -> String {
        let response = match Message::from_json(data) {
            Ok(message) => self.handle(message),
            Err(err) => {
                log::warn!("Rejected message: {}", err);
                Response::error(err)
            }
        };
        serde_json::to_string(&response).unwrap_or_else(|_| r#"{"error":"serialization"}"#.to_string())
    }

    fn dispatch(&mut self, message: Message, now: DateTime<Local>) -> Result<Response> {
        let response = match message {
            Message::CheckBlocked(url) => Response::CheckBlocked(self.check_blocked(&url, now)?),
            Message::Heartbeat { domain, seconds } => {
                if !domain.is_empty() && seconds > 0 {
                    self.storage
                        .update(|db| db.time_stats.record_seconds(&domain, seconds, &now))?;
                    log::debug!("Recorded {}s on {}", seconds, domain);
                }
                Response::ok()
            }
            Message::GetSettings => Response::Settings(Box::new(self.settings.current().clone())),
            Message::UpdateSettings(settings) => {
                self.settings.replace(*settings)?;
                log::info!("Settings updated");
                Response::ok()
            }
            Message::GetTimeStats => {
                Response::TimeStats(self.storage.read(|db| db.time_stats.today(&now))?)
            }
            Message::GetPomodoroState => {
                Response::Pomodoro(self.storage.read(|db| db.pomodoro_state.clone())?)
            }
            Message::PomodoroAction { action } => Response::Pomodoro(self.pomodoro_action(action)?),
            Message::RequestBypass {
                domain,
                duration_minutes,
            } => {
                self.grant_bypass(&domain, duration_minutes, now)?;
                Response::ok()
            }
            Message::FrictionCompleted { domain } => {
                let minutes = self.settings.current().friction.bypass_duration_minutes;
                self.grant_bypass(&domain, minutes, now)?;
                Response::ok()
            }
            Message::ClearBypass { domain } => {
                if self.storage.update(|db| db.active_bypasses.clear(&domain))? {
                    log::info!("Cleared bypass for {}", domain);
                }
                Response::ok()
            }
        };
        Ok(response)
    }

    fn check_blocked(&mut self, url: &str, now: DateTime<Local>) -> Result<CheckBlockedResponse> {
        let settings = self.settings.current().clone();
        let decision = self.storage.read(|db| {
            decide(
                url,
                &now,
                &settings,
                &db.time_stats,
                &db.active_bypasses,
                &db.pomodoro_state,
            )
        })?;
        log::debug!("{} -> {:?}", url, decision);
        Ok(decision.into())
    }

    fn grant_bypass(&mut self, domain: &str, minutes: u32, now: DateTime<Local>) -> Result<()> {
        let expires_at = self
            .storage
            .update(|db| db.active_bypasses.grant(domain, minutes, &now))?;
        log::info!("Bypass for {} until {}", domain, expires_at);
        Ok(())
    }

    fn pomodoro_action(&mut self, action: PomodoroAction) -> Result<PomodoroState> {
        let cfg = self.settings.current().pomodoro.clone();
        let (state, change) = self.storage.update(|db| {
            let change = db.pomodoro_state.apply(action, &cfg);
            (db.pomodoro_state.clone(), change)
        })?;
        if let Some(change) = change {
            log::info!("{}", change.message());
        }
        Ok(state)
    }

    pub fn list_bypasses(&mut self, now: DateTime<Local>) -> Result<Vec<ActiveBypass>> {
        self.storage.update(|db| db.active_bypasses.list_active(&now))
    }

    /// Periodic work: pomodoro countdown by wall-clock elapsed time, the daily
    /// reset on day-key change, and an eager bypass sweep once a minute.
    pub fn tick(&mut self, now: DateTime<Local>) -> Result<TickReport> {
        let cfg = self.settings.current().pomodoro.clone();
        let elapsed = self.take_elapsed(now);
        let sweep_due = self
            .last_sweep
            .map_or(true, |last| now - last >= Duration::seconds(SWEEP_INTERVAL_SECS));
        let today = day_key(&now);

        let report = self.storage.update(|db| {
            let mut report = TickReport::default();

            match db.last_reset_day.as_deref() {
                Some(day) if day == today => {}
                Some(_) => {
                    db.pomodoro_state.daily_reset();
                    report.daily_reset = true;
                }
                None => {}
            }
            db.last_reset_day = Some(today.clone());

            let state = &mut db.pomodoro_state;
            if state.is_running && state.phase != PomodoroPhase::Idle {
                report.phase_change = state.advance(elapsed, &cfg);
            }

            if sweep_due {
                report.swept = db.active_bypasses.sweep(&now);
            }
            report
        })?;

        if sweep_due {
            self.last_sweep = Some(now);
        }
        if report.daily_reset {
            log::info!("New day {}, pomodoro count reset", today);
        }
        if let Some(change) = report.phase_change {
            log::info!("{}", change.message());
        }
        if report.swept > 0 {
            log::debug!("Swept {} expired bypasses", report.swept);
        }
        Ok(report)
    }

    /// Whole seconds since the previous tick. The fractional remainder carries
    /// over so slow or coalesced ticks add up to wall-clock time.
    fn take_elapsed(&mut self, now: DateTime<Local>) -> u64 {
        let Some(last) = self.last_tick else {
            self.last_tick = Some(now);
            return 0;
        };
        let seconds = (now - last).num_seconds();
        if seconds <= 0 {
            if seconds < 0 {
                // clock went backwards
                self.last_tick = Some(now);
            }
            return 0;
        }
        self.last_tick = Some(last + Duration::seconds(seconds));
        seconds as u64
    }
}

impl Transport for Background {
    fn send(&mut self, message: Message) -> Option<Response> {
        Some(self.handle(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_settings, save_settings, settings_path};
    use crate::models::BlockMode;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 3, h, m, s).unwrap()
    }

    fn check(bg: &mut Background, url: &str, now: DateTime<Local>) -> CheckBlockedResponse {
        match bg.handle_at(Message::CheckBlocked(url.to_string()), now) {
            Response::CheckBlocked(r) => r,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_friction_then_bypass() -> Result<()> {
        let dir = tempdir()?;
        let mut bg = Background::open(dir.path())?;
        let now = at(12, 0, 0);

        let first = check(&mut bg, "https://x.com/home", now);
        assert!(first.is_blocked);
        assert_eq!(first.mode, Some(BlockMode::Friction));

        bg.handle_at(
            Message::FrictionCompleted {
                domain: "x.com".to_string(),
            },
            now,
        );
        assert!(!check(&mut bg, "https://x.com/home", now).is_blocked);
        // default bypass lasts 15 minutes
        assert!(check(&mut bg, "https://x.com/home", now + Duration::minutes(16)).is_blocked);

        bg.handle_at(
            Message::RequestBypass {
                domain: "x.com".to_string(),
                duration_minutes: 60,
            },
            now,
        );
        bg.handle_at(
            Message::ClearBypass {
                domain: "x.com".to_string(),
            },
            now,
        );
        assert!(check(&mut bg, "https://x.com/home", now).is_blocked);
        Ok(())
    }

    #[test]
    fn test_heartbeats_drive_time_limit() -> Result<()> {
        let dir = tempdir()?;
        let path = settings_path(dir.path());
        let mut settings = load_settings(&path)?;
        settings.site_categories[0].sites[5].enabled = true;
        settings.site_categories[0].sites[5].daily_limit_minutes = Some(1);
        save_settings(&path, &settings)?;

        let mut bg = Background::open(dir.path())?;
        let now = at(12, 0, 0);
        for _ in 0..11 {
            bg.handle_at(
                Message::Heartbeat {
                    domain: "reddit.com".to_string(),
                    seconds: 5,
                },
                now,
            );
        }
        assert_eq!(check(&mut bg, "https://reddit.com/", now).remaining_time, Some(5));

        bg.handle_at(
            Message::Heartbeat {
                domain: "reddit.com".to_string(),
                seconds: 5,
            },
            now,
        );
        let response = check(&mut bg, "https://reddit.com/", now);
        assert!(response.is_blocked);
        assert_eq!(response.mode, Some(BlockMode::TimeLimit));
        Ok(())
    }

    #[test]
    fn test_tick_uses_elapsed_time() -> Result<()> {
        let dir = tempdir()?;
        let mut bg = Background::open(dir.path())?;
        bg.handle(Message::PomodoroAction {
            action: PomodoroAction::Start,
        });

        bg.tick(at(12, 0, 0))?;
        bg.tick(at(12, 0, 1))?;
        // a coalesced tick four seconds later
        bg.tick(at(12, 0, 5))?;

        let state = bg.storage().load()?.pomodoro_state;
        assert_eq!(state.time_remaining_seconds, 25 * 60 - 5);
        Ok(())
    }

    #[test]
    fn test_paused_time_is_not_counted() -> Result<()> {
        let dir = tempdir()?;
        let mut bg = Background::open(dir.path())?;
        bg.handle(Message::PomodoroAction {
            action: PomodoroAction::Start,
        });
        bg.tick(at(12, 0, 0))?;
        bg.handle(Message::PomodoroAction {
            action: PomodoroAction::Pause,
        });
        bg.tick(at(12, 5, 0))?;
        bg.handle(Message::PomodoroAction {
            action: PomodoroAction::Start,
        });
        bg.tick(at(12, 5, 2))?;

        let state = bg.storage().load()?.pomodoro_state;
        assert_eq!(state.time_remaining_seconds, 25 * 60 - 2);
        Ok(())
    }

    #[test]
    fn test_work_completion_on_tick() -> Result<()> {
        let dir = tempdir()?;
        let mut bg = Background::open(dir.path())?;
        bg.handle(Message::PomodoroAction {
            action: PomodoroAction::Start,
        });
        bg.tick(at(12, 0, 0))?;
        let report = bg.tick(at(12, 25, 0))?;

        assert_eq!(
            report.phase_change,
            Some(PhaseChange::WorkCompleted {
                next: PomodoroPhase::ShortBreak
            })
        );
        let state = bg.storage().load()?.pomodoro_state;
        assert_eq!(state.today_pomodoros, 1);
        // breaks suspend blocking
        assert!(!check(&mut bg, "https://tiktok.com", at(12, 25, 0)).is_blocked);
        Ok(())
    }

    #[test]
    fn test_daily_reset_on_day_change() -> Result<()> {
        let dir = tempdir()?;
        let mut bg = Background::open(dir.path())?;
        bg.handle(Message::PomodoroAction {
            action: PomodoroAction::Skip,
        });
        bg.handle(Message::PomodoroAction {
            action: PomodoroAction::Skip,
        });
        bg.handle(Message::PomodoroAction {
            action: PomodoroAction::Skip,
        });

        assert!(!bg.tick(at(23, 59, 0))?.daily_reset);
        assert_eq!(bg.storage().load()?.pomodoro_state.today_pomodoros, 1);

        let tomorrow = Local.with_ymd_and_hms(2024, 1, 4, 0, 0, 30).unwrap();
        assert!(bg.tick(tomorrow)?.daily_reset);
        let state = bg.storage().load()?.pomodoro_state;
        assert_eq!(state.today_pomodoros, 0);
        assert_eq!(state.sessions_completed, 1);
        Ok(())
    }

    #[test]
    fn test_handle_json_errors_are_replies() -> Result<()> {
        let dir = tempdir()?;
        let mut bg = Background::open(dir.path())?;

        let reply = bg.handle_json(r#"{"type":"OPEN_OPTIONS"}"#);
        assert_eq!(reply, r#"{"error":"Unknown message type"}"#);

        let reply = bg.handle_json(r#"{"type":"HEARTBEAT","payload":{"domain":"a.com","seconds":5}}"#);
        assert_eq!(reply, r#"{"success":true}"#);
        Ok(())
    }

    #[test]
    fn test_invalid_settings_update_rejected() -> Result<()> {
        let dir = tempdir()?;
        let mut bg = Background::open(dir.path())?;
        let mut settings = Settings::default();
        settings.site_categories[0].sites[0].pattern = String::new();

        let response = bg.handle(Message::UpdateSettings(Box::new(settings)));
        assert!(matches!(response, Response::Error { .. }));
        Ok(())
    }
}
