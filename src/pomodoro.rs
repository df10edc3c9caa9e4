//! Pomodoro phase machine.
//!
//! ```text
//! Idle --start--> Work --(time up | skip)--> ShortBreak | LongBreak --(time up | skip)--> Work
//!   ^                                                                                     |
//!   +--------------------------------------reset------------------------------------------+
//! ```
//!
//! `is_running` is orthogonal to the phase: a paused work session is still `Work`.
//! The machine has no clock of its own. The owner feeds it elapsed seconds through
//! [`PomodoroState::advance`], so coalesced or late ticks do not lose time.

use crate::config::PomodoroSettings;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PomodoroPhase {
    Work,
    ShortBreak,
    LongBreak,
    #[default]
    Idle,
}

impl PomodoroPhase {
    pub fn is_break(self) -> bool {
        matches!(self, PomodoroPhase::ShortBreak | PomodoroPhase::LongBreak)
    }

    pub fn label(self) -> &'static str {
        match self {
            PomodoroPhase::Work => "Focus",
            PomodoroPhase::ShortBreak => "Short break",
            PomodoroPhase::LongBreak => "Long break",
            PomodoroPhase::Idle => "Idle",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PomodoroAction {
    Start,
    Pause,
    Reset,
    Skip,
}

/// What happened when a phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseChange {
    WorkCompleted { next: PomodoroPhase },
    BreakCompleted,
}

impl PhaseChange {
    pub fn message(self) -> &'static str {
        match self {
            PhaseChange::WorkCompleted {
                next: PomodoroPhase::LongBreak,
            } => "Focus session complete! Time for a long break.",
            PhaseChange::WorkCompleted { .. } => "Focus session complete! Time for a short break.",
            PhaseChange::BreakCompleted => "Break over! Ready to focus again?",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PomodoroState {
    pub phase: PomodoroPhase,
    pub time_remaining_seconds: u64,
    pub sessions_completed: u32,
    pub is_running: bool,
    pub today_pomodoros: u32,
}

impl PomodoroState {
    pub fn apply(&mut self, action: PomodoroAction, cfg: &PomodoroSettings) -> Option<PhaseChange> {
        match action {
            PomodoroAction::Start => {
                self.start(cfg);
                None
            }
            PomodoroAction::Pause => {
                self.pause();
                None
            }
            PomodoroAction::Reset => {
                self.reset();
                None
            }
            PomodoroAction::Skip => Some(self.skip(cfg)),
        }
    }

    pub fn start(&mut self, cfg: &PomodoroSettings) {
        if self.phase == PomodoroPhase::Idle || self.time_remaining_seconds == 0 {
            self.phase = PomodoroPhase::Work;
            self.time_remaining_seconds = cfg.work_seconds();
        }
        self.is_running = true;
    }

    pub fn pause(&mut self) {
        self.is_running = false;
    }

    /// A single one-second tick.
    pub fn tick(&mut self, cfg: &PomodoroSettings) -> Option<PhaseChange> {
        self.advance(1, cfg)
    }

    /// Consumes `elapsed` seconds, crossing as many phase boundaries as the
    /// auto-start flags allow. Returns the last phase change, if any.
    pub fn advance(&mut self, elapsed: u64, cfg: &PomodoroSettings) -> Option<PhaseChange> {
        let mut left = elapsed;
        let mut last = None;

        while left > 0 && self.is_running && self.phase != PomodoroPhase::Idle {
            let step = left.min(self.time_remaining_seconds);
            self.time_remaining_seconds -= step;
            left -= step;

            if self.time_remaining_seconds == 0 {
                last = Some(self.complete_phase(cfg));
                // zero-length phases would spin forever
                if self.time_remaining_seconds == 0 {
                    break;
                }
            }
        }
        last
    }

    /// Ends the current phase early. A skipped phase never auto-starts the next.
    pub fn skip(&mut self, cfg: &PomodoroSettings) -> PhaseChange {
        let change = match self.phase {
            PomodoroPhase::Work => self.complete_phase(cfg),
            _ => {
                self.phase = PomodoroPhase::Work;
                self.time_remaining_seconds = cfg.work_seconds();
                PhaseChange::BreakCompleted
            }
        };
        self.is_running = false;
        change
    }

    /// Back to idle. `today_pomodoros` survives.
    pub fn reset(&mut self) {
        self.phase = PomodoroPhase::Idle;
        self.time_remaining_seconds = 0;
        self.sessions_completed = 0;
        self.is_running = false;
    }

    pub fn daily_reset(&mut self) {
        self.today_pomodoros = 0;
    }

    fn complete_phase(&mut self, cfg: &PomodoroSettings) -> PhaseChange {
        if self.phase == PomodoroPhase::Work {
            self.sessions_completed += 1;
            self.today_pomodoros += 1;

            if self.sessions_completed % cfg.long_break_every() == 0 {
                self.phase = PomodoroPhase::LongBreak;
                self.time_remaining_seconds = cfg.long_break_seconds();
            } else {
                self.phase = PomodoroPhase::ShortBreak;
                self.time_remaining_seconds = cfg.short_break_seconds();
            }
            self.is_running = cfg.auto_start_breaks;
            PhaseChange::WorkCompleted { next: self.phase }
        } else {
            self.phase = PomodoroPhase::Work;
            self.time_remaining_seconds = cfg.work_seconds();
            self.is_running = cfg.auto_start_work;
            PhaseChange::BreakCompleted
        }
    }
}
