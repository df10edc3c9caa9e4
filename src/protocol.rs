//! Messages exchanged between browsing contexts and the background process.
//!
//! Wire form is `{ "type": "CHECK_BLOCKED", "payload": ... }`.

use crate::config::Settings;
use crate::engine::CheckBlockedResponse;
use crate::error::ProtocolError;
use crate::ledger::DailyTimeStats;
use crate::pomodoro::{PomodoroAction, PomodoroState};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const KNOWN_TYPES: &[&str] = &[
    "CHECK_BLOCKED",
    "HEARTBEAT",
    "GET_SETTINGS",
    "UPDATE_SETTINGS",
    "GET_TIME_STATS",
    "GET_POMODORO_STATE",
    "POMODORO_ACTION",
    "REQUEST_BYPASS",
    "FRICTION_COMPLETED",
    "CLEAR_BYPASS",
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    CheckBlocked(String),
    Heartbeat {
        domain: String,
        seconds: u64,
    },
    GetSettings,
    UpdateSettings(Box<Settings>),
    GetTimeStats,
    GetPomodoroState,
    PomodoroAction {
        action: PomodoroAction,
    },
    #[serde(rename_all = "camelCase")]
    RequestBypass {
        domain: String,
        duration_minutes: u32,
    },
    FrictionCompleted {
        domain: String,
    },
    ClearBypass {
        domain: String,
    },
}

impl Message {
    pub fn from_json(data: &str) -> Result<Self, ProtocolError> {
        let mut value: Value = serde_json::from_str(data)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_string();
        if !KNOWN_TYPES.contains(&kind.as_str()) {
            return Err(ProtocolError::UnknownType(kind));
        }

        // `payload: null` is how callers send messages without a body.
        if let Some(obj) = value.as_object_mut() {
            if obj.get("payload").is_some_and(Value::is_null) {
                obj.remove("payload");
            }
        }

        serde_json::from_value(value)
            .map_err(|source| ProtocolError::MalformedPayload { kind, source })
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Response {
    CheckBlocked(CheckBlockedResponse),
    Success { success: bool },
    Settings(Box<Settings>),
    TimeStats(DailyTimeStats),
    Pomodoro(PomodoroState),
    Error { error: String },
}

impl Response {
    pub fn ok() -> Self {
        Response::Success { success: true }
    }

    pub fn error(message: impl ToString) -> Self {
        Response::Error {
            error: message.to_string(),
        }
    }
}

/// One-way channel from a browsing context to the background process.
/// `None` means nothing answered; callers treat that as "not blocked".
pub trait Transport {
    fn send(&mut self, message: Message) -> Option<Response>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, message: Message) -> Option<Response> {
        (**self).send(message)
    }
}
