use thiserror::Error;

/// Failures decoding a message from a browsing context.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Unknown message type")]
    UnknownType(String),

    #[error("Message is missing a type")]
    MissingType,

    #[error("Malformed payload for {kind}: {source}")]
    MalformedPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settings that would break an invariant of the data model.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Schedule '{id}' has an invalid time '{value}' (expected HH:MM)")]
    InvalidTime { id: String, value: String },

    #[error("Schedule '{id}' contains weekday {day}, expected 0-6")]
    InvalidWeekday { id: String, day: u8 },

    #[error("Time-limit rule '{0}' needs dailyLimitMinutes")]
    MissingDailyLimit(String),

    #[error("Rule '{0}' has dailyLimitMinutes but is not a time-limit rule")]
    UnexpectedDailyLimit(String),

    #[error("Rule '{0}' has an empty pattern")]
    EmptyPattern(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum FrictionError {
    #[error("Wait {0} more seconds")]
    StillWaiting(u64),

    #[error("The typed phrase does not match")]
    PhraseMismatch,

    #[error("No friction challenge is active")]
    NotActive,
}
