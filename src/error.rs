use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::Timeframe;

/// Error taxonomy for the decision pipeline
#[derive(Debug, Error)]
pub enum BotError {
    #[error("insufficient history for {timeframe}: have {have} candles, need {need}")]
    InsufficientHistory {
        timeframe: Timeframe,
        have: usize,
        need: usize,
    },

    #[error("malformed stream message: {0}")]
    MalformedStreamMessage(String),

    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("connection failed permanently after {attempts} reconnect attempts")]
    FatalConnectionFailure { attempts: u32 },

    #[error("invalid sizing: {0}")]
    InvalidSizing(String),

    #[error("order execution failed: {0}")]
    ExecutionFailure(String),

    #[error("invalid position transition: {0}")]
    InvalidTransition(String),

    #[error("timeframe {0} is not configured")]
    UnknownTimeframe(Timeframe),

    #[error("candles for {timeframe} are not strictly increasing at {open_time}")]
    OutOfOrder {
        timeframe: Timeframe,
        open_time: DateTime<Utc>,
    },

    #[error("buffer lock poisoned for {0}")]
    LockPoisoned(Timeframe),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{series} timeframe has {have} enriched rows, need at least 2")]
    TooFewRows { series: &'static str, have: usize },

    #[error("indicator error: {0}")]
    Indicator(String),

    #[error("http error: {0}")]
    Http(String),
}

impl BotError {
    /// Recoverable errors skip the current message or cycle; the rest stop the bot
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            BotError::FatalConnectionFailure { .. }
                | BotError::LockPoisoned(_)
                | BotError::Config(_)
        )
    }
}

impl From<config::ConfigError> for BotError {
    fn from(e: config::ConfigError) -> Self {
        BotError::Config(e.to_string())
    }
}

pub type BotResult<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(BotError::MalformedStreamMessage("x".into()).is_recoverable());
        assert!(BotError::InvalidSizing("zero".into()).is_recoverable());
        assert!(BotError::ConnectionLost("reset".into()).is_recoverable());
        assert!(!BotError::FatalConnectionFailure { attempts: 5 }.is_recoverable());
        assert!(!BotError::Config("bad".into()).is_recoverable());
    }

    #[test]
    fn test_insufficient_history_message() {
        let err = BotError::InsufficientHistory {
            timeframe: Timeframe::from_minutes(5),
            have: 10,
            need: 500,
        };
        assert_eq!(
            err.to_string(),
            "insufficient history for 5m: have 10 candles, need 500"
        );
    }
}
