use thiserror::Error;

use crate::timer::{TimerError, TimerKey};

#[derive(Debug, Error)]
pub enum ArqError {
    #[error("{link}: outgoing compound offered without capacity")]
    CapacityExceeded { link: String },
    #[error("{link}: no data ready to send")]
    NothingToSend { link: String },
    #[error("{link}: timeout for slot {slot} without an outstanding compound")]
    UnexpectedTimeout { link: String, slot: TimerKey },
    #[error("{link}: protocol violation: {detail}")]
    ProtocolViolation { link: String, detail: String },
    #[error(transparent)]
    Timer(#[from] TimerError),
}

impl ArqError {
    pub(crate) fn violation(link: &str, detail: impl Into<String>) -> Self {
        ArqError::ProtocolViolation {
            link: link.to_string(),
            detail: detail.into(),
        }
    }
}
