// Error taxonomy: admission rejections and protocol rejections are
// recoverable and scoped to the requester; an invariant violation means
// admission let something through it must not have, and halts the session.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("insufficient funds: order costs {needed}, cash available {available}")]
    InsufficientFunds { needed: u64, available: u64 },

    #[error("insufficient shares: order sells {needed}, holding {available}")]
    InsufficientShares { needed: u64, available: u64 },

    #[error("price must be a positive whole number")]
    InvalidPrice,

    #[error("quantity must be a positive whole number")]
    InvalidQuantity,

    #[error("order limit of {cap} per round reached")]
    OrderLimitExceeded { cap: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown participant")]
    UnknownParticipant,

    #[error("unknown session")]
    UnknownSession,

    #[error("{0}")]
    InvalidPhaseTransition(String),

    #[error("{0}")]
    NotAuthorized(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl GameError {
    /// Stable discriminator carried in the wire `Error.kind` field.
    pub fn kind(&self) -> &'static str {
        match self {
            GameError::Admission(AdmissionError::InsufficientFunds { .. }) => "InsufficientFunds",
            GameError::Admission(AdmissionError::InsufficientShares { .. }) => "InsufficientShares",
            GameError::Admission(AdmissionError::InvalidPrice) => "InvalidPrice",
            GameError::Admission(AdmissionError::InvalidQuantity) => "InvalidQuantity",
            GameError::Admission(AdmissionError::OrderLimitExceeded { .. }) => "OrderLimitExceeded",
            GameError::Protocol(ProtocolError::UnknownParticipant) => "UnknownParticipant",
            GameError::Protocol(ProtocolError::UnknownSession) => "UnknownSession",
            GameError::Protocol(ProtocolError::InvalidPhaseTransition(_)) => {
                "InvalidPhaseTransition"
            }
            GameError::Protocol(ProtocolError::NotAuthorized(_)) => "NotAuthorized",
            GameError::Invariant(_) => "InvariantViolation",
        }
    }

    /// Fatal errors stop the session instead of answering the requester.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GameError::Invariant(_))
    }
}
