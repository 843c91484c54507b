//! Domain layer error definitions.

use hiroba_shared::DeliveryStatus;
use thiserror::Error;

/// Errors related to Value Objects validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueObjectError {
    /// UserId validation error
    #[error("UserId cannot be empty")]
    UserIdEmpty,

    /// UserId too long error
    #[error("UserId cannot exceed {max} characters (got {actual})")]
    UserIdTooLong { max: usize, actual: usize },

    /// UserId that would make a direct room key ambiguous
    #[error("UserId cannot start with 'dm_', contain '__' or start or end with '_' (got: {0})")]
    UserIdReserved(String),

    /// RoomKey validation error
    #[error("RoomKey cannot be empty")]
    RoomKeyEmpty,

    #[error("RoomKey cannot exceed {max} characters (got {actual})")]
    RoomKeyTooLong { max: usize, actual: usize },

    /// Direct room key without two participants
    #[error("direct room key must look like dm_{{a}}__{{b}} (got: {0})")]
    RoomKeyMalformedDirect(String),

    #[error("MessageId cannot be empty")]
    MessageIdEmpty,

    #[error("MessageId cannot exceed {max} characters (got {actual})")]
    MessageIdTooLong { max: usize, actual: usize },

    /// MessageContent validation error
    #[error("MessageContent cannot be empty")]
    MessageContentEmpty,

    /// MessageContent too long error
    #[error("MessageContent cannot exceed {max} characters (got {actual})")]
    MessageContentTooLong { max: usize, actual: usize },

    #[error("DisplayName cannot be empty")]
    DisplayNameEmpty,

    #[error("DisplayName cannot exceed {max} characters (got {actual})")]
    DisplayNameTooLong { max: usize, actual: usize },
}

/// Errors related to Message domain logic
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// Delivery status may only move forward
    #[error("delivery status cannot move from {current} to {requested}")]
    StatusRegression {
        current: DeliveryStatus,
        requested: DeliveryStatus,
    },
}

/// Errors raised by storage collaborators
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("stored value is corrupt: {0}")]
    Corrupt(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while resolving a session token
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("session not found or expired")]
    InvalidSession,

    #[error("session store failed: {0}")]
    Store(#[from] RepositoryError),
}

/// Errors raised by the automated reply generator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReplyError {
    #[error("reply generation timed out")]
    Timeout,

    #[error("reply generation failed: {0}")]
    Failed(String),

    #[error("reply generator returned no content")]
    Empty,

    #[error("bot '{0}' has no archetype or typing style")]
    MissingPersonality(String),
}
