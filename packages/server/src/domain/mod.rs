//! Domain layer for the chat application.
//!
//! This module contains business logic that is independent of
//! data transfer objects (DTOs) and infrastructure concerns.

pub mod entity;
pub mod error;
pub mod factory;
pub mod repository;
pub mod service;
pub mod value_object;

pub use entity::{
    ConnectionMetadata, DEFAULT_HISTORY_LIMIT, Message, MessageKind, MessageLog, UserDirectory,
    UserProfile,
};
pub use error::{AuthError, MessageError, ReplyError, RepositoryError, ValueObjectError};
pub use factory::MessageIdFactory;
pub use repository::{KeyValueStore, MessageRepository};
pub use service::{Identity, ReplyGenerator, SessionValidator};
pub use value_object::{
    ConnectionId, DisplayName, MessageContent, MessageId, RoomKey, RoomKind, Timestamp, UserId,
};
