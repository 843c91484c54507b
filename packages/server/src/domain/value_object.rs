//! Value Objects for domain models.
//!
//! Value Objects are immutable objects that represent values in the domain.
//! They are compared by their value, not by identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::error::ValueObjectError;

/// Maximum length of identifiers (user, room, message).
pub const MAX_ID_LEN: usize = 100;

/// Maximum length of a chat message body.
pub const MAX_CONTENT_LEN: usize = 2048;

/// Maximum length of a display name.
pub const MAX_DISPLAY_NAME_LEN: usize = 50;

/// Prefix of direct (two-party) room keys.
pub const DIRECT_ROOM_PREFIX: &str = "dm_";

/// Separator between the two participants of a direct room key.
pub const DIRECT_ROOM_SEPARATOR: &str = "__";

/// User identifier value object.
///
/// Represents the identity a session token resolves to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create a new UserId.
    ///
    /// # Arguments
    ///
    /// * `id` - The user identifier string
    ///
    /// # Returns
    ///
    /// A Result containing the UserId or an error if validation fails
    pub fn new(id: String) -> Result<Self, ValueObjectError> {
        if id.is_empty() {
            return Err(ValueObjectError::UserIdEmpty);
        }
        let len = id.len();
        if len > MAX_ID_LEN {
            return Err(ValueObjectError::UserIdTooLong {
                max: MAX_ID_LEN,
                actual: len,
            });
        }
        // a direct room key must split into its two participants in exactly one way
        if id.starts_with(DIRECT_ROOM_PREFIX)
            || id.contains(DIRECT_ROOM_SEPARATOR)
            || id.starts_with('_')
            || id.ends_with('_')
        {
            return Err(ValueObjectError::UserIdReserved(id));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned String.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shape of a room, derived from its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomKind {
    /// Public or group room; any authenticated user may connect.
    Group,
    /// Two-party room; only the two encoded participants may connect.
    Direct(UserId, UserId),
}

/// Room key value object.
///
/// Group rooms use free-form keys (`general`). Direct rooms encode both
/// participants: `dm_{a}__{b}` with `a <= b`. Direct keys are canonicalized
/// on construction so both orderings address the same room.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoomKey(String);

impl RoomKey {
    /// Create a new RoomKey.
    ///
    /// # Arguments
    ///
    /// * `key` - The room key string
    ///
    /// # Returns
    ///
    /// A Result containing the RoomKey or an error if validation fails
    pub fn new(key: String) -> Result<Self, ValueObjectError> {
        if key.is_empty() {
            return Err(ValueObjectError::RoomKeyEmpty);
        }
        let len = key.len();
        if len > MAX_ID_LEN {
            return Err(ValueObjectError::RoomKeyTooLong {
                max: MAX_ID_LEN,
                actual: len,
            });
        }
        if let Some(pair) = key.strip_prefix(DIRECT_ROOM_PREFIX) {
            let (a, b) = split_direct_pair(pair)
                .ok_or_else(|| ValueObjectError::RoomKeyMalformedDirect(key.clone()))?;
            return Ok(Self::direct(&a, &b));
        }
        Ok(Self(key))
    }

    /// Canonical direct room key for two users, independent of argument order.
    pub fn direct(a: &UserId, b: &UserId) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self(format!(
            "{DIRECT_ROOM_PREFIX}{first}{DIRECT_ROOM_SEPARATOR}{second}"
        ))
    }

    /// Room shape derived from the key.
    pub fn kind(&self) -> RoomKind {
        self.0
            .strip_prefix(DIRECT_ROOM_PREFIX)
            .and_then(split_direct_pair)
            .map_or(RoomKind::Group, |(a, b)| RoomKind::Direct(a, b))
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.kind(), RoomKind::Direct(..))
    }

    /// Whether `user` may hold a connection to this room.
    pub fn admits(&self, user: &UserId) -> bool {
        match self.kind() {
            RoomKind::Group => true,
            RoomKind::Direct(a, b) => &a == user || &b == user,
        }
    }

    /// The other participant of a direct room, seen from `user`.
    pub fn counterpart(&self, user: &UserId) -> Option<UserId> {
        match self.kind() {
            RoomKind::Group => None,
            RoomKind::Direct(a, b) if &a == user => Some(b),
            RoomKind::Direct(a, b) if &b == user => Some(a),
            RoomKind::Direct(..) => None,
        }
    }

    /// Both participants of a direct room.
    pub fn direct_participants(&self) -> Option<(UserId, UserId)> {
        match self.kind() {
            RoomKind::Direct(a, b) => Some((a, b)),
            RoomKind::Group => None,
        }
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn split_direct_pair(pair: &str) -> Option<(UserId, UserId)> {
    let (a, b) = pair.split_once(DIRECT_ROOM_SEPARATOR)?;
    let a = UserId::new(a.to_string()).ok()?;
    let b = UserId::new(b.to_string()).ok()?;
    Some((a, b))
}

impl TryFrom<String> for RoomKey {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message identifier value object.
///
/// Opaque; clients may supply their own, otherwise the server generates a UUID.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: String) -> Result<Self, ValueObjectError> {
        if id.is_empty() {
            return Err(ValueObjectError::MessageIdEmpty);
        }
        let len = id.len();
        if len > MAX_ID_LEN {
            return Err(ValueObjectError::MessageIdTooLong {
                max: MAX_ID_LEN,
                actual: len,
            });
        }
        Ok(Self(id))
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message content value object.
///
/// Represents the content of a chat message with validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent(String);

impl MessageContent {
    /// Create a new MessageContent.
    ///
    /// # Arguments
    ///
    /// * `content` - The message content string
    ///
    /// # Returns
    ///
    /// A Result containing the MessageContent or an error if validation fails
    pub fn new(content: String) -> Result<Self, ValueObjectError> {
        if content.trim().is_empty() {
            return Err(ValueObjectError::MessageContentEmpty);
        }
        let len = content.chars().count();
        if len > MAX_CONTENT_LEN {
            return Err(ValueObjectError::MessageContentTooLong {
                max: MAX_CONTENT_LEN,
                actual: len,
            });
        }
        Ok(Self(content))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned String.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for MessageContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display name value object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayName(String);

impl DisplayName {
    pub fn new(name: String) -> Result<Self, ValueObjectError> {
        if name.trim().is_empty() {
            return Err(ValueObjectError::DisplayNameEmpty);
        }
        let len = name.chars().count();
        if len > MAX_DISPLAY_NAME_LEN {
            return Err(ValueObjectError::DisplayNameTooLong {
                max: MAX_DISPLAY_NAME_LEN,
                actual: len,
            });
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DisplayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp value object.
///
/// Represents a Unix timestamp in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Create a new Timestamp.
    ///
    /// # Arguments
    ///
    /// * `value` - Unix timestamp in milliseconds
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the inner i64 value.
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle of one live connection inside an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
