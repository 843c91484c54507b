//! WebSocket frame protocol.
//!
//! Every frame, in both directions, is a single JSON object carrying a `type`
//! discriminator and a flat set of optional camelCase fields. Room messages,
//! presence notifications and control frames all share this one shape.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Maximum length of `content` accepted from clients.
pub const MAX_CONTENT_CHARS: usize = 2048;
/// Maximum length of `displayName` accepted from clients.
pub const MAX_DISPLAY_NAME_CHARS: usize = 50;
/// Maximum length of `status` accepted from clients.
pub const MAX_STATUS_CHARS: usize = 20;

/// Frame type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    Chat,
    Nudge,
    Wink,
    Typing,
    System,
    Participants,
    History,
    Presence,
    PresenceUpdate,
    PresenceJoin,
    PresenceFullSync,
    MessageNotification,
    DeliveryStatus,
    Ack,
    Ping,
    Error,
}

impl FrameType {
    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::Chat => "chat",
            FrameType::Nudge => "nudge",
            FrameType::Wink => "wink",
            FrameType::Typing => "typing",
            FrameType::System => "system",
            FrameType::Participants => "participants",
            FrameType::History => "history",
            FrameType::Presence => "presence",
            FrameType::PresenceUpdate => "presence_update",
            FrameType::PresenceJoin => "presence_join",
            FrameType::PresenceFullSync => "presence_full_sync",
            FrameType::MessageNotification => "message_notification",
            FrameType::DeliveryStatus => "delivery_status",
            FrameType::Ack => "ack",
            FrameType::Ping => "ping",
            FrameType::Error => "error",
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status of a chat message.
///
/// Variants are declared in transition order, so `Ord` gives
/// `Sent < Delivered < Read`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(DeliveryStatus::Sent),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "read" => Ok(DeliveryStatus::Read),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presence status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    #[default]
    Online,
    Busy,
    Away,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Busy => "busy",
            PresenceStatus::Away => "away",
            PresenceStatus::Offline => "offline",
        }
    }
}

impl FromStr for PresenceStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(PresenceStatus::Online),
            "busy" => Ok(PresenceStatus::Busy),
            "away" => Ok(PresenceStatus::Away),
            "offline" => Ok(PresenceStatus::Offline),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status string that is neither a delivery nor a presence status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

/// One entry of a `participants` or `presence_full_sync` roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub id: String,
    pub display_name: String,
    pub status: PresenceStatus,
}

/// A single protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: FrameType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Delivery status for chat/ack frames, presence status for presence frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_typing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_nudge: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_wink: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wink_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<ParticipantInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Frame>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Box<Frame>>,
}

impl Frame {
    /// An empty frame of the given type.
    pub fn new(kind: FrameType) -> Self {
        Self {
            kind,
            id: None,
            room_id: None,
            sender_id: None,
            user_id: None,
            display_name: None,
            content: None,
            timestamp: None,
            status: None,
            ack_id: None,
            is_typing: None,
            is_nudge: None,
            is_wink: None,
            wink_id: None,
            participants: None,
            messages: None,
            message: None,
        }
    }

    /// In-band protocol error.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::new(FrameType::Error)
        }
    }

    /// Informational system notice.
    pub fn system(room_id: Option<&str>, content: impl Into<String>, timestamp: i64) -> Self {
        Self {
            room_id: room_id.map(str::to_string),
            content: Some(content.into()),
            timestamp: Some(timestamp),
            ..Self::new(FrameType::System)
        }
    }

    pub fn ping() -> Self {
        Self::new(FrameType::Ping)
    }

    /// Acknowledgement of a message identified by `ack_id`.
    pub fn ack(ack_id: impl Into<String>, status: DeliveryStatus) -> Self {
        Self {
            ack_id: Some(ack_id.into()),
            status: Some(status.as_str().to_string()),
            ..Self::new(FrameType::Ack)
        }
    }

    /// Parse a frame from its JSON text.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serialize the frame to JSON text.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// `status` interpreted as a delivery status.
    pub fn delivery_status(&self) -> Option<DeliveryStatus> {
        self.status.as_deref().and_then(|s| s.parse().ok())
    }

    /// `status` interpreted as a presence status.
    pub fn presence_status(&self) -> Option<PresenceStatus> {
        self.status.as_deref().and_then(|s| s.parse().ok())
    }

    /// Check the length limits clients must respect.
    pub fn check_limits(&self) -> Result<(), String> {
        if let Some(content) = &self.content
            && content.chars().count() > MAX_CONTENT_CHARS
        {
            return Err(format!("content exceeds {MAX_CONTENT_CHARS} characters"));
        }
        if let Some(name) = &self.display_name
            && name.chars().count() > MAX_DISPLAY_NAME_CHARS
        {
            return Err(format!(
                "displayName exceeds {MAX_DISPLAY_NAME_CHARS} characters"
            ));
        }
        if let Some(status) = &self.status
            && status.chars().count() > MAX_STATUS_CHARS
        {
            return Err(format!("status exceeds {MAX_STATUS_CHARS} characters"));
        }
        Ok(())
    }
}
