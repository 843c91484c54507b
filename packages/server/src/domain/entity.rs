//! Core domain models for the chat application.

use hiroba_shared::{DeliveryStatus, ParticipantInfo, PresenceStatus};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::{
    error::MessageError,
    value_object::{ConnectionId, MessageId, RoomKey, Timestamp, UserId},
};

/// Default number of messages a room keeps in memory and replays on join
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Body of a nudge message
pub const NUDGE_CONTENT: &str = "sent a nudge.";

/// Body of a wink message
pub const WINK_CONTENT: &str = "sent a wink.";

/// Kind of a room message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Chat,
    System,
    Nudge,
}

/// Represents a chat message in the domain model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room: RoomKey,
    /// Sender's user ID
    pub sender: UserId,
    /// Sender's display name at the time of sending
    pub display_name: String,
    /// Message body
    pub content: String,
    /// Server-assigned timestamp
    pub timestamp: Timestamp,
    pub kind: MessageKind,
    pub is_wink: bool,
    pub wink_id: Option<String>,
    status: DeliveryStatus,
}

impl Message {
    /// Create a new chat message with status `sent`
    pub fn chat(
        id: MessageId,
        room: RoomKey,
        sender: UserId,
        display_name: String,
        content: String,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            room,
            sender,
            display_name,
            content,
            timestamp,
            kind: MessageKind::Chat,
            is_wink: false,
            wink_id: None,
            status: DeliveryStatus::Sent,
        }
    }

    pub fn nudge(
        id: MessageId,
        room: RoomKey,
        sender: UserId,
        display_name: String,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            kind: MessageKind::Nudge,
            ..Self::chat(
                id,
                room,
                sender,
                display_name,
                NUDGE_CONTENT.to_string(),
                timestamp,
            )
        }
    }

    /// A wink travels as a chat message carrying the animation key
    pub fn wink(
        id: MessageId,
        room: RoomKey,
        sender: UserId,
        display_name: String,
        wink_id: String,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            is_wink: true,
            wink_id: Some(wink_id),
            ..Self::chat(
                id,
                room,
                sender,
                display_name,
                WINK_CONTENT.to_string(),
                timestamp,
            )
        }
    }

    pub fn system(
        id: MessageId,
        room: RoomKey,
        sender: UserId,
        display_name: String,
        content: String,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            kind: MessageKind::System,
            ..Self::chat(id, room, sender, display_name, content, timestamp)
        }
    }

    /// Restore the stored status of a persisted message
    pub fn with_status(mut self, status: DeliveryStatus) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> DeliveryStatus {
        self.status
    }

    /// Move the delivery status forward.
    ///
    /// # Errors
    ///
    /// Returns `MessageError::StatusRegression` unless `requested` is
    /// strictly ahead of the current status.
    pub fn advance_status(&mut self, requested: DeliveryStatus) -> Result<(), MessageError> {
        if requested <= self.status {
            return Err(MessageError::StatusRegression {
                current: self.status,
                requested,
            });
        }
        self.status = requested;
        Ok(())
    }

    pub fn is_nudge(&self) -> bool {
        self.kind == MessageKind::Nudge
    }
}

/// Bounded, ordered in-memory message history of one room.
///
/// Messages are kept sorted by `(timestamp, id)`; once the limit is reached
/// the oldest entries are dropped.
#[derive(Debug, Clone)]
pub struct MessageLog {
    messages: Vec<Message>,
    limit: usize,
}

impl MessageLog {
    pub fn new(limit: usize) -> Self {
        Self {
            messages: Vec::new(),
            limit,
        }
    }

    /// Build a log from stored messages, keeping only the newest `limit`
    pub fn from_messages(messages: Vec<Message>, limit: usize) -> Self {
        let mut log = Self::new(limit);
        for message in messages {
            log.push(message);
        }
        log
    }

    /// Insert a message at its ordered position and trim the oldest overflow
    pub fn push(&mut self, message: Message) {
        let position = self
            .messages
            .partition_point(|m| (m.timestamp, &m.id) <= (message.timestamp, &message.id));
        self.messages.insert(position, message);
        if self.messages.len() > self.limit {
            let overflow = self.messages.len() - self.limit;
            self.messages.drain(..overflow);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id.as_str() == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id.as_str() == id)
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Per-connection state held by an actor
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    pub connection_id: ConnectionId,
    pub session_id: String,
    pub user_id: UserId,
    pub display_name: String,
    pub status: PresenceStatus,
    /// Last inbound frame of any kind, pings included
    pub last_seen: Instant,
    /// Last explicit status change
    pub status_updated_at: Instant,
    pub connected_at: Timestamp,
}

impl ConnectionMetadata {
    pub fn new(
        connection_id: ConnectionId,
        session_id: String,
        user_id: UserId,
        display_name: String,
        now: Instant,
        connected_at: Timestamp,
    ) -> Self {
        Self {
            connection_id,
            session_id,
            user_id,
            display_name,
            status: PresenceStatus::Online,
            last_seen: now,
            status_updated_at: now,
            connected_at,
        }
    }

    pub fn participant_info(&self) -> ParticipantInfo {
        ParticipantInfo {
            id: self.user_id.to_string(),
            display_name: self.display_name.clone(),
            status: self.status,
        }
    }
}

/// A known user of the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
    pub is_bot: bool,
    /// Short handle used to address a bot with `@persona`
    pub persona: Option<String>,
    /// One-line status shown next to the name; a bot's bio
    #[serde(default)]
    pub personal_message: Option<String>,
    /// Character a bot plays when it replies
    #[serde(default)]
    pub archetype: Option<String>,
    /// How a bot writes: capitalization, punctuation, slang
    #[serde(default)]
    pub typing_style: Option<String>,
}

impl UserProfile {
    pub fn human(id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            is_bot: false,
            persona: None,
            personal_message: None,
            archetype: None,
            typing_style: None,
        }
    }

    pub fn bot(id: UserId, display_name: impl Into<String>, persona: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            is_bot: true,
            persona: Some(persona.into()),
            personal_message: None,
            archetype: None,
            typing_style: None,
        }
    }

    /// Attach the traits a reply generator plays a bot by.
    pub fn with_personality(
        mut self,
        personal_message: impl Into<String>,
        archetype: impl Into<String>,
        typing_style: impl Into<String>,
    ) -> Self {
        self.personal_message = Some(personal_message.into());
        self.archetype = Some(archetype.into());
        self.typing_style = Some(typing_style.into());
        self
    }
}

/// Read-only directory of users and bots
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    users: Vec<UserProfile>,
}

impl UserDirectory {
    pub fn new(users: Vec<UserProfile>) -> Self {
        Self { users }
    }

    pub fn get(&self, id: &UserId) -> Option<&UserProfile> {
        self.users.iter().find(|u| &u.id == id)
    }

    pub fn bots(&self) -> impl Iterator<Item = &UserProfile> {
        self.users.iter().filter(|u| u.is_bot)
    }

    pub fn all(&self) -> &[UserProfile] {
        &self.users
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, timestamp: i64) -> Message {
        Message::chat(
            MessageId::new(id.to_string()).unwrap(),
            RoomKey::new("general".to_string()).unwrap(),
            UserId::new("alice".to_string()).unwrap(),
            "Alice".to_string(),
            format!("message {id}"),
            Timestamp::new(timestamp),
        )
    }

    #[test]
    fn test_message_chat_starts_as_sent() {
        // テスト項目: 新しいチャットメッセージの配信状態は sent になる
        // when (操作):
        let msg = message("m1", 1000);

        // then (期待する結果):
        assert_eq!(msg.status(), DeliveryStatus::Sent);
        assert_eq!(msg.kind, MessageKind::Chat);
        assert!(!msg.is_wink);
    }

    #[test]
    fn test_message_advance_status_forward() {
        // テスト項目: 配信状態は前に進められる（sent → read の飛び越しも可）
        // given (前提条件):
        let mut msg = message("m1", 1000);

        // when (操作):
        let result = msg.advance_status(DeliveryStatus::Read);

        // then (期待する結果):
        assert!(result.is_ok());
        assert_eq!(msg.status(), DeliveryStatus::Read);
    }

    #[test]
    fn test_message_advance_status_rejects_regression_and_repeat() {
        // テスト項目: 配信状態は後退も同じ状態への更新もできない
        // given (前提条件):
        let mut msg = message("m1", 1000);
        msg.advance_status(DeliveryStatus::Read).unwrap();

        // when (操作):
        let regression = msg.advance_status(DeliveryStatus::Delivered);
        let repeat = msg.advance_status(DeliveryStatus::Read);

        // then (期待する結果):
        assert_eq!(
            regression.unwrap_err(),
            MessageError::StatusRegression {
                current: DeliveryStatus::Read,
                requested: DeliveryStatus::Delivered
            }
        );
        assert!(repeat.is_err());
        assert_eq!(msg.status(), DeliveryStatus::Read);
    }

    #[test]
    fn test_nudge_and_wink_shapes() {
        // テスト項目: ナッジとウインクは固定の本文を持つ
        let room = RoomKey::new("general".to_string()).unwrap();
        let alice = UserId::new("alice".to_string()).unwrap();

        let nudge = Message::nudge(
            MessageId::new("n1".to_string()).unwrap(),
            room.clone(),
            alice.clone(),
            "Alice".to_string(),
            Timestamp::new(1),
        );
        let wink = Message::wink(
            MessageId::new("w1".to_string()).unwrap(),
            room,
            alice,
            "Alice".to_string(),
            "kiss".to_string(),
            Timestamp::new(2),
        );

        assert!(nudge.is_nudge());
        assert_eq!(nudge.content, "sent a nudge.");
        assert!(wink.is_wink);
        assert_eq!(wink.kind, MessageKind::Chat);
        assert_eq!(wink.wink_id.as_deref(), Some("kiss"));
        assert_eq!(wink.content, "sent a wink.");
    }

    #[test]
    fn test_message_log_keeps_timestamp_order() {
        // テスト項目: 到着順に関係なくタイムスタンプ順で保持される
        // given (前提条件):
        let mut log = MessageLog::new(DEFAULT_HISTORY_LIMIT);

        // when (操作):
        log.push(message("b", 2000));
        log.push(message("a", 1000));
        log.push(message("c", 2000));

        // then (期待する結果):
        let ids: Vec<&str> = log.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_message_log_drops_oldest_over_limit() {
        // テスト項目: 上限を超えると最も古いメッセージから削除される
        // given (前提条件):
        let mut log = MessageLog::new(100);

        // when (操作):
        for i in 0..101 {
            log.push(message(&format!("m{i:03}"), 1000 + i));
        }

        // then (期待する結果):
        assert_eq!(log.len(), 100);
        assert!(!log.contains("m000"));
        assert!(log.contains("m001"));
        assert!(log.contains("m100"));
    }

    #[test]
    fn test_message_log_from_messages_keeps_newest() {
        // テスト項目: 保存済みメッセージから最新 limit 件だけを復元する
        // given (前提条件):
        let stored = (0..5).map(|i| message(&format!("m{i}"), i)).collect();

        // when (操作):
        let log = MessageLog::from_messages(stored, 3);

        // then (期待する結果):
        let ids: Vec<&str> = log.messages().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn test_user_directory_lookup() {
        // テスト項目: ディレクトリからユーザーとボットを引ける
        // given (前提条件):
        let directory = UserDirectory::new(vec![
            UserProfile::human(UserId::new("alice".to_string()).unwrap(), "Alice"),
            UserProfile::bot(UserId::new("bot-1".to_string()).unwrap(), "Hal Bot", "hal"),
        ]);

        // then (期待する結果):
        assert!(
            directory
                .get(&UserId::new("alice".to_string()).unwrap())
                .is_some()
        );
        assert_eq!(directory.bots().count(), 1);
        assert_eq!(directory.all().len(), 2);
    }
}
