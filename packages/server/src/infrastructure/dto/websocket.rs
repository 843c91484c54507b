//! WebSocket frame builders.
//!
//! Converts domain values into the shared [`Frame`] wire shape.

use hiroba_shared::{Frame, FrameType, ParticipantInfo, PresenceStatus};

use crate::domain::{Message, MessageKind, RoomKey, UserId};

/// Wire form of a room message
pub fn message_frame(message: &Message) -> Frame {
    let kind = match message.kind {
        MessageKind::Chat => FrameType::Chat,
        MessageKind::System => FrameType::System,
        MessageKind::Nudge => FrameType::Nudge,
    };
    Frame {
        id: Some(message.id.to_string()),
        room_id: Some(message.room.to_string()),
        sender_id: Some(message.sender.to_string()),
        display_name: Some(message.display_name.clone()),
        content: Some(message.content.clone()),
        timestamp: Some(message.timestamp.value()),
        status: Some(message.status().to_string()),
        is_nudge: message.is_nudge().then_some(true),
        is_wink: message.is_wink.then_some(true),
        wink_id: message.wink_id.clone(),
        ..Frame::new(kind)
    }
}

/// Replay of the room log, oldest first
pub fn history_frame(room: &RoomKey, messages: &[Message]) -> Frame {
    Frame {
        room_id: Some(room.to_string()),
        messages: Some(messages.iter().map(message_frame).collect()),
        ..Frame::new(FrameType::History)
    }
}

pub fn participants_frame(room: &RoomKey, participants: Vec<ParticipantInfo>) -> Frame {
    Frame {
        room_id: Some(room.to_string()),
        participants: Some(participants),
        ..Frame::new(FrameType::Participants)
    }
}

pub fn typing_frame(room: &RoomKey, sender: &UserId, display_name: &str, is_typing: bool) -> Frame {
    Frame {
        room_id: Some(room.to_string()),
        sender_id: Some(sender.to_string()),
        display_name: Some(display_name.to_string()),
        is_typing: Some(is_typing),
        ..Frame::new(FrameType::Typing)
    }
}

/// A room message forwarded over the presence channel
pub fn notification_frame(message: Frame) -> Frame {
    Frame {
        message: Some(Box::new(message)),
        ..Frame::new(FrameType::MessageNotification)
    }
}

pub fn presence_join_frame(user: &UserId, display_name: &str) -> Frame {
    Frame {
        user_id: Some(user.to_string()),
        display_name: Some(display_name.to_string()),
        status: Some(PresenceStatus::Online.to_string()),
        ..Frame::new(FrameType::PresenceJoin)
    }
}

pub fn presence_update_frame(user: &UserId, display_name: &str, status: PresenceStatus) -> Frame {
    Frame {
        user_id: Some(user.to_string()),
        display_name: Some(display_name.to_string()),
        status: Some(status.to_string()),
        ..Frame::new(FrameType::PresenceUpdate)
    }
}

pub fn presence_full_sync_frame(participants: Vec<ParticipantInfo>) -> Frame {
    Frame {
        participants: Some(participants),
        ..Frame::new(FrameType::PresenceFullSync)
    }
}
