//! Client-side state derived from inbound frames.
//!
//! [`ClientView`] is the pure part of a session: it folds room and presence
//! frames into the message cache, typing tracker and roster, and decides
//! which acknowledgements to send back. It never touches a socket.

use std::collections::{HashMap, HashSet};

use hiroba_shared::{DeliveryStatus, Frame, FrameType, ParticipantInfo, time::now_millis};
use tokio::time::Instant;

use crate::{
    cache::{MAX_CACHED_MESSAGES, MessageCache},
    roster::Roster,
    typing::TypingTracker,
};

/// Room a bridged message belongs to when it does not say
const FALLBACK_ROOM: &str = "general";

/// Logical connection of a session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    Room(String),
    Presence,
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelKey::Room(room) => write!(f, "room:{room}"),
            ChannelKey::Presence => f.write_str("presence"),
        }
    }
}

/// Connection state of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Open,
}

/// What changed, for whoever renders the session.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    State {
        channel: ChannelKey,
        state: ChannelState,
    },
    History {
        room: String,
        count: usize,
    },
    Message {
        room: String,
        frame: Frame,
    },
    StatusChanged {
        room: String,
        id: String,
        status: DeliveryStatus,
    },
    Typing {
        room: String,
        users: Vec<String>,
    },
    Participants {
        room: String,
        participants: Vec<ParticipantInfo>,
    },
    Presence,
    Error {
        channel: ChannelKey,
        content: String,
    },
}

#[derive(Debug)]
pub struct ClientView {
    user_id: String,
    cache: MessageCache,
    typing: TypingTracker,
    roster: Roster,
    participants: HashMap<String, Vec<ParticipantInfo>>,
    /// Ids already acknowledged as delivered, per room
    acked: HashMap<String, HashSet<String>>,
}

impl ClientView {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            cache: MessageCache::default(),
            typing: TypingTracker::new(),
            roster: Roster::new(),
            participants: HashMap::new(),
            acked: HashMap::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Record that `id` in `room` is being acknowledged; `false` if it already was.
    fn first_ack(&mut self, room: &str, id: &str) -> bool {
        let acked = self.acked.entry(room.to_string()).or_default();
        if !acked.insert(id.to_string()) {
            return false;
        }
        if acked.len() > MAX_CACHED_MESSAGES {
            let cached: HashSet<&str> = self
                .cache
                .messages(room)
                .iter()
                .filter_map(|m| m.id.as_deref())
                .collect();
            acked.retain(|a| cached.contains(a.as_str()));
        }
        true
    }

    fn is_from_other(&self, frame: &Frame) -> bool {
        frame.kind == FrameType::Chat
            && frame
                .sender_id
                .as_deref()
                .is_some_and(|s| s != self.user_id)
    }

    /// Fold a frame received on the channel of `room`.
    ///
    /// Returns the events to publish and, for a chat from someone else that
    /// nothing has acknowledged yet, the `delivered` acknowledgement to send
    /// back. A copy that already arrived through the presence bridge does not
    /// count as acknowledged.
    pub fn apply_room_frame(
        &mut self,
        room: &str,
        mut frame: Frame,
    ) -> (Vec<ClientEvent>, Option<Frame>) {
        let room = frame.room_id.clone().unwrap_or_else(|| room.to_string());
        let mut events = Vec::new();
        let mut ack = None;
        match frame.kind {
            FrameType::History => {
                let messages = frame.messages.take().unwrap_or_default();
                self.cache.replace_history(&room, messages);
                events.push(ClientEvent::History {
                    count: self.cache.messages(&room).len(),
                    room,
                });
            }
            FrameType::Chat | FrameType::System | FrameType::Nudge => {
                if frame.timestamp.is_none() {
                    frame.timestamp = Some(now_millis());
                }
                if let Some(sender) = frame.sender_id.as_deref() {
                    self.typing.clear(&room, sender);
                }
                if self.is_from_other(&frame)
                    && let Some(id) = frame.id.as_deref()
                    && self.first_ack(&room, id)
                {
                    ack = Some(Frame::ack(id, DeliveryStatus::Delivered));
                }
                if self.cache.merge(&room, frame.clone()) {
                    events.push(ClientEvent::Message { room, frame });
                }
            }
            FrameType::Typing => {
                if let (Some(sender), Some(is_typing)) =
                    (frame.sender_id.as_deref(), frame.is_typing)
                    && sender != self.user_id
                {
                    self.typing.observe(&room, sender, is_typing);
                }
            }
            FrameType::Participants => {
                let participants = frame.participants.unwrap_or_default();
                self.participants.insert(room.clone(), participants.clone());
                events.push(ClientEvent::Participants { room, participants });
            }
            FrameType::DeliveryStatus => {
                if let (Some(id), Some(status)) = (frame.ack_id.clone(), frame.delivery_status())
                    && self.cache.apply_status(&room, &id, status)
                {
                    events.push(ClientEvent::StatusChanged { room, id, status });
                }
            }
            FrameType::Error => events.push(ClientEvent::Error {
                channel: ChannelKey::Room(room),
                content: frame.content.unwrap_or_default(),
            }),
            _ => {}
        }
        (events, ack)
    }

    /// Fold a frame received on the presence channel.
    ///
    /// A bridged chat from someone else is acknowledged as delivered when its
    /// room is among `open_rooms`; the returned ack goes out on that room's
    /// channel. Otherwise the room copy acknowledges it later.
    pub fn apply_presence_frame(
        &mut self,
        frame: Frame,
        open_rooms: &[String],
    ) -> (Vec<ClientEvent>, Option<(String, Frame)>) {
        if self.roster.apply(&frame) {
            return (vec![ClientEvent::Presence], None);
        }
        match frame.kind {
            FrameType::MessageNotification => {
                let Some(mut message) = frame.message.map(|m| *m) else {
                    return (Vec::new(), None);
                };
                if message.timestamp.is_none() {
                    message.timestamp = Some(now_millis());
                }
                let room = message
                    .room_id
                    .clone()
                    .unwrap_or_else(|| FALLBACK_ROOM.to_string());
                let mut ack = None;
                if open_rooms.contains(&room)
                    && self.is_from_other(&message)
                    && let Some(id) = message.id.as_deref()
                    && self.first_ack(&room, id)
                {
                    ack = Some((room.clone(), Frame::ack(id, DeliveryStatus::Delivered)));
                }
                let events = if self.cache.merge(&room, message.clone()) {
                    vec![ClientEvent::Message {
                        room,
                        frame: message,
                    }]
                } else {
                    Vec::new()
                };
                (events, ack)
            }
            FrameType::Error => (
                vec![ClientEvent::Error {
                    channel: ChannelKey::Presence,
                    content: frame.content.unwrap_or_default(),
                }],
                None,
            ),
            _ => (Vec::new(), None),
        }
    }

    /// Apply buffered typing updates; an event per room that changed.
    pub fn flush_typing(&mut self, now: Instant, rooms: &[String]) -> Vec<ClientEvent> {
        if !self.typing.flush(now) {
            return Vec::new();
        }
        rooms
            .iter()
            .map(|room| ClientEvent::Typing {
                room: room.clone(),
                users: self.typing.typing_in(room),
            })
            .collect()
    }

    /// Read acknowledgements for everything unread from others in `room`,
    /// marking them read locally.
    pub fn mark_room_read(&mut self, room: &str) -> Vec<Frame> {
        let ids = self.cache.unread_from_others(room, &self.user_id);
        ids.into_iter()
            .map(|id| {
                self.cache.apply_status(room, &id, DeliveryStatus::Read);
                Frame::ack(id, DeliveryStatus::Read)
            })
            .collect()
    }

    pub fn messages(&self, room: &str) -> &[Frame] {
        self.cache.messages(room)
    }

    pub fn typing_in(&self, room: &str) -> Vec<String> {
        self.typing.typing_in(room)
    }

    pub fn participants(&self, room: &str) -> &[ParticipantInfo] {
        self.participants
            .get(room)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn roster(&self) -> Vec<ParticipantInfo> {
        self.roster.users().cloned().collect()
    }
}
