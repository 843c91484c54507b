//! Room message handlers.
//!
//! Each inbound frame type a room accepts is served by one [`MessageHandler`].
//! Handlers never touch sockets or storage directly; everything they may do
//! to the room goes through the narrow [`RoomContext`] capability set the
//! room actor hands them for the duration of one frame.

mod ack;
mod chat;
mod nudge;
mod presence;
mod typing;
mod wink;

use std::{collections::HashMap, sync::Arc};

use hiroba_shared::{Frame, FrameType, PresenceStatus};
use tokio::time::Instant;

use crate::{
    domain::{
        ConnectionId, ConnectionMetadata, Message, MessageLog, RoomKey, Timestamp, UserDirectory,
        UserId, UserProfile,
    },
    infrastructure::dto::websocket::message_frame,
};

pub use ack::AckHandler;
pub use chat::ChatHandler;
pub use nudge::NudgeHandler;
pub use presence::PresenceHandler;
pub use typing::TypingHandler;
pub use wink::WinkHandler;

use super::error::HandlerError;

/// Capabilities a handler gets while processing one frame.
pub trait RoomContext {
    fn room(&self) -> &RoomKey;

    /// Metadata of the connection the frame arrived on.
    fn sender(&self) -> &ConnectionMetadata;

    fn now(&self) -> Instant;

    /// Wall-clock timestamp for new messages.
    fn timestamp(&self) -> Timestamp;

    /// Send a frame to every connection of the room except `exclude`.
    fn broadcast(&mut self, frame: Frame, exclude: Option<ConnectionId>);

    /// Mark the log dirty; the actor coalesces writes.
    fn schedule_persist(&mut self);

    fn append_to_log(&mut self, message: Message);

    fn log(&self) -> &MessageLog;

    fn log_mut(&mut self) -> &mut MessageLog;

    /// Change the sender connection's display name and/or status.
    fn update_sender(&mut self, display_name: Option<String>, status: Option<PresenceStatus>);

    fn broadcast_participants(&mut self);

    /// Forward a message to every presence connection of `user`.
    fn notify_user(&mut self, user: &UserId, message: &Message);

    /// Start an automated reply from `bot` to the sender's `prompt`.
    fn request_bot_reply(&mut self, bot: UserProfile, prompt: String);
}

/// Handler of one or more inbound frame types.
pub trait MessageHandler: Send {
    fn handle(&mut self, frame: &Frame, ctx: &mut dyn RoomContext) -> Result<(), HandlerError>;

    /// Drop per-user state once the user's last connection has left.
    fn release(&mut self, _user: &UserId) {}
}

/// Append, persist, broadcast and bridge a new message to its sender's
/// other sessions.
pub(crate) fn publish_message(ctx: &mut dyn RoomContext, message: Message) {
    let frame = message_frame(&message);
    let sender = message.sender.clone();
    ctx.notify_user(&sender, &message);
    ctx.append_to_log(message);
    ctx.schedule_persist();
    ctx.broadcast(frame, None);
}

/// Dispatch table from frame type to handler.
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn MessageHandler>>,
    routes: HashMap<FrameType, usize>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            routes: HashMap::new(),
        }
    }

    /// Register `handler` for every type in `kinds`.
    pub fn register(&mut self, kinds: &[FrameType], handler: Box<dyn MessageHandler>) {
        let index = self.handlers.len();
        self.handlers.push(handler);
        for kind in kinds {
            self.routes.insert(*kind, index);
        }
    }

    /// The handler set every room runs with.
    pub fn standard(directory: Arc<UserDirectory>) -> Self {
        let mut registry = Self::new();
        registry.register(&[FrameType::Chat], Box::new(ChatHandler::new(directory)));
        registry.register(&[FrameType::Nudge], Box::new(NudgeHandler::new()));
        registry.register(&[FrameType::Wink], Box::new(WinkHandler::new()));
        registry.register(&[FrameType::Typing], Box::new(TypingHandler));
        registry.register(
            &[FrameType::Ack, FrameType::DeliveryStatus],
            Box::new(AckHandler),
        );
        registry.register(&[FrameType::Presence], Box::new(PresenceHandler));
        registry
    }

    pub fn get_mut(&mut self, kind: FrameType) -> Option<&mut Box<dyn MessageHandler>> {
        let index = *self.routes.get(&kind)?;
        self.handlers.get_mut(index)
    }

    pub fn release(&mut self, user: &UserId) {
        for handler in &mut self.handlers {
            handler.release(user);
        }
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
