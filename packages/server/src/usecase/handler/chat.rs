use std::{sync::Arc, time::Duration};

use hiroba_shared::Frame;

use super::{MessageHandler, RoomContext, publish_message};
use crate::{
    domain::{Message, MessageContent, MessageIdFactory, UserDirectory, UserId},
    usecase::{bot::detect_bot, error::HandlerError, rate_limiter::Throttle},
};

/// Minimum interval between two chat messages of one user.
pub const CHAT_INTERVAL: Duration = Duration::from_millis(200);

/// Handles `chat` frames.
pub struct ChatHandler {
    throttle: Throttle,
    directory: Arc<UserDirectory>,
}

impl ChatHandler {
    pub fn new(directory: Arc<UserDirectory>) -> Self {
        Self {
            throttle: Throttle::new(CHAT_INTERVAL),
            directory,
        }
    }
}

impl MessageHandler for ChatHandler {
    fn handle(&mut self, frame: &Frame, ctx: &mut dyn RoomContext) -> Result<(), HandlerError> {
        let content = MessageContent::new(frame.content.clone().unwrap_or_default())
            .map_err(|e| HandlerError::Validation(e.to_string()))?;

        let sender = ctx.sender().user_id.clone();
        if !self.throttle.try_acquire(&sender, ctx.now()) {
            return Err(HandlerError::Throttled);
        }

        let message = Message::chat(
            MessageIdFactory::from_client(frame.id.as_deref()),
            ctx.room().clone(),
            sender.clone(),
            ctx.sender().display_name.clone(),
            content.into_string(),
            ctx.timestamp(),
        );

        if let Some(recipient) = ctx.room().counterpart(&sender) {
            ctx.notify_user(&recipient, &message);
        }

        let bot = detect_bot(ctx.room(), &sender, &message.content, &self.directory);
        let prompt = message.content.clone();
        publish_message(ctx, message);

        if let Some(bot) = bot {
            tracing::debug!(room = %ctx.room(), bot = %bot.id, "bot reply requested");
            ctx.request_bot_reply(bot, prompt);
        }
        Ok(())
    }

    fn release(&mut self, user: &UserId) {
        self.throttle.release(user);
    }
}
