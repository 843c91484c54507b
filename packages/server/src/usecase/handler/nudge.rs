use std::time::Duration;

use hiroba_shared::Frame;

use super::{MessageHandler, RoomContext, publish_message};
use crate::{
    domain::{Message, MessageIdFactory, UserId},
    usecase::{error::HandlerError, rate_limiter::Throttle},
};

/// Minimum interval between two nudges of one user.
pub const NUDGE_INTERVAL: Duration = Duration::from_secs(5);

/// Handles `nudge` frames.
pub struct NudgeHandler {
    throttle: Throttle,
}

impl NudgeHandler {
    pub fn new() -> Self {
        Self {
            throttle: Throttle::new(NUDGE_INTERVAL),
        }
    }
}

impl Default for NudgeHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHandler for NudgeHandler {
    fn handle(&mut self, frame: &Frame, ctx: &mut dyn RoomContext) -> Result<(), HandlerError> {
        let sender = ctx.sender().user_id.clone();
        if !self.throttle.try_acquire(&sender, ctx.now()) {
            return Err(HandlerError::Throttled);
        }

        let message = Message::nudge(
            MessageIdFactory::from_client(frame.id.as_deref()),
            ctx.room().clone(),
            sender,
            ctx.sender().display_name.clone(),
            ctx.timestamp(),
        );
        publish_message(ctx, message);
        Ok(())
    }

    fn release(&mut self, user: &UserId) {
        self.throttle.release(user);
    }
}
