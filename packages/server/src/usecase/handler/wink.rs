use std::time::Duration;

use hiroba_shared::Frame;

use super::{MessageHandler, RoomContext, publish_message};
use crate::{
    domain::{Message, MessageIdFactory, UserId},
    usecase::{error::HandlerError, rate_limiter::Throttle},
};

/// Minimum interval between two winks of one user.
pub const WINK_INTERVAL: Duration = Duration::from_secs(5);

/// Handles `wink` frames.
pub struct WinkHandler {
    throttle: Throttle,
}

impl WinkHandler {
    pub fn new() -> Self {
        Self {
            throttle: Throttle::new(WINK_INTERVAL),
        }
    }
}

impl Default for WinkHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHandler for WinkHandler {
    fn handle(&mut self, frame: &Frame, ctx: &mut dyn RoomContext) -> Result<(), HandlerError> {
        let wink_id = frame
            .wink_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| HandlerError::Validation("winkId is required".to_string()))?;

        let sender = ctx.sender().user_id.clone();
        if !self.throttle.try_acquire(&sender, ctx.now()) {
            return Err(HandlerError::Throttled);
        }

        let message = Message::wink(
            MessageIdFactory::from_client(frame.id.as_deref()),
            ctx.room().clone(),
            sender,
            ctx.sender().display_name.clone(),
            wink_id.to_string(),
            ctx.timestamp(),
        );
        publish_message(ctx, message);
        Ok(())
    }

    fn release(&mut self, user: &UserId) {
        self.throttle.release(user);
    }
}
