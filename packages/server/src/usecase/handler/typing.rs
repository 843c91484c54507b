use hiroba_shared::{Frame, FrameType};

use super::{MessageHandler, RoomContext};
use crate::usecase::error::HandlerError;

/// Handles `typing` frames. Nothing is stored.
pub struct TypingHandler;

impl MessageHandler for TypingHandler {
    fn handle(&mut self, frame: &Frame, ctx: &mut dyn RoomContext) -> Result<(), HandlerError> {
        let sender = ctx.sender();
        let out = Frame {
            room_id: Some(ctx.room().to_string()),
            sender_id: Some(sender.user_id.to_string()),
            display_name: Some(sender.display_name.clone()),
            is_typing: Some(frame.is_typing.unwrap_or(false)),
            ..Frame::new(FrameType::Typing)
        };
        let exclude = Some(sender.connection_id);
        ctx.broadcast(out, exclude);
        Ok(())
    }
}
