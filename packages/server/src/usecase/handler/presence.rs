use hiroba_shared::Frame;

use super::{MessageHandler, RoomContext};
use crate::{domain::DisplayName, usecase::error::HandlerError};

/// Handles in-room `presence` frames (display name / status changes).
pub struct PresenceHandler;

impl MessageHandler for PresenceHandler {
    fn handle(&mut self, frame: &Frame, ctx: &mut dyn RoomContext) -> Result<(), HandlerError> {
        let display_name = frame
            .display_name
            .clone()
            .map(DisplayName::new)
            .transpose()
            .map_err(|e| HandlerError::Validation(e.to_string()))?
            .map(DisplayName::into_string);
        let status = match &frame.status {
            Some(raw) => Some(
                frame
                    .presence_status()
                    .ok_or_else(|| HandlerError::Validation(format!("unknown status '{raw}'")))?,
            ),
            None => None,
        };

        if display_name.is_none() && status.is_none() {
            return Ok(());
        }
        ctx.update_sender(display_name, status);
        ctx.broadcast_participants();
        Ok(())
    }
}
