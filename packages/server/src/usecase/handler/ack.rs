use hiroba_shared::{Frame, FrameType};

use super::{MessageHandler, RoomContext};
use crate::usecase::error::HandlerError;

/// Handles `ack` (and its alias `delivery_status`) frames.
///
/// A message's delivery status only moves forward; stale or repeated acks
/// are dropped without a broadcast.
pub struct AckHandler;

impl MessageHandler for AckHandler {
    fn handle(&mut self, frame: &Frame, ctx: &mut dyn RoomContext) -> Result<(), HandlerError> {
        let ack_id = frame
            .ack_id
            .as_deref()
            .ok_or_else(|| HandlerError::Validation("ackId is required".to_string()))?;
        let requested = frame
            .delivery_status()
            .ok_or_else(|| HandlerError::Validation("a valid status is required".to_string()))?;

        let message = ctx
            .log_mut()
            .find_mut(ack_id)
            .ok_or_else(|| HandlerError::UnknownMessage(ack_id.to_string()))?;
        message
            .advance_status(requested)
            .map_err(|_| HandlerError::AckConflict)?;

        let out = Frame {
            room_id: Some(ctx.room().to_string()),
            ack_id: Some(ack_id.to_string()),
            status: Some(requested.to_string()),
            sender_id: Some(ctx.sender().user_id.to_string()),
            timestamp: Some(ctx.timestamp().value()),
            ..Frame::new(FrameType::DeliveryStatus)
        };
        ctx.broadcast(out, None);
        ctx.schedule_persist();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hiroba_shared::DeliveryStatus;

    use super::{super::testing::FakeRoomContext, *};
    use crate::domain::{Message, MessageId, Timestamp, UserId};

    fn context_with_message() -> FakeRoomContext {
        let mut ctx = FakeRoomContext::new("general", "bob");
        ctx.log.push(Message::chat(
            MessageId::new("m1".to_string()).unwrap(),
            ctx.room.clone(),
            UserId::new("alice".to_string()).unwrap(),
            "Alice".to_string(),
            "hello".to_string(),
            Timestamp::new(500),
        ));
        ctx
    }

    #[test]
    fn test_ack_advances_status_and_broadcasts() {
        // テスト項目: 既読通知で配信状態が進み、delivery_status が全員に配信される
        // given (前提条件):
        let mut handler = AckHandler;
        let mut ctx = context_with_message();

        // when (操作):
        let result = handler.handle(&Frame::ack("m1", DeliveryStatus::Read), &mut ctx);

        // then (期待する結果):
        assert!(result.is_ok());
        assert_eq!(
            ctx.log.messages()[0].status(),
            DeliveryStatus::Read
        );
        let frames = ctx.frames_of(FrameType::DeliveryStatus);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].ack_id.as_deref(), Some("m1"));
        assert_eq!(frames[0].status.as_deref(), Some("read"));
        assert_eq!(frames[0].sender_id.as_deref(), Some("bob"));
        assert_eq!(ctx.persist_requests, 1);
    }

    #[test]
    fn test_ack_never_regresses() {
        // テスト項目: read の後の delivered は無視され、配信もされない
        // given (前提条件):
        let mut handler = AckHandler;
        let mut ctx = context_with_message();
        handler
            .handle(&Frame::ack("m1", DeliveryStatus::Read), &mut ctx)
            .unwrap();

        // when (操作):
        let late = handler.handle(&Frame::ack("m1", DeliveryStatus::Delivered), &mut ctx);
        let repeat = handler.handle(&Frame::ack("m1", DeliveryStatus::Read), &mut ctx);

        // then (期待する結果):
        assert_eq!(late, Err(HandlerError::AckConflict));
        assert_eq!(repeat, Err(HandlerError::AckConflict));
        assert_eq!(ctx.frames_of(FrameType::DeliveryStatus).len(), 1);
        assert_eq!(
            ctx.log.messages()[0].status(),
            DeliveryStatus::Read
        );
    }

    #[test]
    fn test_ack_unknown_message() {
        // テスト項目: 履歴にないメッセージへの ack は UnknownMessage
        let mut handler = AckHandler;
        let mut ctx = context_with_message();

        let result = handler.handle(&Frame::ack("missing", DeliveryStatus::Read), &mut ctx);

        assert_eq!(
            result,
            Err(HandlerError::UnknownMessage("missing".to_string()))
        );
        assert!(ctx.broadcasts.is_empty());
    }

    #[test]
    fn test_ack_requires_id_and_status() {
        // テスト項目: ackId や status が欠けた ack は Validation エラー
        let mut handler = AckHandler;
        let mut ctx = context_with_message();
        let mut no_status = Frame::new(FrameType::Ack);
        no_status.ack_id = Some("m1".to_string());
        let mut bad_status = no_status.clone();
        bad_status.status = Some("seen".to_string());

        assert!(matches!(
            handler.handle(&Frame::new(FrameType::Ack), &mut ctx),
            Err(HandlerError::Validation(_))
        ));
        assert!(matches!(
            handler.handle(&no_status, &mut ctx),
            Err(HandlerError::Validation(_))
        ));
        assert!(matches!(
            handler.handle(&bad_status, &mut ctx),
            Err(HandlerError::Validation(_))
        ));
    }

    #[test]
    fn test_delivery_status_alias_is_accepted() {
        // テスト項目: delivery_status 型のフレームも ack として扱われる
        let mut handler = AckHandler;
        let mut ctx = context_with_message();
        let frame = Frame {
            kind: FrameType::DeliveryStatus,
            ..Frame::ack("m1", DeliveryStatus::Delivered)
        };

        handler.handle(&frame, &mut ctx).unwrap();

        assert_eq!(
            ctx.log.messages()[0].status(),
            DeliveryStatus::Delivered
        );
    }
}
