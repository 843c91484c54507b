//! WebSocket integration tests.
//!
//! Room and presence channels exercised end to end through real sockets.

mod fixtures;
use fixtures::{TestServer, next_frame, send_frame, wait_for};
use hiroba_shared::{DeliveryStatus, Frame, FrameType};

fn chat(id: &str, content: &str) -> Frame {
    Frame {
        id: Some(id.to_string()),
        content: Some(content.to_string()),
        ..Frame::new(FrameType::Chat)
    }
}

#[tokio::test]
async fn test_chat_is_broadcast_and_ack_reaches_sender() {
    // テスト項目: チャットが相手に届き、相手の delivered ack が送信者に delivery_status として届く
    // given (前提条件):
    let server = TestServer::start().await;
    let mut u1 = server.connect_room("general", "alice").await;
    wait_for(&mut u1, FrameType::Participants).await.unwrap();
    let mut u2 = server.connect_room("general", "bob").await;
    wait_for(&mut u2, FrameType::Participants).await.unwrap();

    // when (操作):
    send_frame(&mut u1, &chat("m-a", "hi")).await;
    let received = wait_for(&mut u2, FrameType::Chat).await.unwrap();
    send_frame(&mut u2, &Frame::ack("m-a", DeliveryStatus::Delivered)).await;

    // then (期待する結果):
    assert_eq!(received.sender_id.as_deref(), Some("alice"));
    assert_eq!(received.content.as_deref(), Some("hi"));
    let update = wait_for(&mut u1, FrameType::DeliveryStatus).await.unwrap();
    assert_eq!(update.ack_id.as_deref(), Some("m-a"));
    assert_eq!(update.status.as_deref(), Some("delivered"));
}

#[tokio::test]
async fn test_direct_message_bridged_to_other_session() {
    // テスト項目: DM で送ったメッセージが、DM に接続していない送信者の別タブへ message_notification で届く
    // given (前提条件):
    let server = TestServer::start().await;
    let mut tab_b = server.connect_presence("alice").await;
    wait_for(&mut tab_b, FrameType::PresenceFullSync).await.unwrap();
    let mut tab_a = server.connect_room("dm_alice__bob", "alice").await;
    wait_for(&mut tab_a, FrameType::History).await.unwrap();

    // when (操作):
    send_frame(&mut tab_a, &chat("dm-1", "secret")).await;

    // then (期待する結果):
    let bridged = wait_for(&mut tab_b, FrameType::MessageNotification)
        .await
        .unwrap();
    let inner = bridged.message.unwrap();
    assert_eq!(inner.id.as_deref(), Some("dm-1"));
    assert_eq!(inner.room_id.as_deref(), Some("dm_alice__bob"));
    assert_eq!(inner.content.as_deref(), Some("secret"));
}

#[tokio::test]
async fn test_direct_room_rejects_third_party() {
    // テスト項目: DM のキーに含まれないユーザーはキーの並び順によらず 403 で拒否される
    // given (前提条件):
    let server = TestServer::start().await;

    for room in ["dm_alice__bob", "dm_bob__alice"] {
        // when (操作):
        let result = tokio_tungstenite::connect_async(server.room_url(room, "charlie")).await;

        // then (期待する結果):
        match result {
            Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                assert_eq!(response.status(), 403);
            }
            other => panic!("expected HTTP 403, got {:?}", other.err()),
        }
    }
}

#[tokio::test]
async fn test_invalid_session_is_unauthorized() {
    // テスト項目: 無効なセッションでの接続は 401 で拒否される
    let server = TestServer::start().await;
    let url = server
        .room_url("general", "alice")
        .replace("token-alice", "forged");

    let result = tokio_tungstenite::connect_async(url).await;

    match result {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 401);
        }
        other => panic!("expected HTTP 401, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn test_invalid_frame_keeps_connection_open() {
    // テスト項目: 不正なフレームにはエラーが返り、その後も接続を使い続けられる
    // given (前提条件):
    let server = TestServer::start().await;
    let mut ws = server.connect_room("music", "alice").await;
    wait_for(&mut ws, FrameType::Participants).await.unwrap();

    // when (操作):
    use futures_util::SinkExt;
    ws.send(tokio_tungstenite::tungstenite::Message::Text(
        "not json".into(),
    ))
    .await
    .unwrap();
    let error = next_frame(&mut ws).await.unwrap();
    send_frame(&mut ws, &chat("after-error", "still here")).await;

    // then (期待する結果):
    assert_eq!(error.kind, FrameType::Error);
    assert_eq!(error.content.as_deref(), Some("Invalid payload"));
    let echoed = wait_for(&mut ws, FrameType::Chat).await.unwrap();
    assert_eq!(echoed.id.as_deref(), Some("after-error"));
}

#[tokio::test]
async fn test_presence_offline_only_after_last_session() {
    // テスト項目: 2 つのセッションのうち 1 つを閉じても online のまま、最後の 1 つで offline になる
    // given (前提条件):
    let server = TestServer::start().await;
    let mut observer = server.connect_presence("bob").await;
    wait_for(&mut observer, FrameType::PresenceFullSync)
        .await
        .unwrap();
    let mut first = server.connect_presence("alice").await;
    wait_for(&mut first, FrameType::PresenceFullSync).await.unwrap();
    let mut second = server.connect_presence("alice").await;
    wait_for(&mut second, FrameType::PresenceFullSync).await.unwrap();

    // when (操作):
    first.close(None).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let after_first = server.state.presence.online_users().await.unwrap();
    second.close(None).await.unwrap();

    // then (期待する結果):
    assert!(after_first.iter().any(|u| u.id == "alice"));
    let offline = loop {
        let frame = wait_for(&mut observer, FrameType::PresenceUpdate)
            .await
            .unwrap();
        if frame.user_id.as_deref() == Some("alice") && frame.status.as_deref() == Some("offline")
        {
            break frame;
        }
    };
    assert_eq!(offline.status.as_deref(), Some("offline"));
    let online = server.state.presence.online_users().await.unwrap();
    assert!(!online.iter().any(|u| u.id == "alice"));
}
