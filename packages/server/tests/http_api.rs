//! HTTP API integration tests.
//!
//! Tests for REST API endpoints (health check, rooms, presence, users,
//! notify, login / logout).

mod fixtures;
use fixtures::{TestServer, next_frame, wait_for};
use hiroba_shared::FrameType;

#[tokio::test]
async fn test_health_endpoint() {
    // テスト項目: /api/health エンドポイントが正常に動作する
    // given (前提条件):
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    // when (操作):
    let response = client
        .get(format!("{}/api/health", server.base_url()))
        .send()
        .await
        .expect("Failed to send request");

    // then (期待する結果):
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_rooms_list_endpoint() {
    // テスト項目: /api/rooms エンドポイントが公開ルームの一覧を返す
    // given (前提条件):
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    // when (操作):
    let response = client
        .get(format!("{}/api/rooms", server.base_url()))
        .send()
        .await
        .expect("Failed to send request");

    // then (期待する結果):
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    let rooms = body.as_array().expect("Response should be an array");
    let ids: Vec<&str> = rooms.iter().filter_map(|r| r["id"].as_str()).collect();
    assert_eq!(ids, vec!["general", "music"]);
    assert!(rooms.iter().all(|r| r["active"] == false));
}

#[tokio::test]
async fn test_room_detail_endpoint_reports_live_room() {
    // テスト項目: /api/rooms/{room_id} が稼働中ルームの参加者を返す
    // given (前提条件):
    let server = TestServer::start().await;
    let mut alice = server.connect_room("general", "alice").await;
    wait_for(&mut alice, FrameType::Participants).await.unwrap();
    let client = reqwest::Client::new();

    // when (操作):
    let response = client
        .get(format!("{}/api/rooms/general", server.base_url()))
        .send()
        .await
        .expect("Failed to send request");

    // then (期待する結果):
    assert_eq!(response.status(), 200);

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["id"], "general");
    assert_eq!(body["connectionCount"], 1);
    let participants = body["participants"].as_array().unwrap();
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0]["userId"], "alice");
    assert_eq!(participants[0]["status"], "online");
}

#[tokio::test]
async fn test_room_detail_endpoint_not_found() {
    // テスト項目: 公開されておらず稼働もしていないルームは 404 を返す
    // given (前提条件):
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    // when (操作):
    let response = client
        .get(format!("{}/api/rooms/nonexistent", server.base_url()))
        .send()
        .await
        .expect("Failed to send request");

    // then (期待する結果):
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_users_endpoint_merges_presence() {
    // テスト項目: /api/users はプレゼンス接続中のユーザーを online、ボットを常に online で返す
    // given (前提条件):
    let server = TestServer::start().await;
    let mut alice = server.connect_presence("alice").await;
    wait_for(&mut alice, FrameType::PresenceFullSync).await.unwrap();
    let client = reqwest::Client::new();

    // when (操作):
    let body: serde_json::Value = client
        .get(format!("{}/api/users", server.base_url()))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");

    // then (期待する結果):
    let users = body.as_array().unwrap();
    let status_of = |id: &str| {
        users
            .iter()
            .find(|u| u["id"] == id)
            .map(|u| u["status"].clone())
            .unwrap()
    };
    assert_eq!(status_of("alice"), "online");
    assert_eq!(status_of("bob"), "offline");
    assert_eq!(status_of("bot-hal"), "online");
}

#[tokio::test]
async fn test_notify_endpoint_reaches_presence_sessions() {
    // テスト項目: /api/notify で送ったメッセージがユーザーのプレゼンス接続に届く
    // given (前提条件):
    let server = TestServer::start().await;
    let mut bob = server.connect_presence("bob").await;
    wait_for(&mut bob, FrameType::PresenceFullSync).await.unwrap();
    let client = reqwest::Client::new();

    // when (操作):
    let response = client
        .post(format!("{}/api/notify", server.base_url()))
        .json(&serde_json::json!({
            "userId": "bob",
            "message": {"type": "chat", "id": "ext-1", "content": "ping from outside"}
        }))
        .send()
        .await
        .expect("Failed to send request");

    // then (期待する結果):
    assert_eq!(response.status(), 202);
    let frame = wait_for(&mut bob, FrameType::MessageNotification)
        .await
        .unwrap();
    let inner = frame.message.unwrap();
    assert_eq!(inner.id.as_deref(), Some("ext-1"));
}

#[tokio::test]
async fn test_login_then_connect_then_logout() {
    // テスト項目: ログインで発行したセッションで接続でき、ログアウト後は 401 になる
    // given (前提条件):
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    // when (操作):
    let login: serde_json::Value = client
        .post(format!("{}/api/auth/login", server.base_url()))
        .json(&serde_json::json!({"userId": "charlie"}))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse JSON");
    let session = login["sessionId"].as_str().unwrap().to_string();
    let url = format!(
        "ws://{}/api/ws/presence?sessionId={session}&userId=charlie",
        server.base_url().trim_start_matches("http://")
    );
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("Failed to connect");
    let greeting = next_frame(&mut ws).await.unwrap();

    let logout = client
        .post(format!("{}/api/auth/logout", server.base_url()))
        .json(&serde_json::json!({"sessionId": session}))
        .send()
        .await
        .expect("Failed to send request");
    let rejected = tokio_tungstenite::connect_async(&url).await;

    // then (期待する結果):
    assert_eq!(login["displayName"], "Charlie");
    assert_eq!(greeting.kind, FrameType::System);
    assert_eq!(logout.status(), 204);
    match rejected {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 401);
        }
        other => panic!("expected HTTP 401, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn test_login_rejects_ambiguous_user_id() {
    // テスト項目: DM キーの区切りを含むユーザー ID ではログインできない
    // given (前提条件):
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    // when (操作):
    let response = client
        .post(format!("{}/api/auth/login", server.base_url()))
        .json(&serde_json::json!({"userId": "x__y"}))
        .send()
        .await
        .expect("Failed to send request");

    // then (期待する結果):
    assert_eq!(response.status(), 400);
}
