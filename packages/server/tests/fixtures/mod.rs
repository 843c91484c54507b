//! Test server fixture.
//!
//! Each test starts its own in-process server on an ephemeral port, with a
//! session pre-issued for every seeded user (`token-{user}`).

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use hiroba_server::{
    domain::{Identity, UserId},
    infrastructure::reply::CannedReplyGenerator,
    ui::{self, state::{AppState, StateConfig}},
};
use hiroba_shared::{Frame, FrameType};
use tokio::{net::TcpListener, net::TcpStream, sync::oneshot};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SEEDED_USERS: [(&str, &str); 3] = [
    ("alice", "Alice"),
    ("bob", "Bob"),
    ("charlie", "Charlie"),
];

/// Test server handle; the server shuts down on drop.
pub struct TestServer {
    port: u16,
    pub state: Arc<AppState>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let state = Arc::new(
            AppState::new(StateConfig::default(), Arc::new(CannedReplyGenerator))
                .expect("Failed to build state"),
        );
        for (user, name) in SEEDED_USERS {
            let identity = Identity {
                user_id: UserId::new(user.to_string()).unwrap(),
                display_name: name.to_string(),
            };
            state
                .sessions
                .insert(&format!("token-{user}"), &identity)
                .await
                .expect("Failed to seed session");
        }

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = oneshot::channel();
        let served = state.clone();
        tokio::spawn(async move {
            let _ = ui::serve(listener, served, async {
                let _ = rx.await;
            })
            .await;
        });

        Self {
            port,
            state,
            shutdown: Some(tx),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn room_url(&self, room: &str, user: &str) -> String {
        format!(
            "ws://127.0.0.1:{}/api/ws/room/{room}?sessionId=token-{user}&userId={user}",
            self.port
        )
    }

    pub fn presence_url(&self, user: &str) -> String {
        format!(
            "ws://127.0.0.1:{}/api/ws/presence?sessionId=token-{user}&userId={user}",
            self.port
        )
    }

    pub async fn connect_room(&self, room: &str, user: &str) -> WsClient {
        let (ws, _) = connect_async(self.room_url(room, user))
            .await
            .expect("Failed to connect to room");
        ws
    }

    pub async fn connect_presence(&self, user: &str) -> WsClient {
        let (ws, _) = connect_async(self.presence_url(user))
            .await
            .expect("Failed to connect to presence");
        ws
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn send_frame(ws: &mut WsClient, frame: &Frame) {
    ws.send(Message::Text(frame.encode().unwrap().into()))
        .await
        .expect("Failed to send frame");
}

/// Next text frame, or `None` after two seconds of silence.
pub async fn next_frame(ws: &mut WsClient) -> Option<Frame> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .ok()??
            .ok()?;
        if let Message::Text(text) = msg {
            return Frame::decode(text.as_str()).ok();
        }
    }
}

/// Skip frames until one of `kind` arrives.
pub async fn wait_for(ws: &mut WsClient, kind: FrameType) -> Option<Frame> {
    while let Some(frame) = next_frame(ws).await {
        if frame.kind == kind {
            return Some(frame);
        }
    }
    None
}
