//! Global presence actor.
//!
//! The one place that sees every live connection of a user across rooms,
//! browser tabs and devices. It computes who is online and delivers bridged
//! notifications to all sessions of a user.

use std::{collections::HashMap, time::Duration};

use hiroba_shared::{Frame, FrameType, ParticipantInfo, time::now_millis};
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};

use super::{
    ActorGone, Connection, HEARTBEAT_CLOSE_CODE, HEARTBEAT_CLOSE_REASON, OutboundSender, roster,
};
use crate::{
    domain::{ConnectionId, ConnectionMetadata, DisplayName, Identity, Timestamp, UserId},
    infrastructure::dto::websocket::{
        notification_frame, presence_full_sync_frame, presence_join_frame, presence_update_frame,
    },
};

/// Greeting sent to every new presence connection
pub const PRESENCE_GREETING: &str = "Connected to Global Presence";

/// Timing of the presence actor.
#[derive(Debug, Clone)]
pub struct PresenceSettings {
    pub sweep_interval: Duration,
    /// Connections silent for longer than this are closed by the sweep
    pub stale_after: Duration,
    /// Connections silent for longer than this are left out of snapshots
    pub roster_grace: Duration,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(90),
            roster_grace: Duration::from_secs(120),
        }
    }
}

#[derive(Debug)]
enum PresenceCommand {
    Join {
        identity: Identity,
        session_id: String,
        outbound: OutboundSender,
        reply: oneshot::Sender<ConnectionId>,
    },
    Inbound {
        connection: ConnectionId,
        text: String,
    },
    Leave {
        connection: ConnectionId,
    },
    Sweep,
    Notify {
        user: UserId,
        message: Frame,
    },
    OnlineUsers {
        reply: oneshot::Sender<Vec<ParticipantInfo>>,
    },
}

/// Address of the presence actor.
#[derive(Debug, Clone)]
pub struct PresenceHandle {
    tx: mpsc::UnboundedSender<PresenceCommand>,
}

impl PresenceHandle {
    /// Register a connection; frames for it are written to `outbound`.
    pub async fn join(
        &self,
        identity: Identity,
        session_id: String,
        outbound: OutboundSender,
    ) -> Result<ConnectionId, ActorGone> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PresenceCommand::Join {
                identity,
                session_id,
                outbound,
                reply,
            })
            .map_err(|_| ActorGone)?;
        rx.await.map_err(|_| ActorGone)
    }

    pub fn inbound(&self, connection: ConnectionId, text: String) -> Result<(), ActorGone> {
        self.tx
            .send(PresenceCommand::Inbound { connection, text })
            .map_err(|_| ActorGone)
    }

    pub fn leave(&self, connection: ConnectionId) {
        let _ = self.tx.send(PresenceCommand::Leave { connection });
    }

    /// Forward `message` (a room message frame) to every connection of `user`.
    pub fn notify(&self, user: &UserId, message: Frame) {
        if self
            .tx
            .send(PresenceCommand::Notify {
                user: user.clone(),
                message,
            })
            .is_err()
        {
            tracing::warn!(user = %user, "presence actor gone, notification dropped");
        }
    }

    /// Deduplicated roster of users seen within the grace window.
    pub async fn online_users(&self) -> Result<Vec<ParticipantInfo>, ActorGone> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(PresenceCommand::OnlineUsers { reply })
            .map_err(|_| ActorGone)?;
        rx.await.map_err(|_| ActorGone)
    }
}

/// The global presence actor.
pub struct PresenceActor {
    connections: HashMap<ConnectionId, Connection>,
    settings: PresenceSettings,
    sweep_armed: bool,
    tx: mpsc::UnboundedSender<PresenceCommand>,
}

impl PresenceActor {
    /// Start the actor on the current runtime.
    pub fn spawn(settings: PresenceSettings) -> PresenceHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = Self {
            connections: HashMap::new(),
            settings,
            sweep_armed: false,
            tx: tx.clone(),
        };
        tokio::spawn(actor.run(rx));
        PresenceHandle { tx }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<PresenceCommand>) {
        tracing::info!("presence actor started");
        while let Some(command) = rx.recv().await {
            self.handle(command);
        }
    }

    fn handle(&mut self, command: PresenceCommand) {
        match command {
            PresenceCommand::Join {
                identity,
                session_id,
                outbound,
                reply,
            } => {
                let id = self.join(identity, session_id, outbound);
                if reply.send(id).is_err() {
                    self.leave(id);
                }
            }
            PresenceCommand::Inbound { connection, text } => self.inbound(connection, &text),
            PresenceCommand::Leave { connection } => self.leave(connection),
            PresenceCommand::Sweep => self.sweep(),
            PresenceCommand::Notify { user, message } => self.notify(&user, message),
            PresenceCommand::OnlineUsers { reply } => {
                let _ = reply.send(self.online_users(Instant::now()));
            }
        }
    }

    fn join(
        &mut self,
        identity: Identity,
        session_id: String,
        outbound: OutboundSender,
    ) -> ConnectionId {
        let id = ConnectionId::generate();
        let meta = ConnectionMetadata::new(
            id,
            session_id,
            identity.user_id,
            identity.display_name,
            Instant::now(),
            Timestamp::new(now_millis()),
        );
        tracing::info!(connection = %id, user = %meta.user_id, "presence connected");

        let connection = Connection::new(meta, outbound);
        connection.send(&Frame::system(None, PRESENCE_GREETING, now_millis()));
        self.broadcast(
            &presence_join_frame(&connection.meta.user_id, &connection.meta.display_name),
            Some(id),
        );
        self.connections.insert(id, connection);

        let sync = presence_full_sync_frame(self.online_users(Instant::now()));
        if let Some(connection) = self.connections.get(&id) {
            connection.send(&sync);
        }
        self.arm_sweep();
        id
    }

    fn inbound(&mut self, id: ConnectionId, text: &str) {
        let Some(connection) = self.connections.get_mut(&id) else {
            return;
        };
        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(connection = %id, error = %e, "invalid presence frame");
                connection.send(&Frame::error("Invalid payload"));
                return;
            }
        };
        if let Err(reason) = frame.check_limits() {
            connection.send(&Frame::error(reason));
            return;
        }

        let now = Instant::now();
        connection.meta.last_seen = now;
        match frame.kind {
            FrameType::Ping => self.arm_sweep(),
            FrameType::PresenceUpdate => {
                let status = match frame.status.as_deref() {
                    Some(raw) => match frame.presence_status() {
                        Some(status) => Some(status),
                        None => {
                            connection.send(&Frame::error(format!("unknown status '{raw}'")));
                            return;
                        }
                    },
                    None => None,
                };
                let display_name = frame
                    .display_name
                    .and_then(|name| DisplayName::new(name).ok())
                    .map(DisplayName::into_string);
                if let Some(name) = display_name {
                    connection.meta.display_name = name;
                }
                if let Some(status) = status {
                    connection.meta.status = status;
                    connection.meta.status_updated_at = now;
                }
                let update = presence_update_frame(
                    &connection.meta.user_id,
                    &connection.meta.display_name,
                    connection.meta.status,
                );
                self.broadcast(&update, Some(id));
            }
            other => {
                connection.send(&Frame::error(format!(
                    "Unsupported frame type '{other}' on presence channel"
                )));
            }
        }
    }

    fn leave(&mut self, id: ConnectionId) {
        let Some(connection) = self.connections.remove(&id) else {
            return;
        };
        let user = connection.meta.user_id;
        tracing::info!(connection = %id, user = %user, "presence disconnected");
        let still_online = self.connections.values().any(|c| c.meta.user_id == user);
        if !still_online {
            let offline = presence_update_frame(
                &user,
                &connection.meta.display_name,
                hiroba_shared::PresenceStatus::Offline,
            );
            self.broadcast(&offline, None);
        }
    }

    fn sweep(&mut self) {
        self.sweep_armed = false;
        let now = Instant::now();
        let stale: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| now.duration_since(c.meta.last_seen) > self.settings.stale_after)
            .map(Connection::id)
            .collect();
        for id in stale {
            if let Some(connection) = self.connections.get(&id) {
                tracing::warn!(
                    connection = %id,
                    user = %connection.meta.user_id,
                    "presence heartbeat timeout"
                );
                connection.close(HEARTBEAT_CLOSE_CODE, HEARTBEAT_CLOSE_REASON);
            }
            self.leave(id);
        }
        self.arm_sweep();
    }

    fn notify(&self, user: &UserId, message: Frame) {
        let frame = notification_frame(message);
        let text = match frame.encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode notification");
                return;
            }
        };
        let mut delivered = 0;
        for connection in self
            .connections
            .values()
            .filter(|c| &c.meta.user_id == user)
        {
            connection.send_text(&text);
            delivered += 1;
        }
        tracing::debug!(user = %user, sessions = delivered, "notification bridged");
    }

    fn online_users(&self, now: Instant) -> Vec<ParticipantInfo> {
        roster(
            self.connections.values().map(|c| &c.meta),
            now,
            self.settings.roster_grace,
        )
    }

    fn broadcast(&self, frame: &Frame, exclude: Option<ConnectionId>) {
        let text = match frame.encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode frame");
                return;
            }
        };
        for connection in self.connections.values() {
            if Some(connection.id()) != exclude {
                connection.send_text(&text);
            }
        }
    }

    fn arm_sweep(&mut self) {
        if self.sweep_armed || self.connections.is_empty() {
            return;
        }
        self.sweep_armed = true;
        let tx = self.tx.clone();
        let interval = self.settings.sweep_interval;
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let _ = tx.send(PresenceCommand::Sweep);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{Outbound, OutboundReceiver};
    use hiroba_shared::PresenceStatus;

    fn identity(user: &str) -> Identity {
        Identity {
            user_id: UserId::new(user.to_string()).unwrap(),
            display_name: user.to_uppercase(),
        }
    }

    async fn connect(handle: &PresenceHandle, user: &str) -> (ConnectionId, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = handle
            .join(identity(user), format!("session-{user}"), tx)
            .await
            .unwrap();
        (id, rx)
    }

    fn drain(rx: &mut OutboundReceiver) -> Vec<Outbound> {
        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        items
    }

    fn frames(rx: &mut OutboundReceiver) -> Vec<Frame> {
        drain(rx)
            .into_iter()
            .filter_map(|item| match item {
                Outbound::Text(text) => Frame::decode(&text).ok(),
                Outbound::Close { .. } => None,
            })
            .collect()
    }

    fn status_of(users: &[ParticipantInfo], id: &str) -> Option<PresenceStatus> {
        users.iter().find(|u| u.id == id).map(|u| u.status)
    }

    #[tokio::test]
    async fn test_join_greets_and_syncs() {
        // テスト項目: 接続すると挨拶と全体同期が届き、他の接続に presence_join が配信される
        // given (前提条件):
        let handle = PresenceActor::spawn(PresenceSettings::default());
        let (_alice, mut alice_rx) = connect(&handle, "alice").await;
        frames(&mut alice_rx);

        // when (操作):
        let (_bob, mut bob_rx) = connect(&handle, "bob").await;
        handle.online_users().await.unwrap();

        // then (期待する結果):
        let bob_frames = frames(&mut bob_rx);
        assert_eq!(bob_frames[0].kind, FrameType::System);
        assert_eq!(bob_frames[0].content.as_deref(), Some(PRESENCE_GREETING));
        assert_eq!(bob_frames[1].kind, FrameType::PresenceFullSync);
        let roster = bob_frames[1].participants.clone().unwrap();
        let ids: Vec<&str> = roster.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob"]);

        let alice_frames = frames(&mut alice_rx);
        assert_eq!(alice_frames.len(), 1);
        assert_eq!(alice_frames[0].kind, FrameType::PresenceJoin);
        assert_eq!(alice_frames[0].user_id.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn test_multi_session_offline_only_after_last() {
        // テスト項目: 2 つ接続しているユーザーは 1 つ切断しても online のまま、最後の切断で offline になる
        // given (前提条件):
        let handle = PresenceActor::spawn(PresenceSettings::default());
        let (tab_a, _rx_a) = connect(&handle, "alice").await;
        let (tab_b, _rx_b) = connect(&handle, "alice").await;
        let (_watcher, mut watcher_rx) = connect(&handle, "bob").await;
        frames(&mut watcher_rx);

        // when (操作): 1 つ目を切断
        handle.leave(tab_a);
        let after_first = handle.online_users().await.unwrap();

        // then (期待する結果):
        assert_eq!(
            status_of(&after_first, "alice"),
            Some(PresenceStatus::Online)
        );
        assert!(frames(&mut watcher_rx).is_empty());

        // when (操作): 最後の接続を切断
        handle.leave(tab_b);
        let after_last = handle.online_users().await.unwrap();

        // then (期待する結果):
        assert_eq!(status_of(&after_last, "alice"), None);
        let updates = frames(&mut watcher_rx);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].kind, FrameType::PresenceUpdate);
        assert_eq!(updates[0].user_id.as_deref(), Some("alice"));
        assert_eq!(updates[0].status.as_deref(), Some("offline"));
    }

    #[tokio::test]
    async fn test_join_abandoned_by_caller_is_removed() {
        // テスト項目: 参加の返答を待たずに去った接続は登録されたまま残らず、offline が配信される
        // given (前提条件):
        let handle = PresenceActor::spawn(PresenceSettings::default());
        let (_watcher, mut watcher_rx) = connect(&handle, "bob").await;
        frames(&mut watcher_rx);
        let (outbound, _outbound_rx) = mpsc::unbounded_channel();
        let (reply, reply_rx) = oneshot::channel();
        drop(reply_rx);

        // when (操作):
        handle
            .tx
            .send(PresenceCommand::Join {
                identity: identity("alice"),
                session_id: "session-alice".to_string(),
                outbound,
                reply,
            })
            .unwrap();
        let users = handle.online_users().await.unwrap();

        // then (期待する結果):
        assert_eq!(status_of(&users, "alice"), None);
        let updates = frames(&mut watcher_rx);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].kind, FrameType::PresenceJoin);
        assert_eq!(updates[1].kind, FrameType::PresenceUpdate);
        assert_eq!(updates[1].status.as_deref(), Some("offline"));
    }

    #[tokio::test]
    async fn test_notify_reaches_every_session_of_user() {
        // テスト項目: notify は対象ユーザーの全接続に message_notification を届け、他人には届けない
        // given (前提条件):
        let handle = PresenceActor::spawn(PresenceSettings::default());
        let (_a, mut rx_a) = connect(&handle, "alice").await;
        let (_b, mut rx_b) = connect(&handle, "alice").await;
        let (_c, mut rx_c) = connect(&handle, "bob").await;
        frames(&mut rx_a);
        frames(&mut rx_b);
        frames(&mut rx_c);
        let message = Frame::system(Some("dm_alice__bob"), "hello", 1);

        // when (操作):
        handle.notify(&UserId::new("alice".to_string()).unwrap(), message.clone());
        handle.online_users().await.unwrap();

        // then (期待する結果):
        for rx in [&mut rx_a, &mut rx_b] {
            let received = frames(rx);
            assert_eq!(received.len(), 1);
            assert_eq!(received[0].kind, FrameType::MessageNotification);
            assert_eq!(received[0].message.as_deref(), Some(&message));
        }
        assert!(frames(&mut rx_c).is_empty());
    }

    #[tokio::test]
    async fn test_presence_update_broadcast_to_others() {
        // テスト項目: presence_update は送信元以外に配信され、スナップショットに反映される
        // given (前提条件):
        let handle = PresenceActor::spawn(PresenceSettings::default());
        let (alice, mut alice_rx) = connect(&handle, "alice").await;
        let (_bob, mut bob_rx) = connect(&handle, "bob").await;
        frames(&mut alice_rx);
        frames(&mut bob_rx);

        // when (操作):
        handle
            .inbound(
                alice,
                r#"{"type":"presence_update","status":"busy","displayName":"Al"}"#.to_string(),
            )
            .unwrap();
        let users = handle.online_users().await.unwrap();

        // then (期待する結果):
        assert_eq!(status_of(&users, "alice"), Some(PresenceStatus::Busy));
        assert!(frames(&mut alice_rx).is_empty());
        let bob_frames = frames(&mut bob_rx);
        assert_eq!(bob_frames.len(), 1);
        assert_eq!(bob_frames[0].display_name.as_deref(), Some("Al"));
        assert_eq!(bob_frames[0].status.as_deref(), Some("busy"));
    }

    #[tokio::test]
    async fn test_snapshot_prefers_latest_status_change() {
        // テスト項目: 同じユーザーの複数接続は最後に状態を変えた接続の値になる
        let handle = PresenceActor::spawn(PresenceSettings::default());
        let (tab_a, _rx_a) = connect(&handle, "alice").await;
        let (tab_b, _rx_b) = connect(&handle, "alice").await;

        handle
            .inbound(
                tab_b,
                r#"{"type":"presence_update","status":"away"}"#.to_string(),
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        handle
            .inbound(
                tab_a,
                r#"{"type":"presence_update","status":"busy"}"#.to_string(),
            )
            .unwrap();
        let users = handle.online_users().await.unwrap();

        assert_eq!(users.len(), 1);
        assert_eq!(status_of(&users, "alice"), Some(PresenceStatus::Busy));
    }

    #[tokio::test]
    async fn test_invalid_frame_gets_error() {
        // テスト項目: 不正なフレームにはエラーが返り、接続は維持される
        let handle = PresenceActor::spawn(PresenceSettings::default());
        let (alice, mut rx) = connect(&handle, "alice").await;
        frames(&mut rx);

        handle.inbound(alice, "not json".to_string()).unwrap();
        handle
            .inbound(alice, r#"{"type":"chat","content":"hi"}"#.to_string())
            .unwrap();
        let users = handle.online_users().await.unwrap();

        let errors = frames(&mut rx);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|f| f.kind == FrameType::Error));
        assert_eq!(errors[0].content.as_deref(), Some("Invalid payload"));
        assert_eq!(users.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_closes_silent_connection_and_marks_offline() {
        // テスト項目: 91 秒 ping のない接続は sweep で閉じられ、最後の接続なら offline になる
        // given (前提条件):
        let handle = PresenceActor::spawn(PresenceSettings::default());
        let (_alice, mut alice_rx) = connect(&handle, "alice").await;
        let (bob, mut bob_rx) = connect(&handle, "bob").await;
        drain(&mut alice_rx);
        drain(&mut bob_rx);

        // when (操作): bob だけが 30 秒ごとに ping を送る
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(30)).await;
            handle
                .inbound(bob, r#"{"type":"ping"}"#.to_string())
                .unwrap();
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        let users = handle.online_users().await.unwrap();

        // then (期待する結果):
        let alice_items = drain(&mut alice_rx);
        assert!(alice_items.contains(&Outbound::Close {
            code: 1011,
            reason: "Heartbeat timeout".to_string()
        }));
        assert_eq!(status_of(&users, "alice"), None);
        assert_eq!(status_of(&users, "bob"), Some(PresenceStatus::Online));
        let bob_frames = frames(&mut bob_rx);
        assert!(
            bob_frames
                .iter()
                .any(|f| f.kind == FrameType::PresenceUpdate
                    && f.user_id.as_deref() == Some("alice")
                    && f.status.as_deref() == Some("offline"))
        );
    }
}
