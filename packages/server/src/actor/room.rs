//! Per-room actor.
//!
//! One task per active room key owns the room's connections, message log,
//! throttles and timers. Every mutation arrives as a [`RoomCommand`] and is
//! applied on that task, one at a time. Timers (flush, sweep) and bot replies
//! run as separate tasks that report back through the same channel.

use std::{collections::HashMap, sync::Arc, time::Duration};

use hiroba_shared::{Frame, FrameType, ParticipantInfo, PresenceStatus, time::now_millis};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::Instant,
};

use super::{
    ActorGone, Connection, HEARTBEAT_CLOSE_CODE, HEARTBEAT_CLOSE_REASON, OutboundSender,
    presence::PresenceHandle, roster,
};
use crate::{
    domain::{
        ConnectionId, ConnectionMetadata, DEFAULT_HISTORY_LIMIT, Identity, KeyValueStore, Message,
        MessageIdFactory, MessageLog, MessageRepository, RoomKey, Timestamp, UserDirectory, UserId,
        UserProfile,
    },
    infrastructure::dto::websocket::{
        history_frame, message_frame, participants_frame, typing_frame,
    },
    usecase::{
        bot::{BotEvent, BotResponder, limit_message},
        handler::{HandlerRegistry, RoomContext},
        rate_limiter::{RateLimitPolicy, RateLimiter},
    },
};

/// Greeting sent to every new connection of a group room
pub const ROOM_GREETING: &str = "Connected to ChatRoom";

/// Frame types a room accepts from clients
const ROOM_INBOUND: [FrameType; 10] = [
    FrameType::Chat,
    FrameType::Nudge,
    FrameType::Wink,
    FrameType::Typing,
    FrameType::System,
    FrameType::Presence,
    FrameType::Ack,
    FrameType::DeliveryStatus,
    FrameType::History,
    FrameType::Ping,
];

/// Control frames that do not count against the rate limit
const RATE_EXEMPT: [FrameType; 3] = [FrameType::Ping, FrameType::Ack, FrameType::DeliveryStatus];

/// Timing and capacity of a room actor.
#[derive(Debug, Clone)]
pub struct RoomSettings {
    /// Messages kept in memory and replayed on join
    pub history_limit: usize,
    /// Delay between the first unsaved mutation and the flush
    pub flush_delay: Duration,
    pub sweep_interval: Duration,
    /// Connections silent for longer than this are closed by the sweep
    pub stale_after: Duration,
    /// Connections silent for longer than this are left out of snapshots
    pub roster_grace: Duration,
    pub rate_limit: RateLimitPolicy,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            flush_delay: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(90),
            roster_grace: Duration::from_secs(120),
            rate_limit: RateLimitPolicy::default(),
        }
    }
}

/// Collaborators shared by every room actor.
#[derive(Clone)]
pub struct RoomServices {
    pub messages: Arc<dyn MessageRepository>,
    pub store: Arc<dyn KeyValueStore>,
    pub presence: PresenceHandle,
    pub bots: Arc<BotResponder>,
    pub directory: Arc<UserDirectory>,
    pub settings: RoomSettings,
}

/// Point-in-time view of a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub key: RoomKey,
    pub participants: Vec<ParticipantInfo>,
    pub message_count: usize,
    pub connection_count: usize,
}

#[derive(Debug)]
enum RoomCommand {
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
    Flush,
    Bot(BotEvent),
    Snapshot {
        reply: oneshot::Sender<RoomSnapshot>,
    },
}

/// Address of a room actor.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    key: RoomKey,
    tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    pub fn key(&self) -> &RoomKey {
        &self.key
    }

    /// Whether the actor has stopped and a new one must be spawned.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Register an admitted connection; frames for it are written to `outbound`.
    pub async fn join(
        &self,
        identity: Identity,
        session_id: String,
        outbound: OutboundSender,
    ) -> Result<ConnectionId, ActorGone> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RoomCommand::Join {
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
            .send(RoomCommand::Inbound { connection, text })
            .map_err(|_| ActorGone)
    }

    pub fn leave(&self, connection: ConnectionId) {
        let _ = self.tx.send(RoomCommand::Leave { connection });
    }

    pub async fn snapshot(&self) -> Result<RoomSnapshot, ActorGone> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RoomCommand::Snapshot { reply })
            .map_err(|_| ActorGone)?;
        rx.await.map_err(|_| ActorGone)
    }
}

/// State owned by one room actor.
struct RoomState {
    key: RoomKey,
    connections: HashMap<ConnectionId, Connection>,
    log: MessageLog,
    dirty: bool,
    flush_scheduled: bool,
    sweep_armed: bool,
    bots_in_flight: usize,
    pending_save: Option<JoinHandle<()>>,
}

impl RoomState {
    fn broadcast(&self, frame: &Frame, exclude: Option<ConnectionId>) {
        let text = match frame.encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(room = %self.key, error = %e, "failed to encode frame");
                return;
            }
        };
        for connection in self.connections.values() {
            if Some(connection.id()) != exclude {
                connection.send_text(&text);
            }
        }
    }

    fn participants(&self, now: Instant, grace: Duration) -> Vec<ParticipantInfo> {
        roster(self.connections.values().map(|c| &c.meta), now, grace)
    }

    fn broadcast_participants(&self, now: Instant, grace: Duration) {
        let frame = participants_frame(&self.key, self.participants(now, grace));
        self.broadcast(&frame, None);
    }

    /// Mark the log dirty and start the flush timer unless one is pending.
    fn schedule_flush(&mut self, tx: &mpsc::UnboundedSender<RoomCommand>, delay: Duration) {
        self.dirty = true;
        if self.flush_scheduled {
            return;
        }
        self.flush_scheduled = true;
        let tx = tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(RoomCommand::Flush);
        });
    }
}

/// The actor serving one room key.
pub struct RoomActor {
    state: RoomState,
    handlers: HandlerRegistry,
    limiter: RateLimiter,
    services: RoomServices,
    tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomActor {
    /// Start an actor for `key` on the current runtime.
    ///
    /// The actor loads the most recent history before processing any
    /// command and stops by itself once idle.
    pub fn spawn(key: RoomKey, services: RoomServices) -> RoomHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let settings = &services.settings;
        let actor = Self {
            state: RoomState {
                key: key.clone(),
                connections: HashMap::new(),
                log: MessageLog::new(settings.history_limit),
                dirty: false,
                flush_scheduled: false,
                sweep_armed: false,
                bots_in_flight: 0,
                pending_save: None,
            },
            handlers: HandlerRegistry::standard(services.directory.clone()),
            limiter: RateLimiter::new(settings.rate_limit),
            services,
            tx: tx.clone(),
        };
        tokio::spawn(actor.run(rx));
        RoomHandle { key, tx }
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RoomCommand>) {
        self.activate().await;
        while let Some(command) = rx.recv().await {
            self.handle(command);
            if self.is_idle() {
                break;
            }
        }
        if let Some(save) = self.state.pending_save.take()
            && let Err(e) = save.await
        {
            tracing::error!(room = %self.state.key, error = %e, "final flush task failed");
        }
        tracing::info!(room = %self.state.key, "room deactivated");
    }

    async fn activate(&mut self) {
        let key = &self.state.key;
        let limit = self.services.settings.history_limit;
        match self.services.messages.load_recent(key, limit).await {
            Ok(messages) => {
                self.state.log = MessageLog::from_messages(messages, limit);
            }
            Err(e) => tracing::warn!(room = %key, error = %e, "failed to load history"),
        }
        if let Err(e) = self
            .services
            .store
            .put(&format!("room:{key}"), key.to_string(), None)
            .await
        {
            tracing::warn!(room = %key, error = %e, "failed to store room metadata");
        }
        tracing::info!(room = %key, messages = self.state.log.len(), "room activated");
    }

    fn is_idle(&self) -> bool {
        self.state.connections.is_empty()
            && !self.state.flush_scheduled
            && self.state.bots_in_flight == 0
    }

    fn handle(&mut self, command: RoomCommand) {
        match command {
            RoomCommand::Join {
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
            RoomCommand::Inbound { connection, text } => self.inbound(connection, &text),
            RoomCommand::Leave { connection } => self.leave(connection),
            RoomCommand::Sweep => self.sweep(),
            RoomCommand::Flush => self.flush(),
            RoomCommand::Bot(event) => self.bot_event(event),
            RoomCommand::Snapshot { reply } => {
                let snapshot = RoomSnapshot {
                    key: self.state.key.clone(),
                    participants: self
                        .state
                        .participants(Instant::now(), self.services.settings.roster_grace),
                    message_count: self.state.log.len(),
                    connection_count: self.state.connections.len(),
                };
                let _ = reply.send(snapshot);
            }
        }
    }

    fn join(
        &mut self,
        identity: Identity,
        session_id: String,
        outbound: OutboundSender,
    ) -> ConnectionId {
        let now = Instant::now();
        let timestamp = now_millis();
        let id = ConnectionId::generate();
        let meta = ConnectionMetadata::new(
            id,
            session_id,
            identity.user_id,
            identity.display_name,
            now,
            Timestamp::new(timestamp),
        );
        let key = self.state.key.clone();
        tracing::info!(room = %key, connection = %id, user = %meta.user_id, "connected");

        let group = !key.is_direct();
        let connection = Connection::new(meta, outbound);
        if group {
            connection.send(&Frame::system(Some(key.as_str()), ROOM_GREETING, timestamp));
        }
        connection.send(&history_frame(&key, self.state.log.messages()));
        let name = connection.meta.display_name.clone();
        self.state.connections.insert(id, connection);

        if group {
            let notice = Frame::system(
                Some(key.as_str()),
                format!("{name} joined the room."),
                timestamp,
            );
            self.state.broadcast(&notice, None);
            self.state
                .broadcast_participants(now, self.services.settings.roster_grace);
        }
        self.arm_sweep();
        id
    }

    fn inbound(&mut self, id: ConnectionId, text: &str) {
        let Some(connection) = self.state.connections.get_mut(&id) else {
            return;
        };
        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(
                    room = %self.state.key,
                    connection = %id,
                    error = %e,
                    "invalid frame"
                );
                connection.send(&Frame::error("Invalid payload"));
                return;
            }
        };
        if !ROOM_INBOUND.contains(&frame.kind) {
            connection.send(&Frame::error(format!(
                "Unsupported frame type '{}'",
                frame.kind
            )));
            return;
        }
        if let Err(reason) = frame.check_limits() {
            connection.send(&Frame::error(reason));
            return;
        }

        let now = Instant::now();
        let user = connection.meta.user_id.clone();
        if !RATE_EXEMPT.contains(&frame.kind) && !self.limiter.check(&user, now) {
            tracing::warn!(room = %self.state.key, user = %user, "rate limit exceeded");
            connection.send(&Frame::error("Rate limit exceeded."));
            return;
        }
        connection.meta.last_seen = now;
        let sender = connection.meta.clone();

        if frame.kind == FrameType::Ping {
            self.arm_sweep();
            return;
        }
        if let Some(message_id) = frame.id.as_deref()
            && self.state.log.contains(message_id)
        {
            tracing::debug!(room = %self.state.key, id = message_id, "duplicate frame ignored");
            return;
        }
        let Some(handler) = self.handlers.get_mut(frame.kind) else {
            tracing::debug!(
                room = %self.state.key,
                kind = %frame.kind,
                "frame without handler ignored"
            );
            return;
        };

        let mut ctx = ActorContext {
            state: &mut self.state,
            services: &self.services,
            tx: &self.tx,
            sender,
            now,
        };
        let result = handler.handle(&frame, &mut ctx);
        if let Err(err) = result {
            if err.is_reported() {
                tracing::debug!(
                    room = %self.state.key,
                    user = %user,
                    error = %err,
                    "frame rejected"
                );
                if let Some(connection) = self.state.connections.get(&id) {
                    connection.send(&Frame::error(err.to_string()));
                }
            } else {
                tracing::debug!(
                    room = %self.state.key,
                    user = %user,
                    error = %err,
                    "frame dropped"
                );
            }
        }
    }

    fn leave(&mut self, id: ConnectionId) {
        let Some(connection) = self.state.connections.remove(&id) else {
            return;
        };
        let user = connection.meta.user_id.clone();
        tracing::info!(room = %self.state.key, connection = %id, user = %user, "disconnected");
        if !self
            .state
            .connections
            .values()
            .any(|c| c.meta.user_id == user)
        {
            self.handlers.release(&user);
            self.limiter.release(&user);
        }
        if !self.state.key.is_direct() {
            let notice = Frame::system(
                Some(self.state.key.as_str()),
                format!("{} left the room.", connection.meta.display_name),
                now_millis(),
            );
            self.state.broadcast(&notice, None);
            self.state
                .broadcast_participants(Instant::now(), self.services.settings.roster_grace);
        }
    }

    fn sweep(&mut self) {
        self.state.sweep_armed = false;
        let now = Instant::now();
        let stale_after = self.services.settings.stale_after;
        let stale: Vec<ConnectionId> = self
            .state
            .connections
            .values()
            .filter(|c| now.duration_since(c.meta.last_seen) > stale_after)
            .map(Connection::id)
            .collect();
        for id in stale {
            if let Some(connection) = self.state.connections.get(&id) {
                tracing::warn!(room = %self.state.key, connection = %id, "heartbeat timeout");
                connection.close(HEARTBEAT_CLOSE_CODE, HEARTBEAT_CLOSE_REASON);
            }
            self.leave(id);
        }
        self.arm_sweep();
    }

    fn arm_sweep(&mut self) {
        if self.state.sweep_armed || self.state.connections.is_empty() {
            return;
        }
        self.state.sweep_armed = true;
        let tx = self.tx.clone();
        let interval = self.services.settings.sweep_interval;
        tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            let _ = tx.send(RoomCommand::Sweep);
        });
    }

    /// Write the whole in-memory log in the background.
    ///
    /// Saves are chained so an older snapshot never lands after a newer one.
    fn flush(&mut self) {
        self.state.flush_scheduled = false;
        if !self.state.dirty {
            return;
        }
        self.state.dirty = false;
        let messages = self.state.log.messages().to_vec();
        let repository = self.services.messages.clone();
        let key = self.state.key.clone();
        let previous = self.state.pending_save.take();
        self.state.pending_save = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            let count = messages.len();
            match repository.save_all(&key, messages).await {
                Ok(()) => tracing::debug!(room = %key, count, "history flushed"),
                Err(e) => tracing::error!(room = %key, error = %e, "history flush failed"),
            }
        }));
    }

    fn bot_event(&mut self, event: BotEvent) {
        let key = self.state.key.clone();
        match event {
            BotEvent::Typing { bot, is_typing } => {
                let frame = typing_frame(&key, &bot.id, &bot.display_name, is_typing);
                self.state.broadcast(&frame, None);
            }
            BotEvent::LimitReached {
                bot,
                reason,
                requested_by,
            } => {
                let message = Message::system(
                    MessageIdFactory::generate(),
                    key,
                    bot.id,
                    bot.display_name,
                    limit_message(reason),
                    Timestamp::new(now_millis()),
                );
                self.publish_bot_message(message, &requested_by);
            }
            BotEvent::Reply {
                bot,
                content,
                requested_by,
            } => {
                let message = Message::chat(
                    MessageIdFactory::generate(),
                    key,
                    bot.id,
                    bot.display_name,
                    content,
                    Timestamp::new(now_millis()),
                );
                self.publish_bot_message(message, &requested_by);
            }
            BotEvent::Finished => {
                self.state.bots_in_flight = self.state.bots_in_flight.saturating_sub(1);
            }
        }
    }

    fn publish_bot_message(&mut self, message: Message, requested_by: &UserId) {
        let frame = message_frame(&message);
        self.services.presence.notify(requested_by, frame.clone());
        self.state.log.push(message);
        self.state
            .schedule_flush(&self.tx, self.services.settings.flush_delay);
        self.state.broadcast(&frame, None);
    }
}

/// [`RoomContext`] handed to a handler for one frame.
struct ActorContext<'a> {
    state: &'a mut RoomState,
    services: &'a RoomServices,
    tx: &'a mpsc::UnboundedSender<RoomCommand>,
    sender: ConnectionMetadata,
    now: Instant,
}

impl RoomContext for ActorContext<'_> {
    fn room(&self) -> &RoomKey {
        &self.state.key
    }

    fn sender(&self) -> &ConnectionMetadata {
        &self.sender
    }

    fn now(&self) -> Instant {
        self.now
    }

    fn timestamp(&self) -> Timestamp {
        Timestamp::new(now_millis())
    }

    fn broadcast(&mut self, frame: Frame, exclude: Option<ConnectionId>) {
        self.state.broadcast(&frame, exclude);
    }

    fn schedule_persist(&mut self) {
        self.state
            .schedule_flush(self.tx, self.services.settings.flush_delay);
    }

    fn append_to_log(&mut self, message: Message) {
        self.state.log.push(message);
    }

    fn log(&self) -> &MessageLog {
        &self.state.log
    }

    fn log_mut(&mut self) -> &mut MessageLog {
        &mut self.state.log
    }

    fn update_sender(&mut self, display_name: Option<String>, status: Option<PresenceStatus>) {
        let Some(connection) = self.state.connections.get_mut(&self.sender.connection_id) else {
            return;
        };
        if let Some(name) = display_name {
            connection.meta.display_name = name;
        }
        if let Some(status) = status {
            connection.meta.status = status;
            connection.meta.status_updated_at = self.now;
        }
        self.sender = connection.meta.clone();
    }

    fn broadcast_participants(&mut self) {
        self.state
            .broadcast_participants(self.now, self.services.settings.roster_grace);
    }

    fn notify_user(&mut self, user: &UserId, message: &Message) {
        self.services.presence.notify(user, message_frame(message));
    }

    fn request_bot_reply(&mut self, bot: UserProfile, prompt: String) {
        self.state.bots_in_flight += 1;
        let responder = self.services.bots.clone();
        let tx = self.tx.clone();
        let requested_by = self.sender.user_id.clone();
        tokio::spawn(async move {
            responder
                .respond(bot, requested_by, prompt, |event| {
                    let _ = tx.send(RoomCommand::Bot(event));
                })
                .await;
        });
    }
}
