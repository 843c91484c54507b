//! Reconnecting client session.
//!
//! A [`ClientSession`] owns one WebSocket per room it joined plus, optionally,
//! the presence channel. Every channel runs in its own task that reconnects
//! with [`Backoff`], sends a heartbeat ping and feeds inbound frames into the
//! shared [`ClientView`]. Observers follow along through [`ClientEvent`]s.

use std::{
    collections::HashMap,
    sync::{Arc, Weak},
    time::Duration,
};

use futures_util::{SinkExt, StreamExt};
use hiroba_shared::{DeliveryStatus, Frame, FrameType, ParticipantInfo, PresenceStatus};
use tokio::{
    net::TcpStream,
    sync::{Mutex, broadcast, mpsc, watch},
    time::{Instant, interval, sleep},
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::{
    backoff::Backoff,
    error::ClientError,
    typing::TYPING_FLUSH_INTERVAL,
    view::{ChannelKey, ChannelState, ClientEvent, ClientView},
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Interval of the heartbeat ping on every open channel
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound of [`ClientSession::wait_open`]
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// `ws://host:port` of the server
    pub server_url: String,
    pub session_id: String,
    pub user_id: String,
    pub display_name: Option<String>,
    pub heartbeat: Duration,
    pub connect_timeout: Duration,
    pub backoff: Backoff,
}

impl SessionConfig {
    pub fn new(
        server_url: impl Into<String>,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            session_id: session_id.into(),
            user_id: user_id.into(),
            display_name: None,
            heartbeat: HEARTBEAT_INTERVAL,
            connect_timeout: CONNECT_TIMEOUT,
            backoff: Backoff::default(),
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Endpoint URL of a channel, credentials in the query string.
    pub fn channel_url(&self, key: &ChannelKey) -> String {
        let base = self.server_url.trim_end_matches('/');
        let path = match key {
            ChannelKey::Room(room) => format!("/api/ws/room/{}", urlencoding::encode(room)),
            ChannelKey::Presence => "/api/ws/presence".to_string(),
        };
        let mut url = format!(
            "{base}{path}?sessionId={}&userId={}",
            urlencoding::encode(&self.session_id),
            urlencoding::encode(&self.user_id)
        );
        if let Some(name) = &self.display_name {
            url.push_str("&displayName=");
            url.push_str(&urlencoding::encode(name));
        }
        url
    }
}

struct Channel {
    state: ChannelState,
    outbound: mpsc::UnboundedSender<Frame>,
}

struct Shared {
    config: SessionConfig,
    channels: Mutex<HashMap<ChannelKey, Channel>>,
    view: Mutex<ClientView>,
    events: broadcast::Sender<ClientEvent>,
    shutdown: watch::Sender<bool>,
}

impl Shared {
    fn publish(&self, event: ClientEvent) {
        // no subscriber is fine
        let _ = self.events.send(event);
    }

    async fn set_state(&self, key: &ChannelKey, state: ChannelState) {
        if let Some(channel) = self.channels.lock().await.get_mut(key) {
            channel.state = state;
        }
        tracing::debug!("{} is {:?}", key, state);
        self.publish(ClientEvent::State {
            channel: key.clone(),
            state,
        });
    }

    /// Fold an inbound text frame; frames to write back on the same socket.
    async fn receive(&self, key: &ChannelKey, text: &str) -> Vec<Frame> {
        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("undecodable frame on {}: {}", key, e);
                return Vec::new();
            }
        };
        let (events, replies) = match key {
            ChannelKey::Room(room) => {
                let (events, ack) = self.view.lock().await.apply_room_frame(room, frame);
                (events, ack.into_iter().collect())
            }
            ChannelKey::Presence => {
                let open_rooms = self.open_rooms().await;
                let (events, ack) = self
                    .view
                    .lock()
                    .await
                    .apply_presence_frame(frame, &open_rooms);
                if let Some((room, ack)) = ack {
                    self.send_on_room(&room, ack).await;
                }
                (events, Vec::new())
            }
        };
        for event in events {
            self.publish(event);
        }
        replies
    }

    async fn open_rooms(&self) -> Vec<String> {
        self.channels
            .lock()
            .await
            .iter()
            .filter_map(|(key, channel)| match key {
                ChannelKey::Room(room) if channel.state == ChannelState::Open => Some(room.clone()),
                _ => None,
            })
            .collect()
    }

    async fn send_on_room(&self, room: &str, frame: Frame) {
        let key = ChannelKey::Room(room.to_string());
        if let Some(channel) = self.channels.lock().await.get(&key)
            && channel.outbound.send(frame).is_err()
        {
            tracing::debug!("{} closed before its ack went out", key);
        }
    }

    async fn flush_typing(&self) {
        let rooms: Vec<String> = self
            .channels
            .lock()
            .await
            .keys()
            .filter_map(|key| match key {
                ChannelKey::Room(room) => Some(room.clone()),
                ChannelKey::Presence => None,
            })
            .collect();
        let events = self.view.lock().await.flush_typing(Instant::now(), &rooms);
        for event in events {
            self.publish(event);
        }
    }
}

/// Handle to a running session; clones share the same connections.
#[derive(Clone)]
pub struct ClientSession {
    shared: Arc<Shared>,
}

impl ClientSession {
    /// Create a session. Must be called inside a Tokio runtime.
    pub fn new(config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            view: Mutex::new(ClientView::new(config.user_id.clone())),
            config,
            channels: Mutex::new(HashMap::new()),
            events,
            shutdown,
        });
        tokio::spawn(run_typing_flush(Arc::downgrade(&shared)));
        Self { shared }
    }

    pub fn user_id(&self) -> &str {
        &self.shared.config.user_id
    }

    /// Start the channel of `room` unless it is already running.
    pub async fn connect_room(&self, room: &str) -> Result<(), ClientError> {
        self.start_channel(ChannelKey::Room(room.to_string())).await
    }

    /// Start the presence channel unless it is already running.
    pub async fn connect_presence(&self) -> Result<(), ClientError> {
        self.start_channel(ChannelKey::Presence).await
    }

    async fn start_channel(&self, key: ChannelKey) -> Result<(), ClientError> {
        if *self.shared.shutdown.borrow() {
            return Err(ClientError::Closed);
        }
        let mut channels = self.shared.channels.lock().await;
        if channels.contains_key(&key) {
            return Ok(());
        }
        let (tx, rx) = mpsc::unbounded_channel();
        channels.insert(
            key.clone(),
            Channel {
                state: ChannelState::Connecting,
                outbound: tx,
            },
        );
        drop(channels);
        tracing::info!("starting channel {}", key);
        tokio::spawn(run_channel(self.shared.clone(), key, rx));
        Ok(())
    }

    /// Wait until `key` is open, polling up to the configured timeout.
    pub async fn wait_open(&self, key: &ChannelKey) -> Result<(), ClientError> {
        let deadline = Instant::now() + self.shared.config.connect_timeout;
        loop {
            if self.state(key).await == Some(ChannelState::Open) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ClientError::ConnectionTimeout);
            }
            sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    pub async fn state(&self, key: &ChannelKey) -> Option<ChannelState> {
        self.shared.channels.lock().await.get(key).map(|c| c.state)
    }

    /// Send on `key`, connecting first and waiting for it to open if needed.
    async fn send(&self, key: &ChannelKey, frame: Frame) -> Result<(), ClientError> {
        self.start_channel(key.clone()).await?;
        self.wait_open(key).await?;
        let channels = self.shared.channels.lock().await;
        let channel = channels
            .get(key)
            .ok_or_else(|| ClientError::NotConnected(key.to_string()))?;
        channel.outbound.send(frame).map_err(|_| ClientError::Closed)
    }

    async fn send_room(&self, room: &str, frame: Frame) -> Result<(), ClientError> {
        self.send(&ChannelKey::Room(room.to_string()), frame).await
    }

    /// Send a chat message; returns the frame with its generated id.
    pub async fn send_chat(&self, room: &str, content: &str) -> Result<Frame, ClientError> {
        let frame = Frame {
            id: Some(uuid::Uuid::new_v4().to_string()),
            content: Some(content.to_string()),
            ..Frame::new(FrameType::Chat)
        };
        self.send_room(room, frame.clone()).await?;
        Ok(frame)
    }

    pub async fn send_nudge(&self, room: &str) -> Result<(), ClientError> {
        self.send_room(room, Frame::new(FrameType::Nudge)).await
    }

    pub async fn send_wink(&self, room: &str, wink_id: &str) -> Result<(), ClientError> {
        let frame = Frame {
            wink_id: Some(wink_id.to_string()),
            ..Frame::new(FrameType::Wink)
        };
        self.send_room(room, frame).await
    }

    pub async fn send_typing(&self, room: &str, is_typing: bool) -> Result<(), ClientError> {
        let frame = Frame {
            is_typing: Some(is_typing),
            ..Frame::new(FrameType::Typing)
        };
        self.send_room(room, frame).await
    }

    pub async fn send_ack(
        &self,
        room: &str,
        message_id: &str,
        status: DeliveryStatus,
    ) -> Result<(), ClientError> {
        self.send_room(room, Frame::ack(message_id, status)).await
    }

    /// Mark every unread message from others in `room` as read and tell the
    /// server. Returns how many acknowledgements were sent.
    pub async fn open_room(&self, room: &str) -> Result<usize, ClientError> {
        let key = ChannelKey::Room(room.to_string());
        self.start_channel(key.clone()).await?;
        self.wait_open(&key).await?;
        let acks = self.shared.view.lock().await.mark_room_read(room);
        let count = acks.len();
        for ack in acks {
            self.send(&key, ack).await?;
        }
        Ok(count)
    }

    /// Announce a status and optionally a new display name on the presence
    /// channel and in every open room.
    pub async fn set_presence(
        &self,
        status: PresenceStatus,
        display_name: Option<&str>,
    ) -> Result<(), ClientError> {
        let open: Vec<ChannelKey> = self
            .shared
            .channels
            .lock()
            .await
            .iter()
            .filter(|(_, c)| c.state == ChannelState::Open)
            .map(|(key, _)| key.clone())
            .collect();
        for key in open {
            let kind = match key {
                ChannelKey::Presence => FrameType::PresenceUpdate,
                ChannelKey::Room(_) => FrameType::Presence,
            };
            let frame = Frame {
                status: Some(status.as_str().to_string()),
                display_name: display_name.map(str::to_string),
                ..Frame::new(kind)
            };
            self.send(&key, frame).await?;
        }
        Ok(())
    }

    pub async fn messages(&self, room: &str) -> Vec<Frame> {
        self.shared.view.lock().await.messages(room).to_vec()
    }

    pub async fn typing_in(&self, room: &str) -> Vec<String> {
        self.shared.view.lock().await.typing_in(room)
    }

    pub async fn participants(&self, room: &str) -> Vec<ParticipantInfo> {
        self.shared.view.lock().await.participants(room).to_vec()
    }

    pub async fn roster(&self) -> Vec<ParticipantInfo> {
        self.shared.view.lock().await.roster()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    /// Close every channel and stop reconnecting.
    pub fn shutdown(&self) {
        self.shared.shutdown.send_replace(true);
    }
}

async fn run_typing_flush(shared: Weak<Shared>) {
    let mut ticker = interval(TYPING_FLUSH_INTERVAL);
    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if *shared.shutdown.borrow() {
            break;
        }
        shared.flush_typing().await;
    }
}

async fn run_channel(
    shared: Arc<Shared>,
    key: ChannelKey,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
) {
    let url = shared.config.channel_url(&key);
    let mut backoff = shared.config.backoff.clone();
    let mut shutdown = shared.shutdown.subscribe();

    loop {
        if *shutdown.borrow() {
            break;
        }
        shared.set_state(&key, ChannelState::Connecting).await;
        match connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                backoff.reset();
                shared.set_state(&key, ChannelState::Open).await;
                tracing::info!("{} connected", key);
                if let Err(e) = drive(&shared, &key, socket, &mut outbound, &mut shutdown).await {
                    tracing::warn!("{} dropped: {}", key, e);
                }
            }
            Err(e) => tracing::warn!("{} connect failed: {}", key, e),
        }
        shared.set_state(&key, ChannelState::Disconnected).await;
        if *shutdown.borrow() {
            break;
        }

        let delay = backoff.next_delay();
        tracing::info!(
            "{} reconnecting in {:?} (attempt {})",
            key,
            delay,
            backoff.attempts()
        );
        tokio::select! {
            _ = sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }
    tracing::info!("{} stopped", key);
}

fn text(frame: &Frame) -> Result<Message, ClientError> {
    Ok(Message::Text(frame.encode()?.into()))
}

/// Pump one open socket until it closes or the session shuts down.
async fn drive(
    shared: &Shared,
    key: &ChannelKey,
    socket: Socket,
    outbound: &mut mpsc::UnboundedReceiver<Frame>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), ClientError> {
    let (mut sink, mut stream) = socket.split();
    let mut heartbeat = interval(shared.config.heartbeat);
    // the first tick completes immediately
    heartbeat.tick().await;

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(body))) => {
                    for reply in shared.receive(key, body.as_str()).await {
                        sink.send(text(&reply)?).await?;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        tracing::info!(
                            "{} closed by server: {} {}",
                            key,
                            u16::from(frame.code),
                            frame.reason.as_str()
                        );
                    }
                    return Ok(());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            },
            Some(frame) = outbound.recv() => sink.send(text(&frame)?).await?,
            _ = heartbeat.tick() => sink.send(text(&Frame::ping())?).await?,
            _ = shutdown.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(());
            }
        }
    }
}
