//! Server state shared by every handler.

use std::{sync::Arc, time::Duration};

use serde::Deserialize;

use crate::{
    actor::{
        PresenceActor, PresenceHandle, PresenceSettings, RoomRegistry, RoomServices, RoomSettings,
    },
    domain::{KeyValueStore, MessageRepository, ReplyGenerator, UserDirectory},
    infrastructure::{
        auth::{DEFAULT_SESSION_TTL, KvSessionStore},
        directory::seed_directory,
        repository::{InMemoryKeyValueStore, InMemoryMessageRepository},
    },
    usecase::{AdmitConnectionUseCase, BotResponder, BotSettings, ConnectRequest},
};

use super::error::ServerError;

/// Query parameters of both WebSocket endpoints
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectQuery {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub display_name: Option<String>,
}

impl ConnectQuery {
    /// `None` when the session or the user is missing.
    pub fn into_request(self) -> Option<ConnectRequest> {
        Some(ConnectRequest {
            session_id: self.session_id.filter(|s| !s.is_empty())?,
            user_id: self.user_id.filter(|u| !u.is_empty())?,
            display_name: self.display_name,
        })
    }
}

/// Tunables of everything the state owns
#[derive(Debug, Clone)]
pub struct StateConfig {
    pub room: RoomSettings,
    pub presence: PresenceSettings,
    pub bots: BotSettings,
    pub session_ttl: Duration,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            room: RoomSettings::default(),
            presence: PresenceSettings::default(),
            bots: BotSettings::default(),
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }
}

/// Shared application state
pub struct AppState {
    /// 接続受け入れ（セッション検証と DM の参加者チェック）
    pub admission: AdmitConnectionUseCase,
    pub sessions: Arc<KvSessionStore>,
    pub rooms: RoomRegistry,
    pub presence: PresenceHandle,
    pub directory: Arc<UserDirectory>,
}

impl AppState {
    /// Build the state on in-memory stores and spawn the presence actor.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(
        config: StateConfig,
        generator: Arc<dyn ReplyGenerator>,
    ) -> Result<Self, ServerError> {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new());
        let messages: Arc<dyn MessageRepository> = Arc::new(InMemoryMessageRepository::new());
        let directory = Arc::new(seed_directory()?);
        let sessions = Arc::new(KvSessionStore::new(store.clone(), config.session_ttl));
        let presence = PresenceActor::spawn(config.presence);
        let bots = Arc::new(BotResponder::new(generator, store.clone(), config.bots));
        let rooms = RoomRegistry::new(RoomServices {
            messages,
            store,
            presence: presence.clone(),
            bots,
            directory: directory.clone(),
            settings: config.room,
        });
        Ok(Self {
            admission: AdmitConnectionUseCase::new(sessions.clone()),
            sessions,
            rooms,
            presence,
            directory,
        })
    }
}
