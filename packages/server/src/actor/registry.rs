//! Lookup table from room key to running room actor.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

use super::{
    ActorGone, OutboundSender,
    room::{RoomActor, RoomHandle, RoomServices, RoomSnapshot},
};
use crate::domain::{ConnectionId, Identity, RoomKey};

/// Spawns room actors on demand, at most one per key.
///
/// Actors stop by themselves once idle; the stale handle stays in the map
/// until the next lookup replaces it.
#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<Mutex<HashMap<RoomKey, RoomHandle>>>,
    services: RoomServices,
}

impl RoomRegistry {
    pub fn new(services: RoomServices) -> Self {
        Self {
            rooms: Arc::new(Mutex::new(HashMap::new())),
            services,
        }
    }

    pub fn services(&self) -> &RoomServices {
        &self.services
    }

    /// Handle of the live actor for `key`, spawning one if needed.
    pub async fn handle(&self, key: &RoomKey) -> RoomHandle {
        let mut rooms = self.rooms.lock().await;
        if let Some(handle) = rooms.get(key)
            && !handle.is_closed()
        {
            return handle.clone();
        }
        tracing::debug!(room = %key, "spawning room actor");
        let handle = RoomActor::spawn(key.clone(), self.services.clone());
        rooms.insert(key.clone(), handle.clone());
        handle
    }

    /// Join `key`, retrying once if the actor stopped between lookup and join.
    pub async fn join(
        &self,
        key: &RoomKey,
        identity: Identity,
        session_id: String,
        outbound: OutboundSender,
    ) -> Result<(RoomHandle, ConnectionId), ActorGone> {
        let handle = self.handle(key).await;
        match handle
            .join(identity.clone(), session_id.clone(), outbound.clone())
            .await
        {
            Ok(connection) => Ok((handle, connection)),
            Err(ActorGone) => {
                let handle = self.handle(key).await;
                let connection = handle.join(identity, session_id, outbound).await?;
                Ok((handle, connection))
            }
        }
    }

    /// Snapshot of `key` if its actor is running.
    pub async fn snapshot(&self, key: &RoomKey) -> Option<RoomSnapshot> {
        let handle = {
            let rooms = self.rooms.lock().await;
            rooms.get(key).filter(|h| !h.is_closed()).cloned()
        }?;
        handle.snapshot().await.ok()
    }

    /// Keys of the rooms whose actors are currently running, sorted.
    pub async fn active_rooms(&self) -> Vec<RoomKey> {
        let mut rooms = self.rooms.lock().await;
        rooms.retain(|_, handle| !handle.is_closed());
        let mut keys: Vec<RoomKey> = rooms.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        actor::{PresenceActor, PresenceSettings, RoomSettings},
        domain::{UserDirectory, UserId},
        infrastructure::{
            reply::CannedReplyGenerator,
            repository::{InMemoryKeyValueStore, InMemoryMessageRepository},
        },
        usecase::bot::{BotResponder, BotSettings},
    };

    fn registry() -> RoomRegistry {
        let store = Arc::new(InMemoryKeyValueStore::new());
        RoomRegistry::new(RoomServices {
            messages: Arc::new(InMemoryMessageRepository::new()),
            store: store.clone(),
            presence: PresenceActor::spawn(PresenceSettings::default()),
            bots: Arc::new(BotResponder::new(
                Arc::new(CannedReplyGenerator),
                store,
                BotSettings::default(),
            )),
            directory: Arc::new(UserDirectory::default()),
            settings: RoomSettings::default(),
        })
    }

    fn identity(id: &str) -> Identity {
        Identity {
            user_id: UserId::new(id.to_string()).unwrap(),
            display_name: id.to_string(),
        }
    }

    fn key(raw: &str) -> RoomKey {
        RoomKey::new(raw.to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_same_key_shares_one_actor() {
        // テスト項目: 同じキーへの 2 回の参加は同じアクターに集まる
        // given (前提条件):
        let registry = registry();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();

        // when (操作):
        registry
            .join(&key("general"), identity("alice"), "s1".to_string(), tx1)
            .await
            .unwrap();
        registry
            .join(&key("general"), identity("bob"), "s2".to_string(), tx2)
            .await
            .unwrap();

        // then (期待する結果):
        let snapshot = registry.snapshot(&key("general")).await.unwrap();
        assert_eq!(snapshot.connection_count, 2);
        assert_eq!(registry.active_rooms().await, vec![key("general")]);
    }

    #[tokio::test]
    async fn test_idle_room_is_respawned() {
        // テスト項目: 全員が退室して停止したルームは次の参加で新しく起動される
        // given (前提条件):
        let registry = registry();
        let (tx, _rx) = mpsc::unbounded_channel();
        let (first, connection) = registry
            .join(&key("music"), identity("alice"), "s1".to_string(), tx)
            .await
            .unwrap();
        first.leave(connection);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // when (操作):
        let inactive = registry.snapshot(&key("music")).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let (second, _) = registry
            .join(&key("music"), identity("bob"), "s2".to_string(), tx)
            .await
            .unwrap();

        // then (期待する結果):
        assert!(first.is_closed());
        assert!(inactive.is_none());
        assert!(!second.is_closed());
    }
}
