//! InMemory Message Repository 実装
//!
//! ドメイン層が定義する MessageRepository trait の具体的な実装。
//! ルームごとの BTreeMap をインメモリ DB として使用します。
//! キーは `msg_{timestamp}_{id}` 相当の `(timestamp, id)` で、同じキーへの保存は上書き（upsert）です。

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{Message, MessageId, MessageRepository, RepositoryError, RoomKey, Timestamp};

type RoomMessages = BTreeMap<(Timestamp, MessageId), Message>;

/// インメモリ Message Repository 実装
#[derive(Default)]
pub struct InMemoryMessageRepository {
    rooms: Arc<Mutex<HashMap<RoomKey, RoomMessages>>>,
    /// save_all の呼び出し回数
    writes: AtomicUsize,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// save_all が呼ばれた回数
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// ルームに保存されている全メッセージ（古い順）
    pub async fn stored(&self, room: &RoomKey) -> Vec<Message> {
        let rooms = self.rooms.lock().await;
        rooms
            .get(room)
            .map(|messages| messages.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn load_recent(
        &self,
        room: &RoomKey,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError> {
        let rooms = self.rooms.lock().await;
        let Some(messages) = rooms.get(room) else {
            return Ok(Vec::new());
        };
        let mut recent: Vec<Message> = messages.values().rev().take(limit).cloned().collect();
        recent.reverse();
        Ok(recent)
    }

    async fn save_all(
        &self,
        room: &RoomKey,
        messages: Vec<Message>,
    ) -> Result<(), RepositoryError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut rooms = self.rooms.lock().await;
        let stored = rooms.entry(room.clone()).or_default();
        for message in messages {
            stored.insert((message.timestamp, message.id.clone()), message);
        }
        Ok(())
    }
}
