//! InMemory Key-Value Store 実装
//!
//! 有効期限つきの値を HashMap に保持します。期限切れの値は読み出し時に削除されます。

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use tokio::{sync::Mutex, time::Instant};

use crate::domain::{KeyValueStore, RepositoryError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// インメモリ Key-Value Store 実装
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), RepositoryError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()
            .await
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), RepositoryError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<i64, RepositoryError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let current = match entries.get(key) {
            Some(entry) if entry.is_live(now) => Some(entry.clone()),
            _ => None,
        };
        let (count, expires_at) = match current {
            Some(entry) => {
                let count: i64 = entry.value.parse().map_err(|_| {
                    RepositoryError::Corrupt(format!("{key} is not a counter"))
                })?;
                (count + 1, entry.expires_at)
            }
            None => (1, ttl.map(|ttl| now + ttl)),
        };
        entries.insert(
            key.to_string(),
            Entry {
                value: count.to_string(),
                expires_at,
            },
        );
        Ok(count)
    }

    async fn decrement(&self, key: &str) -> Result<i64, RepositoryError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let Some(entry) = entries.get_mut(key).filter(|entry| entry.is_live(now)) else {
            return Ok(0);
        };
        let count: i64 = entry
            .value
            .parse()
            .map_err(|_| RepositoryError::Corrupt(format!("{key} is not a counter")))?;
        entry.value = (count - 1).to_string();
        Ok(count - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        // テスト項目: 値を保存・取得・削除できる
        let store = InMemoryKeyValueStore::new();

        store.put("k", "v".to_string(), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_value_expires_after_ttl() {
        // テスト項目: 有効期限を過ぎた値は読み出せない
        // given (前提条件):
        let store = InMemoryKeyValueStore::new();
        store
            .put("session:1", "x".to_string(), Some(Duration::from_secs(300)))
            .await
            .unwrap();

        // when (操作):
        tokio::time::advance(Duration::from_secs(301)).await;

        // then (期待する結果):
        assert_eq!(store.get("session:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_decrement_undoes_increment() {
        // テスト項目: decrement はカウンタを 1 戻し、存在しないキーは作らない
        // given (前提条件):
        let store = InMemoryKeyValueStore::new();
        store.increment("c", None).await.unwrap();
        store.increment("c", None).await.unwrap();

        // when (操作):
        let after = store.decrement("c").await.unwrap();
        let missing = store.decrement("missing").await.unwrap();

        // then (期待する結果):
        assert_eq!(after, 1);
        assert_eq!(store.get("c").await.unwrap().as_deref(), Some("1"));
        assert_eq!(missing, 0);
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_increment_counts_and_keeps_first_ttl() {
        // テスト項目: カウンタは 1 から数え、最初の有効期限を保つ
        // given (前提条件):
        let store = InMemoryKeyValueStore::new();
        let ttl = Some(Duration::from_secs(10));

        // when (操作):
        let first = store.increment("c", ttl).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        let second = store.increment("c", ttl).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        let after_expiry = store.increment("c", ttl).await.unwrap();

        // then (期待する結果):
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(after_expiry, 1);
    }

    #[tokio::test]
    async fn test_increment_rejects_non_counter() {
        // テスト項目: 数値でない値のインクリメントはエラー
        let store = InMemoryKeyValueStore::new();
        store.put("k", "abc".to_string(), None).await.unwrap();

        assert!(matches!(
            store.increment("k", None).await,
            Err(RepositoryError::Corrupt(_))
        ));
    }
}
