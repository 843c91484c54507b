//! Session storage backed by the key-value store.
//!
//! Sessions live under `session:{id}` as JSON with an expiry. Login here is a
//! development convenience; production deployments issue sessions elsewhere
//! and only need [`KvSessionStore`] as the validator.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AuthError, Identity, KeyValueStore, RepositoryError, SessionValidator, UserId};

/// Default lifetime of an issued session
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionRecord {
    user_id: String,
    display_name: String,
}

/// Issued session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub identity: Identity,
}

#[derive(Clone)]
pub struct KvSessionStore {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl KvSessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(session_id: &str) -> String {
        format!("session:{session_id}")
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a new session for `identity`.
    pub async fn issue(&self, identity: Identity) -> Result<Session, RepositoryError> {
        let session_id = Uuid::new_v4().to_string();
        self.insert(&session_id, &identity).await?;
        Ok(Session {
            session_id,
            identity,
        })
    }

    /// Store a session under a caller-chosen id.
    pub async fn insert(
        &self,
        session_id: &str,
        identity: &Identity,
    ) -> Result<(), RepositoryError> {
        let record = SessionRecord {
            user_id: identity.user_id.to_string(),
            display_name: identity.display_name.clone(),
        };
        let json = serde_json::to_string(&record)
            .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
        self.store
            .put(&Self::key(session_id), json, Some(self.ttl))
            .await
    }

    pub async fn revoke(&self, session_id: &str) -> Result<(), RepositoryError> {
        self.store.delete(&Self::key(session_id)).await
    }
}

#[async_trait]
impl SessionValidator for KvSessionStore {
    async fn validate(&self, token: &str) -> Result<Identity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidSession);
        }
        let raw = self
            .store
            .get(&Self::key(token))
            .await?
            .ok_or(AuthError::InvalidSession)?;
        let record: SessionRecord = serde_json::from_str(&raw)
            .map_err(|e| AuthError::Store(RepositoryError::Corrupt(e.to_string())))?;
        let user_id = UserId::new(record.user_id)
            .map_err(|e| AuthError::Store(RepositoryError::Corrupt(e.to_string())))?;
        Ok(Identity {
            user_id,
            display_name: record.display_name,
        })
    }
}
