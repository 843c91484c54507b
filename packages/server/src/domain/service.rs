//! External collaborators the domain depends on.

use async_trait::async_trait;

use super::{
    entity::UserProfile,
    error::{AuthError, ReplyError},
    value_object::UserId,
};

/// Identity a session token resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
}

/// Resolves opaque session tokens issued at login
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Generates the text of an automated bot reply
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Reply in the voice of `bot`, whose profile carries the persona traits;
    /// `prompt` is the triggering chat text
    async fn generate(&self, bot: &UserProfile, prompt: &str) -> Result<String, ReplyError>;
}
