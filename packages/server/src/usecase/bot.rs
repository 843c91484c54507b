//! UseCase: ボットの自動応答
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - detect_bot(): DM の相手がボットか、`@persona` でメンションされたか
//! - QuotaGate: 停止スイッチ、全体・ユーザーごとの 1 日の利用枠
//! - BotResponder::respond(): 入力中通知 → 利用枠 → 生成 → 待機 → 応答 の順序
//!
//! ### なぜこのテストが必要か
//! - 利用枠を超えた生成は外部 API のコストに直結する
//! - 生成に失敗しても入力中表示が残り続けないことを保証する
//!
//! ### どのような状況を想定しているか
//! - 正常系：メンションされたボットが応答する
//! - 異常系：利用枠超過、停止スイッチ、生成失敗、生成タイムアウト

use std::{fmt, sync::Arc, time::Duration};

use crate::domain::{
    KeyValueStore, ReplyGenerator, RepositoryError, RoomKey, UserDirectory, UserId, UserProfile,
};

use super::error::BotError;

/// Kill-switch key; the value `"false"` disables every bot.
pub const BOT_ENABLED_KEY: &str = "config:bot_enabled";

/// Tunables of automated replies.
#[derive(Debug, Clone)]
pub struct BotSettings {
    pub global_daily_limit: i64,
    pub user_daily_limit: i64,
    /// Lifetime of the daily counters
    pub quota_ttl: Duration,
    /// Upper bound on a single reply generation
    pub reply_timeout: Duration,
    pub delay_per_char: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            global_daily_limit: 4000,
            user_daily_limit: 50,
            quota_ttl: Duration::from_secs(2 * 24 * 60 * 60),
            reply_timeout: Duration::from_secs(20),
            delay_per_char: Duration::from_millis(40),
            min_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(4000),
        }
    }
}

/// Which bot should answer a chat message, if any.
///
/// A bot answers when it is the other participant of a direct room, or when
/// the text mentions it as `@persona` or `@` plus a word of its display name.
/// Bots never answer other bots.
pub fn detect_bot(
    room: &RoomKey,
    sender: &UserId,
    content: &str,
    directory: &UserDirectory,
) -> Option<UserProfile> {
    if directory.get(sender).is_some_and(|u| u.is_bot) {
        return None;
    }

    if let Some(other) = room.counterpart(sender)
        && let Some(profile) = directory.get(&other)
        && profile.is_bot
    {
        return Some(profile.clone());
    }

    let mentions = mentions(content);
    if mentions.is_empty() {
        return None;
    }
    directory
        .bots()
        .find(|bot| {
            mentions.iter().any(|mention| {
                bot.persona
                    .as_deref()
                    .is_some_and(|p| p.eq_ignore_ascii_case(mention))
                    || bot
                        .display_name
                        .split_whitespace()
                        .any(|word| word.eq_ignore_ascii_case(mention))
            })
        })
        .cloned()
}

/// Words following `@` in `content`.
fn mentions(content: &str) -> Vec<&str> {
    content
        .split('@')
        .skip(1)
        .filter_map(|rest| {
            let end = rest
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            (end > 0).then(|| &rest[..end])
        })
        .collect()
}

/// Typing delay of a reply: 40ms per character, clamped to 1..=4 seconds.
pub fn reply_delay(chars: usize, settings: &BotSettings) -> Duration {
    let chars = u32::try_from(chars).unwrap_or(u32::MAX);
    settings
        .delay_per_char
        .saturating_mul(chars)
        .clamp(settings.min_delay, settings.max_delay)
}

/// Which daily counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    Global,
    User,
}

/// Why a reply was refused before generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaExceeded {
    Disabled,
    Global,
    User,
}

impl fmt::Display for QuotaExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaExceeded::Disabled => write!(f, "Bots Disabled"),
            QuotaExceeded::Global => write!(f, "Global Quota"),
            QuotaExceeded::User => write!(f, "User Quota"),
        }
    }
}

/// Text of the system message posted when a reply is refused.
pub fn limit_message(reason: QuotaExceeded) -> String {
    format!("(Bot limit reached: {reason})")
}

/// Kill switch and daily usage counters, kept in the key-value store.
#[derive(Clone)]
pub struct QuotaGate {
    store: Arc<dyn KeyValueStore>,
    settings: BotSettings,
}

impl QuotaGate {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: BotSettings) -> Self {
        Self { store, settings }
    }

    fn key(kind: QuotaKind, day: &str, user: &UserId) -> String {
        match kind {
            QuotaKind::Global => format!("daily_ai_usage:{day}"),
            QuotaKind::User => format!("user_ai_usage:{day}:{user}"),
        }
    }

    pub async fn is_enabled(&self) -> Result<bool, RepositoryError> {
        Ok(self.store.get(BOT_ENABLED_KEY).await?.as_deref() != Some("false"))
    }

    /// Current value of a daily counter; missing counters read as 0.
    pub async fn daily_count(
        &self,
        kind: QuotaKind,
        day: &str,
        user: &UserId,
    ) -> Result<i64, RepositoryError> {
        match self.store.get(&Self::key(kind, day, user)).await? {
            Some(raw) => raw
                .parse()
                .map_err(|_| RepositoryError::Corrupt(format!("counter value '{raw}'"))),
            None => Ok(0),
        }
    }

    /// Increment a daily counter, returning the new value.
    pub async fn increment_daily(
        &self,
        kind: QuotaKind,
        day: &str,
        user: &UserId,
    ) -> Result<i64, RepositoryError> {
        self.store
            .increment(&Self::key(kind, day, user), Some(self.settings.quota_ttl))
            .await
    }

    /// Check the kill switch and both ceilings, then reserve one unit of
    /// each counter.
    ///
    /// The counters are incremented atomically before generation starts, and
    /// the post-increment value is checked again, so concurrent requests
    /// cannot overshoot a ceiling. A reservation refused at that point gives
    /// back the units it took.
    pub async fn try_reserve(&self, day: &str, user: &UserId) -> Result<(), BotError> {
        if !self.is_enabled().await? {
            return Err(BotError::Limit(QuotaExceeded::Disabled));
        }
        if self.daily_count(QuotaKind::Global, day, user).await?
            >= self.settings.global_daily_limit
        {
            return Err(BotError::Limit(QuotaExceeded::Global));
        }
        if self.daily_count(QuotaKind::User, day, user).await? >= self.settings.user_daily_limit {
            return Err(BotError::Limit(QuotaExceeded::User));
        }

        let global = self.increment_daily(QuotaKind::Global, day, user).await?;
        if global > self.settings.global_daily_limit {
            self.release_daily(QuotaKind::Global, day, user).await?;
            return Err(BotError::Limit(QuotaExceeded::Global));
        }
        let own = self.increment_daily(QuotaKind::User, day, user).await?;
        if own > self.settings.user_daily_limit {
            self.release_daily(QuotaKind::User, day, user).await?;
            self.release_daily(QuotaKind::Global, day, user).await?;
            return Err(BotError::Limit(QuotaExceeded::User));
        }
        Ok(())
    }

    /// Give back a unit taken by a reservation that was then refused.
    async fn release_daily(
        &self,
        kind: QuotaKind,
        day: &str,
        user: &UserId,
    ) -> Result<(), RepositoryError> {
        self.store.decrement(&Self::key(kind, day, user)).await?;
        Ok(())
    }
}

/// Progress of one automated reply, reported back to the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotEvent {
    Typing {
        bot: UserProfile,
        is_typing: bool,
    },
    LimitReached {
        bot: UserProfile,
        reason: QuotaExceeded,
        requested_by: UserId,
    },
    Reply {
        bot: UserProfile,
        content: String,
        requested_by: UserId,
    },
    /// The pipeline is over, whatever the outcome.
    Finished,
}

/// Runs the reply pipeline of one bot trigger.
pub struct BotResponder {
    generator: Arc<dyn ReplyGenerator>,
    quota: QuotaGate,
    settings: BotSettings,
}

impl BotResponder {
    pub fn new(
        generator: Arc<dyn ReplyGenerator>,
        store: Arc<dyn KeyValueStore>,
        settings: BotSettings,
    ) -> Self {
        Self {
            generator,
            quota: QuotaGate::new(store, settings.clone()),
            settings,
        }
    }

    pub fn quota(&self) -> &QuotaGate {
        &self.quota
    }

    /// Answer `prompt` from `requested_by` as `bot`.
    ///
    /// Events are reported through `emit` in order. `Finished` is always
    /// the last event.
    pub async fn respond<F>(
        &self,
        bot: UserProfile,
        requested_by: UserId,
        prompt: String,
        mut emit: F,
    ) where
        F: FnMut(BotEvent),
    {
        emit(BotEvent::Typing {
            bot: bot.clone(),
            is_typing: true,
        });
        if let Err(err) = self.produce(&bot, &requested_by, &prompt, &mut emit).await {
            emit(BotEvent::Typing {
                bot: bot.clone(),
                is_typing: false,
            });
            match err {
                BotError::Limit(reason) => {
                    tracing::info!(
                        bot = %bot.id,
                        user = %requested_by,
                        %reason,
                        "bot reply refused"
                    );
                    emit(BotEvent::LimitReached {
                        bot,
                        reason,
                        requested_by,
                    });
                }
                other => {
                    tracing::warn!(bot = %bot.id, error = %other, "bot reply dropped");
                }
            }
        }
        emit(BotEvent::Finished);
    }

    async fn produce<F>(
        &self,
        bot: &UserProfile,
        requested_by: &UserId,
        prompt: &str,
        emit: &mut F,
    ) -> Result<(), BotError>
    where
        F: FnMut(BotEvent),
    {
        let day = hiroba_shared::time::utc_day();
        self.quota.try_reserve(&day, requested_by).await?;

        let content = tokio::time::timeout(
            self.settings.reply_timeout,
            self.generator.generate(bot, prompt),
        )
        .await
        .map_err(|_| BotError::Reply("timed out".to_string()))?
        .map_err(|e| BotError::Reply(e.to_string()))?;

        tokio::time::sleep(reply_delay(content.chars().count(), &self.settings)).await;
        emit(BotEvent::Typing {
            bot: bot.clone(),
            is_typing: false,
        });
        emit(BotEvent::Reply {
            bot: bot.clone(),
            content,
            requested_by: requested_by.clone(),
        });
        Ok(())
    }
}
