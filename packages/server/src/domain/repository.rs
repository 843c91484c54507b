//! Repository trait 定義
//!
//! ドメイン層が必要とする永続化の抽象。具体的な実装は
//! infrastructure 層に置き、UseCase 層と Actor はこの trait にだけ依存します（依存性の逆転）。

use std::time::Duration;

use async_trait::async_trait;

use super::{entity::Message, error::RepositoryError, value_object::RoomKey};

/// ルームごとのメッセージ永続化
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 最新 `limit` 件を古い順で返す
    async fn load_recent(
        &self,
        room: &RoomKey,
        limit: usize,
    ) -> Result<Vec<Message>, RepositoryError>;

    /// メッセージをまとめて upsert する（キーは timestamp と id）
    async fn save_all(&self, room: &RoomKey, messages: Vec<Message>)
    -> Result<(), RepositoryError>;
}

/// 有効期限つきの Key-Value ストア
///
/// セッション、ルームのメタデータ、ボットの利用枠カウンタを保持します。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, RepositoryError>;

    async fn put(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> Result<(), RepositoryError>;

    async fn delete(&self, key: &str) -> Result<(), RepositoryError>;

    /// 整数カウンタを 1 増やして新しい値を返す
    ///
    /// キーが存在しない場合は 0 から数え、`ttl` を設定します。
    async fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<i64, RepositoryError>;

    /// 整数カウンタを 1 減らして新しい値を返す
    ///
    /// キーが存在しない場合は何もせず 0 を返します。有効期限は変わりません。
    async fn decrement(&self, key: &str) -> Result<i64, RepositoryError>;
}
