//! UseCase 層のエラー定義

use thiserror::Error;

use crate::domain::{AuthError, RepositoryError};

use super::bot::QuotaExceeded;

/// 接続受け入れ（認証・認可）のエラー
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// セッションが無効（HTTP 401）
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// 本人確認の不一致、または DM の参加者ではない（HTTP 403）
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// セッションストアの障害
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

impl From<AuthError> for AdmissionError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidSession => AdmissionError::Unauthorized(err.to_string()),
            AuthError::Store(inner) => AdmissionError::Unavailable(inner.to_string()),
        }
    }
}

/// メッセージハンドラのエラー
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// 入力が不正。送信者にエラーフレームを返す
    #[error("{0}")]
    Validation(String),

    /// 送信間隔の制限に掛かった。送信者にエラーフレームを返す
    #[error("You are sending too fast.")]
    Throttled,

    /// 配信状態の後退。黙って破棄する
    #[error("delivery status did not advance")]
    AckConflict,

    /// 対象メッセージがルームの履歴にない。黙って破棄する
    #[error("unknown message {0}")]
    UnknownMessage(String),
}

impl HandlerError {
    /// 送信者に返すべきエラーかどうか
    pub fn is_reported(&self) -> bool {
        matches!(self, HandlerError::Validation(_) | HandlerError::Throttled)
    }
}

/// ボット応答のエラー
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BotError {
    /// 停止スイッチまたは利用枠による拒否
    #[error("bot limit reached: {0}")]
    Limit(QuotaExceeded),

    #[error(transparent)]
    Store(#[from] RepositoryError),

    #[error("reply generation failed: {0}")]
    Reply(String),
}
