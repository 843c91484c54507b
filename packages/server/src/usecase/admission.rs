//! UseCase: 接続の受け入れ（認証・認可）
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - AdmitConnectionUseCase::execute() メソッド
//! - セッショントークンの検証、本人確認、DM の参加者チェック
//!
//! ### なぜこのテストが必要か
//! - 他人になりすました接続を防ぐ
//! - DM の第三者による盗み見を防ぐ
//!
//! ### どのような状況を想定しているか
//! - 正常系：有効なセッションでグループルーム・DM に接続
//! - 異常系：無効なセッション（401）、本人不一致（403）、DM の第三者（403）

use std::sync::Arc;

use crate::domain::{DisplayName, Identity, RoomKey, SessionValidator, UserId};

use super::error::AdmissionError;

/// 接続要求（WebSocket のクエリパラメータ）
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub session_id: String,
    pub user_id: String,
    pub display_name: Option<String>,
}

/// 接続受け入れのユースケース
#[derive(Clone)]
pub struct AdmitConnectionUseCase {
    /// セッション検証（認証基盤の抽象化）
    sessions: Arc<dyn SessionValidator>,
}

impl AdmitConnectionUseCase {
    /// 新しい AdmitConnectionUseCase を作成
    pub fn new(sessions: Arc<dyn SessionValidator>) -> Self {
        Self { sessions }
    }

    /// 接続の受け入れを判定
    ///
    /// # Arguments
    ///
    /// * `request` - 接続要求
    /// * `room` - 接続先ルーム（プレゼンス接続の場合は `None`）
    ///
    /// # Returns
    ///
    /// * `Ok(Identity)` - 受け入れ。表示名は要求の値を優先
    /// * `Err(AdmissionError)` - 拒否
    pub async fn execute(
        &self,
        request: &ConnectRequest,
        room: Option<&RoomKey>,
    ) -> Result<Identity, AdmissionError> {
        // 1. セッションを検証
        let identity = self.sessions.validate(&request.session_id).await?;

        // 2. 本人確認
        let claimed = UserId::new(request.user_id.clone())
            .map_err(|e| AdmissionError::Forbidden(e.to_string()))?;
        if claimed != identity.user_id {
            return Err(AdmissionError::Forbidden(
                "session does not belong to this user".to_string(),
            ));
        }

        // 3. DM の参加者チェック
        if let Some(room) = room
            && !room.admits(&identity.user_id)
        {
            return Err(AdmissionError::Forbidden(format!(
                "not a participant of {room}"
            )));
        }

        let display_name = request
            .display_name
            .clone()
            .and_then(|name| DisplayName::new(name).ok())
            .map_or(identity.display_name, DisplayName::into_string);
        Ok(Identity {
            user_id: identity.user_id,
            display_name,
        })
    }
}
