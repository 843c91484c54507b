//! Local per-room message cache.
//!
//! ## テスト実装の作業記録
//!
//! ### 何をテストしているか
//! - history での置き換え（chat / system 以外は捨てる）
//! - id による重複排除とタイムスタンプ順の並び
//! - 件数上限を超えたときに古いものから捨てる
//! - delivery_status による状態の前進（後退しない）
//!
//! ### なぜこのテストが必要か
//! - 再接続のたびに同じメッセージが二重に表示されないことを保証する
//! - 既読表示が逆戻りしないことを保証する

use std::collections::HashMap;

use hiroba_shared::{DeliveryStatus, Frame, FrameType};

/// Messages retained per room
pub const MAX_CACHED_MESSAGES: usize = 500;

/// Ordered, deduplicated message frames keyed by room.
#[derive(Debug, Clone)]
pub struct MessageCache {
    rooms: HashMap<String, Vec<Frame>>,
    limit: usize,
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::new(MAX_CACHED_MESSAGES)
    }
}

fn is_cached_kind(kind: FrameType) -> bool {
    matches!(kind, FrameType::Chat | FrameType::System | FrameType::Nudge)
}

impl MessageCache {
    pub fn new(limit: usize) -> Self {
        Self {
            rooms: HashMap::new(),
            limit,
        }
    }

    /// Replace the room's cache with a history replay.
    pub fn replace_history(&mut self, room: &str, messages: Vec<Frame>) {
        let mut kept: Vec<Frame> = messages
            .into_iter()
            .filter(|m| matches!(m.kind, FrameType::Chat | FrameType::System))
            .collect();
        kept.sort_by_key(|m| m.timestamp.unwrap_or_default());
        if kept.len() > self.limit {
            kept.drain(..kept.len() - self.limit);
        }
        self.rooms.insert(room.to_string(), kept);
    }

    /// Insert a message unless its id is already cached; `true` if inserted.
    pub fn merge(&mut self, room: &str, message: Frame) -> bool {
        if !is_cached_kind(message.kind) {
            return false;
        }
        let messages = self.rooms.entry(room.to_string()).or_default();
        if let Some(id) = message.id.as_deref()
            && messages.iter().any(|m| m.id.as_deref() == Some(id))
        {
            return false;
        }
        let timestamp = message.timestamp.unwrap_or_default();
        let position = messages.partition_point(|m| m.timestamp.unwrap_or_default() <= timestamp);
        messages.insert(position, message);
        if messages.len() > self.limit {
            let overflow = messages.len() - self.limit;
            messages.drain(..overflow);
        }
        true
    }

    /// Advance the status of a cached message; `true` if it moved forward.
    pub fn apply_status(&mut self, room: &str, id: &str, status: DeliveryStatus) -> bool {
        let Some(message) = self
            .rooms
            .get_mut(room)
            .and_then(|messages| messages.iter_mut().find(|m| m.id.as_deref() == Some(id)))
        else {
            return false;
        };
        if message
            .delivery_status()
            .is_some_and(|current| current >= status)
        {
            return false;
        }
        message.status = Some(status.to_string());
        true
    }

    /// Ids of chat messages from other users not yet marked read.
    pub fn unread_from_others(&self, room: &str, me: &str) -> Vec<String> {
        self.messages(room)
            .iter()
            .filter(|m| m.kind == FrameType::Chat)
            .filter(|m| m.sender_id.as_deref() != Some(me))
            .filter(|m| m.delivery_status() != Some(DeliveryStatus::Read))
            .filter_map(|m| m.id.clone())
            .collect()
    }

    pub fn messages(&self, room: &str) -> &[Frame] {
        self.rooms.get(room).map(Vec::as_slice).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(kind: FrameType, id: &str, sender: &str, timestamp: i64) -> Frame {
        Frame {
            id: Some(id.to_string()),
            sender_id: Some(sender.to_string()),
            timestamp: Some(timestamp),
            status: Some("sent".to_string()),
            ..Frame::new(kind)
        }
    }

    fn ids(cache: &MessageCache, room: &str) -> Vec<String> {
        cache
            .messages(room)
            .iter()
            .filter_map(|m| m.id.clone())
            .collect()
    }

    #[test]
    fn test_history_replaces_and_filters() {
        // テスト項目: history は既存のキャッシュを置き換え、chat と system だけを残す
        // given (前提条件):
        let mut cache = MessageCache::default();
        cache.merge("general", frame(FrameType::Chat, "old", "bob", 1));

        // when (操作):
        cache.replace_history(
            "general",
            vec![
                frame(FrameType::Chat, "b", "bob", 20),
                frame(FrameType::Nudge, "n", "bob", 15),
                frame(FrameType::System, "a", "bob", 10),
            ],
        );

        // then (期待する結果):
        assert_eq!(ids(&cache, "general"), vec!["a", "b"]);
    }

    #[test]
    fn test_merge_dedups_and_sorts() {
        // テスト項目: 同じ id は一度だけ入り、タイムスタンプ順に並ぶ
        // given (前提条件):
        let mut cache = MessageCache::default();

        // when (操作):
        let first = cache.merge("general", frame(FrameType::Chat, "late", "bob", 30));
        cache.merge("general", frame(FrameType::Chat, "early", "bob", 10));
        let duplicate = cache.merge("general", frame(FrameType::Chat, "late", "bob", 30));
        let typing = cache.merge("general", frame(FrameType::Typing, "t", "bob", 20));

        // then (期待する結果):
        assert!(first);
        assert!(!duplicate);
        assert!(!typing);
        assert_eq!(ids(&cache, "general"), vec!["early", "late"]);
    }

    #[test]
    fn test_merge_caps_oldest() {
        // テスト項目: 上限を超えると最も古いメッセージから捨てる
        let mut cache = MessageCache::new(3);
        for i in 0..5 {
            cache.merge(
                "general",
                frame(FrameType::Chat, &format!("m{i}"), "bob", i),
            );
        }

        assert_eq!(ids(&cache, "general"), vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn test_status_only_moves_forward() {
        // テスト項目: 配信状態は前進のみで、read から delivered には戻らない
        // given (前提条件):
        let mut cache = MessageCache::default();
        cache.merge("general", frame(FrameType::Chat, "m1", "alice", 1));

        // when (操作):
        let to_read = cache.apply_status("general", "m1", DeliveryStatus::Read);
        let back = cache.apply_status("general", "m1", DeliveryStatus::Delivered);

        // then (期待する結果):
        assert!(to_read);
        assert!(!back);
        assert_eq!(
            cache.messages("general")[0].delivery_status(),
            Some(DeliveryStatus::Read)
        );
    }

    #[test]
    fn test_unread_from_others() {
        // テスト項目: 自分以外からの未読チャットだけが既読対象になる
        let mut cache = MessageCache::default();
        cache.merge("general", frame(FrameType::Chat, "mine", "alice", 1));
        cache.merge("general", frame(FrameType::Chat, "theirs", "bob", 2));
        cache.merge("general", frame(FrameType::Chat, "seen", "bob", 3));
        cache.apply_status("general", "seen", DeliveryStatus::Read);

        assert_eq!(cache.unread_from_others("general", "alice"), vec!["theirs"]);
    }
}
