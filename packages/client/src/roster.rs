//! Presence roster maintained from the presence channel.

use std::collections::BTreeMap;

use hiroba_shared::{Frame, FrameType, ParticipantInfo, PresenceStatus};

#[derive(Debug, Default, Clone)]
pub struct Roster {
    users: BTreeMap<String, ParticipantInfo>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a presence frame; `true` if it was one.
    pub fn apply(&mut self, frame: &Frame) -> bool {
        match frame.kind {
            FrameType::PresenceJoin | FrameType::PresenceUpdate => {
                let Some(user) = frame.user_id.clone() else {
                    return false;
                };
                let status = frame.presence_status().unwrap_or(PresenceStatus::Online);
                let display_name = frame
                    .display_name
                    .clone()
                    .or_else(|| self.users.get(&user).map(|u| u.display_name.clone()))
                    .unwrap_or_else(|| user.clone());
                self.users.insert(
                    user.clone(),
                    ParticipantInfo {
                        id: user,
                        display_name,
                        status,
                    },
                );
                true
            }
            FrameType::PresenceFullSync => {
                for participant in frame.participants.iter().flatten() {
                    self.users
                        .insert(participant.id.clone(), participant.clone());
                }
                true
            }
            _ => false,
        }
    }

    pub fn status_of(&self, user: &str) -> Option<PresenceStatus> {
        self.users.get(user).map(|u| u.status)
    }

    pub fn users(&self) -> impl Iterator<Item = &ParticipantInfo> {
        self.users.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_sync_then_offline_update() {
        // テスト項目: full sync で一覧を取り込み、presence_update で状態が変わる
        // given (前提条件):
        let mut roster = Roster::new();
        let sync = Frame {
            participants: Some(vec![ParticipantInfo {
                id: "bob".to_string(),
                display_name: "Bob".to_string(),
                status: PresenceStatus::Busy,
            }]),
            ..Frame::new(FrameType::PresenceFullSync)
        };
        let offline = Frame {
            user_id: Some("bob".to_string()),
            status: Some("offline".to_string()),
            ..Frame::new(FrameType::PresenceUpdate)
        };

        // when (操作):
        roster.apply(&sync);
        let busy = roster.status_of("bob");
        roster.apply(&offline);

        // then (期待する結果):
        assert_eq!(busy, Some(PresenceStatus::Busy));
        assert_eq!(roster.status_of("bob"), Some(PresenceStatus::Offline));
        assert_eq!(roster.users().next().unwrap().display_name, "Bob");
    }

    #[test]
    fn test_ignores_other_frames() {
        // テスト項目: プレゼンス以外のフレームは無視する
        let mut roster = Roster::new();
        assert!(!roster.apply(&Frame::ping()));
        assert_eq!(roster.users().count(), 0);
    }
}
