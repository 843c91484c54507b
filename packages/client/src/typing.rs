//! Typing indicators of other users.
//!
//! Updates are buffered and applied in batches by [`TypingTracker::flush`],
//! which the session calls every [`TYPING_FLUSH_INTERVAL`]. An indicator
//! expires on its own after [`TYPING_TTL`].

use std::{collections::HashMap, time::Duration};

use tokio::time::Instant;

/// Lifetime of a typing indicator without a refresh
pub const TYPING_TTL: Duration = Duration::from_secs(6);

/// Batching interval of typing updates
pub const TYPING_FLUSH_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq)]
struct TypingUpdate {
    room: String,
    user: String,
    is_typing: bool,
}

#[derive(Debug, Default)]
pub struct TypingTracker {
    pending: Vec<TypingUpdate>,
    active: HashMap<(String, String), Instant>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a typing frame until the next flush.
    pub fn observe(&mut self, room: &str, user: &str, is_typing: bool) {
        self.pending.push(TypingUpdate {
            room: room.to_string(),
            user: user.to_string(),
            is_typing,
        });
    }

    /// A chat from `user` ends their typing immediately.
    pub fn clear(&mut self, room: &str, user: &str) {
        self.pending.retain(|u| !(u.room == room && u.user == user));
        self.active.remove(&(room.to_string(), user.to_string()));
    }

    /// Apply buffered updates and drop expired indicators.
    ///
    /// Returns `true` when the visible set changed.
    pub fn flush(&mut self, now: Instant) -> bool {
        let mut changed = false;
        for update in self.pending.drain(..) {
            let key = (update.room, update.user);
            if update.is_typing {
                changed |= self.active.insert(key, now).is_none();
            } else {
                changed |= self.active.remove(&key).is_some();
            }
        }
        let before = self.active.len();
        self.active
            .retain(|_, since| now.duration_since(*since) < TYPING_TTL);
        changed || self.active.len() != before
    }

    /// Users currently typing in `room`, sorted.
    pub fn typing_in(&self, room: &str) -> Vec<String> {
        let mut users: Vec<String> = self
            .active
            .keys()
            .filter(|(r, _)| r == room)
            .map(|(_, user)| user.clone())
            .collect();
        users.sort();
        users
    }
}
