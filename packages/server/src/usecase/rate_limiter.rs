//! Sliding-window rate limiting and per-user throttles.

use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};

use tokio::time::Instant;

use crate::domain::UserId;

/// Frames accepted per user inside one sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_frames: usize,
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_frames: 15,
            window: Duration::from_secs(60),
        }
    }
}

/// Per-user sliding window limiter.
///
/// Only accepted frames are recorded, so a flood of rejected frames does not
/// extend the penalty.
#[derive(Debug, Default)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    hits: HashMap<UserId, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            hits: HashMap::new(),
        }
    }

    /// Record a frame from `user` at `now`.
    ///
    /// Returns `false` when the user already has `max_frames` accepted frames
    /// in the trailing window; the rejected frame is not recorded.
    pub fn check(&mut self, user: &UserId, now: Instant) -> bool {
        let window = self.policy.window;
        let hits = self.hits.entry(user.clone()).or_default();
        while let Some(oldest) = hits.front() {
            if now.duration_since(*oldest) >= window {
                hits.pop_front();
            } else {
                break;
            }
        }
        if hits.len() >= self.policy.max_frames {
            return false;
        }
        hits.push_back(now);
        true
    }

    /// Forget the window of a user who has no remaining connection.
    pub fn release(&mut self, user: &UserId) {
        self.hits.remove(user);
    }
}

/// Minimum interval between two actions of the same user.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last: HashMap<UserId, Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: HashMap::new(),
        }
    }

    /// Claim the slot for `user`; `false` if the previous claim is too recent.
    pub fn try_acquire(&mut self, user: &UserId, now: Instant) -> bool {
        if let Some(previous) = self.last.get(user)
            && now.duration_since(*previous) < self.interval
        {
            return false;
        }
        self.last.insert(user.clone(), now);
        true
    }

    pub fn release(&mut self, user: &UserId) {
        self.last.remove(user);
    }
}
