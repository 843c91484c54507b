//! Reconnect backoff.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with jitter: `min(max, base * 2^attempts) + [0, jitter)`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: Duration,
    attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(1),
            Duration::from_secs(30),
            Duration::from_secs(1),
        )
    }
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter: Duration) -> Self {
        Self {
            base,
            max,
            jitter,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Forget past failures after a successful open.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Delay before the next attempt without jitter.
    pub fn base_delay(&self) -> Duration {
        let factor = 2u32.checked_pow(self.attempts).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Delay before the next attempt; counts the attempt.
    pub fn next_delay(&mut self) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..jitter_ms))
        };
        let delay = self.base_delay() + jitter;
        self.attempts = self.attempts.saturating_add(1);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_up_to_cap() {
        // テスト項目: 待ち時間は 1, 2, 4, ... 秒と倍増し、30 秒で頭打ちになる
        // given (前提条件):
        let mut backoff = Backoff::new(
            Duration::from_secs(1),
            Duration::from_secs(30),
            Duration::ZERO,
        );

        // when (操作):
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();

        // then (期待する結果):
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
        assert_eq!(backoff.attempts(), 7);
    }

    #[test]
    fn test_jitter_stays_below_bound() {
        // テスト項目: ジッターは 0 以上 1 秒未満
        let mut backoff = Backoff::default();
        for _ in 0..20 {
            backoff.reset();
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_secs(1));
            assert!(delay < Duration::from_secs(2));
        }
    }

    #[test]
    fn test_reset_restarts_sequence() {
        // テスト項目: reset 後は最初の待ち時間に戻る
        let mut backoff = Backoff::new(
            Duration::from_secs(1),
            Duration::from_secs(30),
            Duration::ZERO,
        );
        backoff.next_delay();
        backoff.next_delay();

        backoff.reset();

        assert_eq!(backoff.base_delay(), Duration::from_secs(1));
    }
}
