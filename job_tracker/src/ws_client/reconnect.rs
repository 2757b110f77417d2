// job_tracker/src/ws_client/reconnect.rs

//! 持久连接的重连策略：有上限的指数退避加随机抖动。
//!
//! `delay = min(base * 2^attempt + jitter, max)`，抖动在 `[0, max_jitter)` 内均匀分布。
//! 连续重连次数达到 `max_attempts` 后放弃。

use crate::config::ReconnectConfig;
use rand::Rng;
use std::time::Duration;

/// 一次意外断开后的决定。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 等待指定时长后重连。
    Retry(Duration),
    /// 已达到次数上限，不再安排重连。
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// 根据当前已重连次数决定是否以及何时重连。
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.config.max_attempts {
            return RetryDecision::GiveUp;
        }
        let jitter_ms = if self.config.max_jitter_ms > 0 {
            rand::thread_rng().gen_range(0..self.config.max_jitter_ms)
        } else {
            0
        };
        RetryDecision::Retry(self.delay_for(attempt, jitter_ms))
    }

    /// 给定抖动值时的退避时长。
    pub fn delay_for(&self, attempt: u32, jitter_ms: u64) -> Duration {
        let exponential = self
            .config
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let delay_ms = exponential
            .saturating_add(jitter_ms)
            .min(self.config.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy::new(ReconnectConfig::default())
    }

    #[test]
    fn test_delay_doubles_from_base() {
        let policy = policy();
        assert_eq!(policy.delay_for(0, 0), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(1, 0), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(3, 250), Duration::from_millis(8_250));
    }

    #[test]
    fn test_delay_is_monotonic_and_capped() {
        let policy = policy();
        for jitter in [0, 500, 999] {
            let mut previous = Duration::ZERO;
            for attempt in 0..64 {
                let delay = policy.delay_for(attempt, jitter);
                assert!(delay >= previous, "第 {} 次重连的等待时间不应减少", attempt);
                assert!(delay <= Duration::from_millis(30_000));
                previous = delay;
            }
            assert_eq!(previous, Duration::from_millis(30_000));
        }
    }

    #[test]
    fn test_sampled_delay_stays_within_jitter_window() {
        let policy = policy();
        for _ in 0..100 {
            match policy.decide(2) {
                RetryDecision::Retry(delay) => {
                    assert!(delay >= Duration::from_millis(4_000));
                    assert!(delay < Duration::from_millis(5_000));
                }
                RetryDecision::GiveUp => panic!("未达到上限时不应放弃"),
            }
        }
    }

    #[test]
    fn test_gives_up_at_ceiling() {
        let policy = ReconnectPolicy::new(ReconnectConfig { max_attempts: 3, ..ReconnectConfig::default() });
        assert!(matches!(policy.decide(2), RetryDecision::Retry(_)));
        assert_eq!(policy.decide(3), RetryDecision::GiveUp);
        assert_eq!(policy.decide(4), RetryDecision::GiveUp);
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let policy = ReconnectPolicy::new(ReconnectConfig { max_jitter_ms: 0, ..ReconnectConfig::default() });
        assert_eq!(policy.decide(0), RetryDecision::Retry(Duration::from_millis(1_000)));
    }
}
