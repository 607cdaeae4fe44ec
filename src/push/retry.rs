//! 重试策略：根据失败分类和已尝试次数决定重新入队还是丢弃。
//!
//! 纯函数，不做 I/O，方便单独测试。

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::push::provider::FailureKind;

/// 调度器侧的最大重试次数硬上限，调用方和配置都无法突破
pub const HARD_RETRY_CEILING: u32 = 16;

/// 退避方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Fixed,
    Exponential,
}

/// 退避配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackoffConfig {
    pub strategy: BackoffStrategy,
    /// 基础延迟（毫秒）
    pub base_ms: u64,
    /// 延迟上限（毫秒）
    pub max_ms: u64,
    /// 抖动比例（0.0 ~ 1.0）
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            base_ms: 200,
            max_ms: 30_000,
            jitter: 0.1,
        }
    }
}

/// 丢弃原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// 永久失败，首次即丢弃
    Permanent,
    /// 客户端已降级
    Configuration,
    /// 达到最大重试次数
    RetryExhausted,
}

/// 重试决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    Drop(DropReason),
}

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    backoff: BackoffConfig,
    ceiling: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(BackoffConfig::default(), HARD_RETRY_CEILING)
    }
}

impl RetryPolicy {
    /// `ceiling` 会被截断到 `HARD_RETRY_CEILING`
    pub fn new(backoff: BackoffConfig, ceiling: u32) -> Self {
        Self {
            backoff,
            ceiling: ceiling.min(HARD_RETRY_CEILING),
        }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// 调用方给出的 max_retry 与上限取小
    pub fn effective_max_retry(&self, requested: u32) -> u32 {
        requested.min(self.ceiling)
    }

    /// attempt 从 0 开始；max_retry = R 时最多发送 R + 1 次
    pub fn decide(&self, attempt: u32, max_retry: u32, kind: FailureKind) -> RetryDecision {
        match kind {
            FailureKind::Permanent => RetryDecision::Drop(DropReason::Permanent),
            FailureKind::Configuration => RetryDecision::Drop(DropReason::Configuration),
            FailureKind::Transient => {
                if attempt >= self.effective_max_retry(max_retry) {
                    RetryDecision::Drop(DropReason::RetryExhausted)
                } else {
                    RetryDecision::Retry(self.delay_for(attempt))
                }
            }
        }
    }

    /// 第 attempt 次失败后的等待时间
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.backoff.base_ms;
        let raw = match self.backoff.strategy {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Exponential => {
                let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
                base.saturating_mul(factor)
            }
        };
        let capped = raw.min(self.backoff.max_ms);

        let jitter = self.backoff.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || capped == 0 {
            return Duration::from_millis(capped);
        }

        // [1 - jitter, 1 + jitter]，结果仍不超过上限
        let scale = 1.0 + jitter * (fastrand::f64() * 2.0 - 1.0);
        let jittered = ((capped as f64) * scale).round() as u64;
        Duration::from_millis(jittered.min(self.backoff.max_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(strategy: BackoffStrategy) -> RetryPolicy {
        RetryPolicy::new(
            BackoffConfig {
                strategy,
                base_ms: 100,
                max_ms: 1_000,
                jitter: 0.0,
            },
            5,
        )
    }

    #[test]
    fn test_permanent_never_retried() {
        let p = policy(BackoffStrategy::Fixed);
        assert_eq!(
            p.decide(0, 5, FailureKind::Permanent),
            RetryDecision::Drop(DropReason::Permanent)
        );
        assert_eq!(
            p.decide(0, 5, FailureKind::Configuration),
            RetryDecision::Drop(DropReason::Configuration)
        );
    }

    #[test]
    fn test_transient_retried_until_max() {
        let p = policy(BackoffStrategy::Fixed);
        assert!(matches!(p.decide(0, 2, FailureKind::Transient), RetryDecision::Retry(_)));
        assert!(matches!(p.decide(1, 2, FailureKind::Transient), RetryDecision::Retry(_)));
        assert_eq!(
            p.decide(2, 2, FailureKind::Transient),
            RetryDecision::Drop(DropReason::RetryExhausted)
        );
        assert_eq!(
            p.decide(0, 0, FailureKind::Transient),
            RetryDecision::Drop(DropReason::RetryExhausted)
        );
    }

    #[test]
    fn test_ceiling_caps_requested_max_retry() {
        let p = policy(BackoffStrategy::Fixed);
        assert_eq!(p.effective_max_retry(1_000), 5);
        assert_eq!(
            p.decide(5, 1_000, FailureKind::Transient),
            RetryDecision::Drop(DropReason::RetryExhausted)
        );

        let p = RetryPolicy::new(BackoffConfig::default(), u32::MAX);
        assert_eq!(p.ceiling(), HARD_RETRY_CEILING);
    }

    #[test]
    fn test_backoff_delays() {
        let p = policy(BackoffStrategy::Fixed);
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(7), Duration::from_millis(100));

        let p = policy(BackoffStrategy::Exponential);
        assert_eq!(p.delay_for(0), Duration::from_millis(100));
        assert_eq!(p.delay_for(1), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(800));
        assert_eq!(p.delay_for(4), Duration::from_millis(1_000));
        assert_eq!(p.delay_for(60), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let p = RetryPolicy::new(
            BackoffConfig {
                strategy: BackoffStrategy::Fixed,
                base_ms: 1_000,
                max_ms: 1_050,
                jitter: 0.5,
            },
            3,
        );
        for _ in 0..100 {
            let d = p.delay_for(0).as_millis() as u64;
            assert!((500..=1_050).contains(&d));
        }
    }
}
