//! 推送统计：进程内原子计数器，不做 I/O、不阻塞。
//! 持久化由外部存储周期性调用 `read_snapshot` 完成。

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::push::types::Platform;

#[derive(Debug, Default)]
struct PlatformCounters {
    success: AtomicU64,
    fail: AtomicU64,
    shutdown_dropped: AtomicU64,
}

impl PlatformCounters {
    fn snapshot(&self) -> PlatformStats {
        PlatformStats {
            push_success: self.success.load(Ordering::Relaxed),
            push_error: self.fail.load(Ordering::Relaxed),
            shutdown_dropped: self.shutdown_dropped.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.success.store(0, Ordering::Relaxed);
        self.fail.store(0, Ordering::Relaxed);
        self.shutdown_dropped.store(0, Ordering::Relaxed);
    }
}

/// 单个平台的统计
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformStats {
    pub push_success: u64,
    pub push_error: u64,
    pub shutdown_dropped: u64,
}

/// 统计快照（只读）
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// 终态结果总数（成功 + 失败 + 关闭丢弃）
    pub total_count: u64,
    pub total_success: u64,
    pub total_fail: u64,
    pub shutdown_dropped: u64,
    /// 入口拒绝（不算在投递结果里）
    pub rejected_queue_full: u64,
    pub rejected_invalid: u64,
    pub ios: PlatformStats,
    pub android: PlatformStats,
}

/// 统计收集器
#[derive(Debug, Default)]
pub struct StatsCollector {
    ios: PlatformCounters,
    android: PlatformCounters,
    rejected_queue_full: AtomicU64,
    rejected_invalid: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, platform: Platform) -> &PlatformCounters {
        match platform {
            Platform::Ios => &self.ios,
            Platform::Android => &self.android,
        }
    }

    pub fn increment_success(&self, platform: Platform) {
        self.counters(platform).success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fail(&self, platform: Platform) {
        self.counters(platform).fail.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_shutdown_dropped(&self, platform: Platform) {
        self.counters(platform)
            .shutdown_dropped
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rejected_queue_full(&self) {
        self.rejected_queue_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rejected_invalid(&self) {
        self.rejected_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn read_snapshot(&self) -> StatsSnapshot {
        let ios = self.ios.snapshot();
        let android = self.android.snapshot();
        let total_success = ios.push_success + android.push_success;
        let total_fail = ios.push_error + android.push_error;
        let shutdown_dropped = ios.shutdown_dropped + android.shutdown_dropped;

        StatsSnapshot {
            total_count: total_success + total_fail + shutdown_dropped,
            total_success,
            total_fail,
            shutdown_dropped,
            rejected_queue_full: self.rejected_queue_full.load(Ordering::Relaxed),
            rejected_invalid: self.rejected_invalid.load(Ordering::Relaxed),
            ios,
            android,
        }
    }

    /// 管理操作：清零所有计数
    pub fn reset(&self) {
        self.ios.reset();
        self.android.reset();
        self.rejected_queue_full.store(0, Ordering::Relaxed);
        self.rejected_invalid.store(0, Ordering::Relaxed);
    }
}
