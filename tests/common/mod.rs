#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use pushrelay::push::{
    BackoffConfig, BackoffStrategy, DispatcherConfig, Notification, OutcomeKind, Platform,
    PushOutcome, PushPayload, StatusReporter,
};

/// 收集所有终态结果
#[derive(Default)]
pub struct CollectingReporter {
    outcomes: Mutex<Vec<PushOutcome>>,
    notify: Notify,
}

impl CollectingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn outcomes(&self) -> Vec<PushOutcome> {
        self.outcomes.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.outcomes.lock().len()
    }

    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.outcomes.lock().iter().filter(|o| o.kind == kind).count()
    }

    pub fn for_token(&self, token: &str) -> Vec<PushOutcome> {
        self.outcomes
            .lock()
            .iter()
            .filter(|o| o.notification.token == token)
            .cloned()
            .collect()
    }

    /// 等待至少 `n` 个结果，超时 panic
    pub async fn wait_for(&self, n: usize, timeout: Duration) {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.len() >= n {
                    return;
                }
                notified.await;
            }
        };
        if tokio::time::timeout(timeout, wait).await.is_err() {
            panic!("expected {} outcomes, got {}", n, self.len());
        }
    }
}

impl StatusReporter for CollectingReporter {
    fn emit(&self, outcome: &PushOutcome) {
        self.outcomes.lock().push(outcome.clone());
        self.notify.notify_waiters();
    }
}

pub fn fast_backoff() -> BackoffConfig {
    BackoffConfig {
        strategy: BackoffStrategy::Fixed,
        base_ms: 10,
        max_ms: 10,
        jitter: 0.0,
    }
}

pub fn config(queue_capacity: usize, worker_num: usize) -> DispatcherConfig {
    DispatcherConfig {
        queue_capacity,
        worker_num,
        backoff: fast_backoff(),
        ..Default::default()
    }
}

pub fn notification(platform: Platform, token: &str, max_retry: u32) -> Notification {
    let payload = PushPayload {
        message: "hello".to_string(),
        ..Default::default()
    };
    Notification::new(platform, token, payload, max_retry)
}
