use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::push::provider::provider_trait::{PlatformClient, SendError};
use crate::push::types::{Notification, Platform};

type Handler = Arc<dyn Fn(&Notification) -> Result<(), SendError> + Send + Sync>;

/// Mock 客户端（用于测试和本地联调）
///
/// 不调用真实 API；结果由 handler 决定，默认全部成功。
pub struct MockClient {
    platform: Platform,
    handler: Handler,
    delay: Option<Duration>,
    degraded: AtomicBool,
    calls: AtomicUsize,
    calls_by_token: Mutex<HashMap<String, u32>>,
}

impl MockClient {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            handler: Arc::new(|_| Ok(())),
            delay: None,
            degraded: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            calls_by_token: Mutex::new(HashMap::new()),
        }
    }

    /// 自定义每次发送的结果
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Notification) -> Result<(), SendError> + Send + Sync + 'static,
    {
        self.handler = Arc::new(handler);
        self
    }

    /// 模拟网络延迟
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 总调用次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 某个 token 的调用次数
    pub fn calls_for(&self, token: &str) -> u32 {
        self.calls_by_token.lock().get(token).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PlatformClient for MockClient {
    async fn send(&self, notification: &Notification) -> Result<(), SendError> {
        if self.degraded.load(Ordering::Acquire) {
            return Err(SendError::Configuration("mock credential revoked".to_string()));
        }

        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_by_token
            .lock()
            .entry(notification.token.clone())
            .or_insert(0) += 1;

        info!(
            "[MOCK PUSH] Sending push: id={}, platform={}, token={}, attempt={}",
            notification.id,
            notification.platform,
            notification.token,
            notification.attempt()
        );

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = (self.handler)(notification);
        if let Err(SendError::Configuration(_)) = &result {
            self.degraded.store(true, Ordering::Release);
        }
        result
    }

    fn platform(&self) -> Platform {
        self.platform
    }

    fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::types::PushPayload;

    #[tokio::test]
    async fn test_mock_client_counts_and_degrades() {
        let client = MockClient::new(Platform::Android).with_handler(|n| {
            if n.token == "revoked" {
                Err(SendError::Configuration("revoked".to_string()))
            } else {
                Ok(())
            }
        });

        let ok = Notification::new(Platform::Android, "t1", PushPayload::default(), 0);
        assert!(client.send(&ok).await.is_ok());
        assert_eq!(client.calls_for("t1"), 1);

        let bad = Notification::new(Platform::Android, "revoked", PushPayload::default(), 0);
        assert!(client.send(&bad).await.is_err());
        assert!(client.is_degraded());

        // 降级后直接失败，不再计数
        assert!(matches!(client.send(&ok).await, Err(SendError::Configuration(_))));
        assert_eq!(client.calls(), 2);
    }
}
