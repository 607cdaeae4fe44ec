use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::error;

use crate::error::ServerError;
use crate::push::types::{Notification, Platform};

/// 失败分类，重试策略只看这一项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// 可重试：网络错误、限流、5xx、超时
    Transient,
    /// 不可重试：无效 token、payload 错误
    Permanent,
    /// 凭证全局失效，客户端已降级
    Configuration,
}

/// 单次发送失败
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("permanent failure: {0}")]
    Permanent(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SendError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SendError::Transient(_) => FailureKind::Transient,
            SendError::Permanent(_) => FailureKind::Permanent,
            SendError::Configuration(_) => FailureKind::Configuration,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            SendError::Transient(reason)
            | SendError::Permanent(reason)
            | SendError::Configuration(reason) => reason,
        }
    }
}

impl From<SendError> for ServerError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::Transient(reason) => ServerError::TransientProvider(reason),
            SendError::Permanent(reason) => ServerError::PermanentProvider(reason),
            SendError::Configuration(reason) => ServerError::Configuration(reason),
        }
    }
}

/// 推送平台客户端接口
///
/// 每个实现持有一份长连接/凭证，需要支持多个 worker 并发调用 `send`。
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// 发送一条推送并对结果分类
    async fn send(&self, notification: &Notification) -> Result<(), SendError>;

    /// 客户端对应的平台
    fn platform(&self) -> Platform;

    /// 凭证已失效时返回 true，此后 `send` 直接返回 `SendError::Configuration`
    fn is_degraded(&self) -> bool {
        false
    }
}

/// 凭证降级状态，APNs / FCM 客户端共用
#[derive(Debug, Default)]
pub struct DegradedState {
    degraded: AtomicBool,
    reason: RwLock<Option<String>>,
}

impl DegradedState {
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// 标记为降级，返回对应的 `SendError::Configuration`
    pub fn degrade(&self, platform: Platform, reason: impl Into<String>) -> SendError {
        let reason = reason.into();
        let mut slot = self.reason.write();
        if slot.is_none() {
            error!(
                "[{}] Credential rejected, client degraded: {}",
                platform.as_str().to_uppercase(),
                reason
            );
            *slot = Some(reason.clone());
        }
        self.degraded.store(true, Ordering::Release);
        SendError::Configuration(reason)
    }

    /// 已降级时直接失败
    pub fn check(&self) -> Result<(), SendError> {
        if self.is_degraded() {
            let reason = self
                .reason
                .read()
                .clone()
                .unwrap_or_else(|| "credential invalid".to_string());
            return Err(SendError::Configuration(reason));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_error_kind_and_conversion() {
        let err = SendError::Transient("503".to_string());
        assert_eq!(err.kind(), FailureKind::Transient);
        assert_eq!(err.reason(), "503");

        let err = SendError::Configuration("InvalidProviderToken".to_string());
        assert_eq!(
            ServerError::from(err),
            ServerError::Configuration("InvalidProviderToken".to_string())
        );
    }

    #[test]
    fn test_degraded_state_fails_fast() {
        let state = DegradedState::default();
        assert!(state.check().is_ok());

        let err = state.degrade(Platform::Ios, "ExpiredProviderToken");
        assert_eq!(err.kind(), FailureKind::Configuration);
        assert!(state.is_degraded());
        assert_eq!(
            state.check(),
            Err(SendError::Configuration("ExpiredProviderToken".to_string()))
        );

        // 第一次的原因保留
        state.degrade(Platform::Ios, "other");
        assert_eq!(
            state.check(),
            Err(SendError::Configuration("ExpiredProviderToken".to_string()))
        );
    }
}
