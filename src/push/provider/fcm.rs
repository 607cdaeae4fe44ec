use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::{Result, ServerError};
use crate::push::provider::provider_trait::{DegradedState, PlatformClient, SendError};
use crate::push::types::{Notification, Platform};

const FCM_SEND_URL: &str = "https://fcm.googleapis.com/fcm/send";

/// 单个 token 结果里的错误，不可重试
const PERMANENT_RESULT_ERRORS: &[&str] = &[
    "NotRegistered",
    "InvalidRegistration",
    "MissingRegistration",
    "MismatchSenderId",
    "MessageTooBig",
    "InvalidDataKey",
    "InvalidTtl",
    "InvalidPackageName",
];

/// FCM (Firebase Cloud Messaging) 客户端
///
/// 使用服务端 API Key 认证
pub struct FcmClient {
    client: Client,
    endpoint: String,
    api_key: String,
    degraded: DegradedState,
}

impl FcmClient {
    /// 创建新的 FCM 客户端
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_endpoint(api_key, FCM_SEND_URL)
    }

    /// 指定发送地址（用于代理或测试网关）
    pub fn with_endpoint(api_key: String, endpoint: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(ServerError::Configuration("FCM api key is empty".to_string()));
        }

        let client = Client::builder()
            .build()
            .map_err(|e| ServerError::Internal(format!("Failed to build FCM client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
            degraded: DegradedState::default(),
        })
    }

    /// 构建 FCM 消息 payload
    fn build_fcm_payload(notification: &Notification) -> serde_json::Value {
        let payload = &notification.payload;
        let android = &payload.android;

        let mut body = serde_json::Map::new();
        body.insert("to".to_string(), json!(notification.token));
        body.insert(
            "notification".to_string(),
            json!({
                "title": payload.title,
                "body": payload.message,
            }),
        );
        if let Some(data) = &payload.data {
            body.insert("data".to_string(), json!(data));
        }
        if let Some(collapse_key) = &android.collapse_key {
            body.insert("collapse_key".to_string(), json!(collapse_key));
        }
        if let Some(ttl) = android.time_to_live {
            body.insert("time_to_live".to_string(), json!(ttl));
        }
        if let Some(package) = &android.restricted_package_name {
            body.insert("restricted_package_name".to_string(), json!(package));
        }
        if android.dry_run {
            body.insert("dry_run".to_string(), json!(true));
        }
        if android.delay_while_idle {
            body.insert("delay_while_idle".to_string(), json!(true));
        }

        serde_json::Value::Object(body)
    }
}

/// 根据 HTTP 状态码和 results[0].error 分类
pub fn classify_fcm_response(status: u16, body: &str) -> std::result::Result<(), SendError> {
    match status {
        200 => {}
        401 => return Err(SendError::Configuration("FCM api key rejected (401)".to_string())),
        400 => return Err(SendError::Permanent(format!("FCM bad request: {}", body.trim()))),
        429 | 500..=599 => {
            return Err(SendError::Transient(format!("FCM unavailable: status={}", status)))
        }
        _ => return Err(SendError::Permanent(format!("FCM push failed: status={}", status))),
    }

    let parsed: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| SendError::Transient(format!("FCM response unreadable: {}", e)))?;

    let result_error = parsed
        .get("results")
        .and_then(|r| r.get(0))
        .and_then(|r| r.get("error"))
        .and_then(|e| e.as_str());

    match result_error {
        None => Ok(()),
        Some(error) if PERMANENT_RESULT_ERRORS.contains(&error) => {
            Err(SendError::Permanent(format!("FCM error: {}", error)))
        }
        Some(error) => Err(SendError::Transient(format!("FCM error: {}", error))),
    }
}

#[async_trait]
impl PlatformClient for FcmClient {
    async fn send(&self, notification: &Notification) -> std::result::Result<(), SendError> {
        self.degraded.check()?;

        let payload = Self::build_fcm_payload(notification);

        debug!(
            "[FCM] Sending push: id={}, attempt={}",
            notification.id,
            notification.attempt()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| SendError::Transient(format!("FCM request failed: {}", e)))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        match classify_fcm_response(status, &body) {
            Ok(()) => {
                info!("[FCM] Push sent successfully: id={}", notification.id);
                Ok(())
            }
            Err(SendError::Configuration(reason)) => {
                Err(self.degraded.degrade(Platform::Android, reason))
            }
            Err(err) => {
                warn!("[FCM] Push failed: id={}, error={}", notification.id, err);
                Err(err)
            }
        }
    }

    fn platform(&self) -> Platform {
        Platform::Android
    }

    fn is_degraded(&self) -> bool {
        self.degraded.is_degraded()
    }
}
