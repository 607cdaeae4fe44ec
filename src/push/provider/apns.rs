use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use parking_lot::RwLock;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::IosConfig;
use crate::error::{Result, ServerError};
use crate::push::provider::provider_trait::{DegradedState, PlatformClient, SendError};
use crate::push::types::{Notification, Platform};

const PRODUCTION_HOST: &str = "https://api.push.apple.com";
const SANDBOX_HOST: &str = "https://api.sandbox.push.apple.com";

/// APNs 要求 provider token 至少 20 分钟、至多 60 分钟刷新一次
const TOKEN_REFRESH_SECS: i64 = 50 * 60;

/// 凭证层面的错误，出现即降级
const CREDENTIAL_REASONS: &[&str] = &[
    "InvalidProviderToken",
    "MissingProviderToken",
    "BadCertificate",
    "BadCertificateEnvironment",
    "Forbidden",
];

/// APNs (Apple Push Notification service) 客户端
///
/// 使用 HTTP/2 API + ES256 provider token 认证。私钥启动时读取一次，
/// 之后只读，所有 worker 共享同一个 `reqwest::Client`。
pub struct ApnsClient {
    client: Client,
    host: String,
    topic: String,
    team_id: String,
    key_id: String,
    private_key: EncodingKey,
    cached_token: RwLock<Option<(String, i64)>>,
    degraded: DegradedState,
}

impl ApnsClient {
    /// 从配置创建 APNs 客户端（读取 .p8 私钥文件）
    pub fn new(config: &IosConfig) -> Result<Self> {
        let private_key_content = std::fs::read_to_string(&config.key_path).map_err(|e| {
            ServerError::Configuration(format!("Failed to read APNs private key: {}", e))
        })?;

        let host = if config.production { PRODUCTION_HOST } else { SANDBOX_HOST };

        Self::from_pem(
            private_key_content.as_bytes(),
            host,
            &config.topic,
            &config.team_id,
            &config.key_id,
        )
    }

    /// 直接使用 PEM 内容创建（host 可指向自定义网关）
    pub fn from_pem(
        pem: &[u8],
        host: &str,
        topic: &str,
        team_id: &str,
        key_id: &str,
    ) -> Result<Self> {
        let private_key = EncodingKey::from_ec_pem(pem).map_err(|e| {
            ServerError::Configuration(format!("Failed to parse APNs private key: {}", e))
        })?;

        let client = Client::builder()
            .pool_idle_timeout(None)
            .build()
            .map_err(|e| ServerError::Internal(format!("Failed to build APNs client: {}", e)))?;

        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
            topic: topic.to_string(),
            team_id: team_id.to_string(),
            key_id: key_id.to_string(),
            private_key,
            cached_token: RwLock::new(None),
            degraded: DegradedState::default(),
        })
    }

    /// 获取 provider token，过期前复用
    fn provider_token(&self) -> std::result::Result<String, SendError> {
        let now = chrono::Utc::now().timestamp();

        if let Some((token, issued_at)) = self.cached_token.read().as_ref() {
            if now - issued_at < TOKEN_REFRESH_SECS {
                return Ok(token.clone());
            }
        }

        let claims = json!({
            "iss": self.team_id,
            "iat": now
        });

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());

        // 签名失败说明私钥本身不可用
        let token = encode(&header, &claims, &self.private_key).map_err(|e| {
            self.degraded
                .degrade(Platform::Ios, format!("Failed to sign APNs token: {}", e))
        })?;

        *self.cached_token.write() = Some((token.clone(), now));
        Ok(token)
    }

    fn invalidate_token(&self) {
        *self.cached_token.write() = None;
    }

    /// 构建 APNs 消息 payload
    fn build_apns_payload(notification: &Notification) -> serde_json::Value {
        let payload = &notification.payload;
        let ios = &payload.ios;

        let mut aps = serde_json::Map::new();
        aps.insert(
            "alert".to_string(),
            match &payload.title {
                Some(title) => json!({ "title": title, "body": payload.message }),
                None => json!(payload.message),
            },
        );
        if let Some(badge) = ios.badge {
            aps.insert("badge".to_string(), json!(badge));
        }
        if let Some(sound) = &ios.sound {
            aps.insert("sound".to_string(), json!(sound));
        }
        if let Some(category) = &ios.category {
            aps.insert("category".to_string(), json!(category));
        }
        if ios.content_available {
            aps.insert("content-available".to_string(), json!(1));
        }

        let mut body = serde_json::Map::new();
        body.insert("aps".to_string(), serde_json::Value::Object(aps));
        if let Some(data) = &payload.data {
            for (key, value) in data {
                if key != "aps" {
                    body.insert(key.clone(), value.clone());
                }
            }
        }

        serde_json::Value::Object(body)
    }
}

/// 根据 HTTP 状态码和 APNs reason 分类
pub fn classify_apns_response(status: u16, body: &str) -> std::result::Result<(), SendError> {
    if (200..300).contains(&status) {
        return Ok(());
    }

    let reason = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("reason").and_then(|r| r.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("status={}", status));

    match status {
        403 if CREDENTIAL_REASONS.contains(&reason.as_str()) => {
            Err(SendError::Configuration(format!("APNs error: {} ({})", reason, status)))
        }
        // token 过期，刷新后可重试
        403 if reason == "ExpiredProviderToken" => {
            Err(SendError::Transient(format!("APNs error: {} ({})", reason, status)))
        }
        429 | 500..=599 => Err(SendError::Transient(format!("APNs error: {} ({})", reason, status))),
        _ => Err(SendError::Permanent(format!("APNs error: {} ({})", reason, status))),
    }
}

#[async_trait]
impl PlatformClient for ApnsClient {
    async fn send(&self, notification: &Notification) -> std::result::Result<(), SendError> {
        self.degraded.check()?;

        let jwt_token = self.provider_token()?;
        let url = format!("{}/3/device/{}", self.host, notification.token);
        let payload = Self::build_apns_payload(notification);
        let topic = notification.payload.ios.topic.as_deref().unwrap_or(&self.topic);
        let push_type = if notification.payload.ios.content_available
            && notification.payload.message.is_empty()
        {
            "background"
        } else {
            "alert"
        };

        debug!(
            "[APNS] Sending push: id={}, attempt={}",
            notification.id,
            notification.attempt()
        );

        let mut request = self
            .client
            .post(&url)
            .header("authorization", format!("bearer {}", jwt_token))
            .header("apns-topic", topic)
            .header("apns-priority", "10")
            .header("apns-push-type", push_type)
            .header("apns-id", notification.id.as_str());
        if let Some(collapse_id) = &notification.payload.ios.collapse_id {
            request = request.header("apns-collapse-id", collapse_id.as_str());
        }

        let response = request
            .json(&payload)
            .send()
            .await
            .map_err(|e| SendError::Transient(format!("APNs request failed: {}", e)))?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        match classify_apns_response(status, &body) {
            Ok(()) => {
                info!("[APNS] Push sent successfully: id={}", notification.id);
                Ok(())
            }
            Err(SendError::Configuration(reason)) => {
                self.invalidate_token();
                Err(self.degraded.degrade(Platform::Ios, reason))
            }
            Err(err) => {
                if err.reason().contains("ExpiredProviderToken") {
                    self.invalidate_token();
                }
                warn!("[APNS] Push failed: id={}, error={}", notification.id, err);
                Err(err)
            }
        }
    }

    fn platform(&self) -> Platform {
        Platform::Ios
    }

    fn is_degraded(&self) -> bool {
        self.degraded.is_degraded()
    }
}
