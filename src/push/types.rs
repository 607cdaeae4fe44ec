use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ServerError};

/// iOS badge / sound / category 等字段的最大长度
const MAX_IOS_FIELD_LEN: usize = 256;
/// FCM collapse_key 最大长度
const MAX_COLLAPSE_KEY_LEN: usize = 256;
/// APNs apns-collapse-id 上限
const MAX_APNS_COLLAPSE_ID_LEN: usize = 64;
/// FCM time_to_live 上限（4 周，秒）
pub const MAX_TIME_TO_LIVE: u32 = 2_419_200;

/// 推送平台
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase", try_from = "PlatformRepr")]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Ios, Platform::Android];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }

    /// 兼容旧客户端的数字编码：1 = iOS，2 = Android
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Platform::Ios),
            2 => Some(Platform::Android),
            _ => None,
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ios" | "apns" => Ok(Platform::Ios),
            "android" | "fcm" => Ok(Platform::Android),
            _ => Err(format!("unknown platform: {}", s)),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlatformRepr {
    Code(u8),
    Name(String),
}

impl TryFrom<PlatformRepr> for Platform {
    type Error = String;

    fn try_from(repr: PlatformRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            PlatformRepr::Code(code) => {
                Platform::from_code(code).ok_or_else(|| format!("unknown platform code: {}", code))
            }
            PlatformRepr::Name(name) => name.parse(),
        }
    }
}

/// iOS 专有字段（Android 客户端忽略）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IosOptions {
    pub badge: Option<i64>,
    pub sound: Option<String>,
    pub category: Option<String>,
    pub topic: Option<String>,
    /// apns-collapse-id
    pub collapse_id: Option<String>,
    #[serde(default)]
    pub content_available: bool,
}

/// Android 专有字段（iOS 客户端忽略）
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AndroidOptions {
    pub collapse_key: Option<String>,
    pub time_to_live: Option<u32>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub delay_while_idle: bool,
    pub restricted_package_name: Option<String>,
}

/// 推送 Payload
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PushPayload {
    pub message: String,
    pub title: Option<String>,
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
    pub ios: IosOptions,
    pub android: AndroidOptions,
}

/// 单条推送（设备级）
///
/// 入口处构造并校验一次，之后只有 attempt 会在重新入队时递增。
#[derive(Debug, Clone)]
pub struct Notification {
    pub id: String,
    pub platform: Platform,
    pub token: String,
    pub payload: PushPayload,
    pub max_retry: u32,
    pub created_at: DateTime<Utc>,
    attempt: u32,
}

impl Notification {
    pub fn new(platform: Platform, token: impl Into<String>, payload: PushPayload, max_retry: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            platform,
            token: token.into(),
            payload,
            max_retry,
            created_at: Utc::now(),
            attempt: 0,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// 重新入队前调用
    pub fn bump_attempt(&mut self) {
        self.attempt += 1;
    }

    /// 校验 token 与当前平台相关的 payload 字段
    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(ServerError::Validation("token is required".to_string()));
        }
        // token 会拼进 APNs 请求路径
        if self.token.contains(&['/', '?', '#'][..]) {
            return Err(ServerError::Validation(
                "token contains invalid characters".to_string(),
            ));
        }
        if self.payload.message.trim().is_empty() {
            return Err(ServerError::Validation("message is required".to_string()));
        }

        match self.platform {
            Platform::Ios => {
                let ios = &self.payload.ios;
                if matches!(ios.badge, Some(badge) if badge < 0) {
                    return Err(ServerError::Validation("badge must not be negative".to_string()));
                }
                for (name, value) in [("sound", &ios.sound), ("category", &ios.category)] {
                    if value.as_ref().is_some_and(|v| v.len() > MAX_IOS_FIELD_LEN) {
                        return Err(ServerError::Validation(format!("{} is too long", name)));
                    }
                }
                if ios
                    .collapse_id
                    .as_ref()
                    .is_some_and(|id| id.len() > MAX_APNS_COLLAPSE_ID_LEN)
                {
                    return Err(ServerError::Validation("collapse_id is too long".to_string()));
                }
            }
            Platform::Android => {
                let android = &self.payload.android;
                if android.time_to_live.is_some_and(|ttl| ttl > MAX_TIME_TO_LIVE) {
                    return Err(ServerError::Validation(format!(
                        "time_to_live must be at most {} seconds",
                        MAX_TIME_TO_LIVE
                    )));
                }
                if android
                    .collapse_key
                    .as_ref()
                    .is_some_and(|key| key.len() > MAX_COLLAPSE_KEY_LEN)
                {
                    return Err(ServerError::Validation("collapse_key is too long".to_string()));
                }
            }
        }

        Ok(())
    }
}

/// 队列条目：入队时创建，出队时销毁
#[derive(Debug)]
pub struct QueueEntry {
    pub notification: Notification,
    pub enqueued_at: Instant,
}

impl QueueEntry {
    pub fn new(notification: Notification) -> Self {
        Self {
            notification,
            enqueued_at: Instant::now(),
        }
    }
}

/// HTTP 入口的推送请求（一个请求可带多个 token）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushRequest {
    pub platform: Platform,
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub message: String,
    pub title: Option<String>,
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
    pub max_retry: Option<u32>,

    // iOS
    pub badge: Option<i64>,
    pub sound: Option<String>,
    pub category: Option<String>,
    pub topic: Option<String>,
    pub collapse_id: Option<String>,
    #[serde(default)]
    pub content_available: bool,

    // Android
    pub collapse_key: Option<String>,
    pub time_to_live: Option<u32>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub delay_while_idle: bool,
    pub restricted_package_name: Option<String>,
}

impl PushRequest {
    /// 按 token 展开为设备级 Notification（未校验）
    pub fn into_notifications(self, default_max_retry: u32) -> Vec<Notification> {
        let payload = PushPayload {
            message: self.message,
            title: self.title,
            data: self.data,
            ios: IosOptions {
                badge: self.badge,
                sound: self.sound,
                category: self.category,
                topic: self.topic,
                collapse_id: self.collapse_id,
                content_available: self.content_available,
            },
            android: AndroidOptions {
                collapse_key: self.collapse_key,
                time_to_live: self.time_to_live,
                dry_run: self.dry_run,
                delay_while_idle: self.delay_while_idle,
                restricted_package_name: self.restricted_package_name,
            },
        };
        let max_retry = self.max_retry.unwrap_or(default_max_retry);
        let platform = self.platform;

        self.tokens
            .into_iter()
            .map(|token| Notification::new(platform, token, payload.clone(), max_retry))
            .collect()
    }
}
