use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::error::ServerError;
use crate::push::types::{Notification, Platform};

/// 终态结果类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeKind {
    SucceededPush,
    FailedPush,
    RetryExhausted,
    ShutdownDropped,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::SucceededPush => "succeeded-push",
            OutcomeKind::FailedPush => "failed-push",
            OutcomeKind::RetryExhausted => "retry-exhausted",
            OutcomeKind::ShutdownDropped => "shutdown-dropped",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeKind::SucceededPush)
    }
}

/// 一条推送的终态结果，每个被接收的 Notification 恰好产生一次
#[derive(Debug, Clone)]
pub struct PushOutcome {
    pub kind: OutcomeKind,
    pub notification: Notification,
    pub error: Option<ServerError>,
}

impl PushOutcome {
    pub fn succeeded(notification: Notification) -> Self {
        Self {
            kind: OutcomeKind::SucceededPush,
            notification,
            error: None,
        }
    }

    pub fn failed(notification: Notification, error: ServerError) -> Self {
        Self {
            kind: OutcomeKind::FailedPush,
            notification,
            error: Some(error),
        }
    }

    pub fn retry_exhausted(notification: Notification, error: ServerError) -> Self {
        Self {
            kind: OutcomeKind::RetryExhausted,
            notification,
            error: Some(error),
        }
    }

    pub fn shutdown_dropped(notification: Notification) -> Self {
        Self {
            kind: OutcomeKind::ShutdownDropped,
            notification,
            error: Some(ServerError::ShutdownDropped),
        }
    }

    pub fn platform(&self) -> Platform {
        self.notification.platform
    }

    pub fn error_text(&self) -> String {
        self.error.as_ref().map(|e| e.to_string()).unwrap_or_default()
    }
}

/// 终态结果的出口（日志、审计等）
pub trait StatusReporter: Send + Sync {
    fn emit(&self, outcome: &PushOutcome);
}

/// 推送日志格式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFormat {
    #[default]
    String,
    Json,
}

impl FromStr for StatusFormat {
    type Err = String;

    /// `pretty` / `compact` 是日志格式，推送结果日志按 string 输出
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(StatusFormat::Json),
            "string" | "pretty" | "compact" | "" => Ok(StatusFormat::String),
            other => Err(format!("unknown status format: {}", other)),
        }
    }
}

/// 推送结果日志条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogPushEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub platform: String,
    pub token: String,
    pub message: String,
    pub error: String,
    pub attempt: u32,

    // Android
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collapse_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub dry_run: bool,

    // iOS
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apns_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl LogPushEntry {
    pub fn from_outcome(outcome: &PushOutcome) -> Self {
        let n = &outcome.notification;
        let mut entry = Self {
            kind: outcome.kind.as_str().to_string(),
            platform: n.platform.as_str().to_string(),
            token: n.token.clone(),
            message: n.payload.message.clone(),
            error: outcome.error_text(),
            attempt: n.attempt(),
            collapse_key: None,
            time_to_live: None,
            dry_run: false,
            apns_id: None,
            badge: None,
            sound: None,
            category: None,
        };

        match n.platform {
            Platform::Ios => {
                entry.apns_id = Some(n.id.clone());
                entry.badge = n.payload.ios.badge;
                entry.sound = n.payload.ios.sound.clone();
                entry.category = n.payload.ios.category.clone();
            }
            Platform::Android => {
                entry.collapse_key = n.payload.android.collapse_key.clone();
                entry.time_to_live = n.payload.android.time_to_live;
                entry.dry_run = n.payload.android.dry_run;
            }
        }

        entry
    }

    /// 文本格式
    pub fn to_line(&self) -> String {
        if self.error.is_empty() {
            format!("| {} | {} [{}] {}", self.kind, self.platform, self.token, self.message)
        } else {
            format!(
                "| {} | {} [{}] | {} | Error Message: {}",
                self.kind, self.platform, self.token, self.message, self.error
            )
        }
    }
}

/// 默认实现：成功写 info，失败写 error
#[derive(Debug, Clone, Default)]
pub struct LogStatusReporter {
    format: StatusFormat,
}

impl LogStatusReporter {
    pub fn new(format: StatusFormat) -> Self {
        Self { format }
    }

    fn render(&self, entry: &LogPushEntry) -> String {
        match self.format {
            StatusFormat::Json => serde_json::to_string(entry).unwrap_or_else(|_| entry.to_line()),
            StatusFormat::String => entry.to_line(),
        }
    }
}

impl StatusReporter for LogStatusReporter {
    fn emit(&self, outcome: &PushOutcome) {
        let line = self.render(&LogPushEntry::from_outcome(outcome));
        if outcome.kind.is_success() {
            info!(target: "pushrelay::status", "{}", line);
        } else {
            error!(target: "pushrelay::status", "{}", line);
        }
    }
}
