use std::fmt;
use std::error::Error as StdError;
use serde::{Serialize, Deserialize};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response, Json},
};

/// 服务器错误类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServerError {
    /// 内部错误
    Internal(String),
    /// 推送请求校验失败（入队前拒绝）
    Validation(String),
    /// 队列已满（背压）
    QueueFull,
    /// 服务正在关闭，不再接收推送
    ShuttingDown,
    /// 推送平台临时错误（网络、超时、限流、5xx）
    TransientProvider(String),
    /// 推送平台永久错误（无效 token、payload、凭证）
    PermanentProvider(String),
    /// 配置错误（凭证全局失效，客户端已降级）
    Configuration(String),
    /// 关闭时被丢弃
    ShutdownDropped,
    /// 错误请求
    BadRequest(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Internal(msg) => write!(f, "Internal error: {}", msg),
            ServerError::Validation(msg) => write!(f, "Validation error: {}", msg),
            ServerError::QueueFull => write!(f, "Queue is full"),
            ServerError::ShuttingDown => write!(f, "Server is shutting down"),
            ServerError::TransientProvider(msg) => write!(f, "Transient provider error: {}", msg),
            ServerError::PermanentProvider(msg) => write!(f, "Permanent provider error: {}", msg),
            ServerError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            ServerError::ShutdownDropped => write!(f, "Dropped during shutdown"),
            ServerError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
        }
    }
}

impl StdError for ServerError {}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status_code = match &self {
            ServerError::Validation(_) | ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::QueueFull => StatusCode::TOO_MANY_REQUESTS,
            ServerError::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let error_response = ErrorResponse::new(&self);
        (status_code, Json(error_response)).into_response()
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ServerError>;

/// 错误代码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// 内部错误
    Internal = 1000,
    /// 校验错误
    Validation = 1003,
    /// 队列已满
    QueueFull = 3000,
    /// 正在关闭
    ShuttingDown = 3001,
    /// 平台临时错误
    TransientProvider = 4000,
    /// 平台永久错误
    PermanentProvider = 4001,
    /// 配置错误
    Configuration = 4002,
    /// 关闭丢弃
    ShutdownDropped = 4003,
    /// 错误请求
    BadRequest = 5004,
}

impl From<&ServerError> for ErrorCode {
    fn from(error: &ServerError) -> Self {
        match error {
            ServerError::Internal(_) => ErrorCode::Internal,
            ServerError::Validation(_) => ErrorCode::Validation,
            ServerError::QueueFull => ErrorCode::QueueFull,
            ServerError::ShuttingDown => ErrorCode::ShuttingDown,
            ServerError::TransientProvider(_) => ErrorCode::TransientProvider,
            ServerError::PermanentProvider(_) => ErrorCode::PermanentProvider,
            ServerError::Configuration(_) => ErrorCode::Configuration,
            ServerError::ShutdownDropped => ErrorCode::ShutdownDropped,
            ServerError::BadRequest(_) => ErrorCode::BadRequest,
        }
    }
}

/// 错误响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// 错误代码
    pub code: ErrorCode,
    /// 错误消息
    pub message: String,
    /// 详细信息
    pub details: Option<String>,
    /// 时间戳
    pub timestamp: u64,
}

impl ErrorResponse {
    /// 创建错误响应
    pub fn new(error: &ServerError) -> Self {
        Self {
            code: ErrorCode::from(error),
            message: error.to_string(),
            details: None,
            timestamp: chrono::Utc::now().timestamp() as u64,
        }
    }

    /// 创建带详细信息的错误响应
    pub fn with_details(error: &ServerError, details: String) -> Self {
        Self {
            code: ErrorCode::from(error),
            message: error.to_string(),
            details: Some(details),
            timestamp: chrono::Utc::now().timestamp() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(ErrorCode::from(&ServerError::QueueFull), ErrorCode::QueueFull);
        assert_eq!(
            ErrorCode::from(&ServerError::Validation("empty token".to_string())),
            ErrorCode::Validation
        );
        assert_eq!(ErrorCode::QueueFull as i32, 3000);
    }

    #[test]
    fn test_into_response_status() {
        let resp = ServerError::BadRequest("no notifications".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = ServerError::ShuttingDown.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

        let resp = ServerError::Configuration("bad key".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_provider_errors_have_own_codes() {
        let errors = [
            ServerError::TransientProvider("503".to_string()),
            ServerError::PermanentProvider("BadDeviceToken".to_string()),
            ServerError::Configuration("InvalidProviderToken".to_string()),
            ServerError::ShutdownDropped,
        ];
        let codes: Vec<i32> = errors.iter().map(|e| ErrorCode::from(e) as i32).collect();
        assert_eq!(codes, vec![4000, 4001, 4002, 4003]);
    }
}
