//! 推送提交接口

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ErrorResponse, ServerError};
use crate::http::HttpServerState;
use crate::push::{IngressResult, PushRequest};

pub fn create_route() -> Router<HttpServerState> {
    Router::new().route("/api/push", post(push_notification))
}

/// 请求体
#[derive(Debug, Deserialize)]
pub struct PushBody {
    #[serde(default)]
    pub notifications: Vec<PushRequest>,
}

/// 单个成员的入队结果
#[derive(Debug, Serialize)]
pub struct PushResultItem {
    pub index: usize,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PushResultItem {
    fn new(index: usize, result: IngressResult) -> Self {
        let (status, id, error) = match result {
            IngressResult::Accepted(id) => ("accepted", Some(id), None),
            IngressResult::RejectedQueueFull => (
                "rejected_queue_full",
                None,
                Some(ServerError::QueueFull.to_string()),
            ),
            IngressResult::RejectedInvalid(reason) => ("rejected_invalid", None, Some(reason)),
            IngressResult::RejectedShuttingDown => (
                "rejected_shutting_down",
                None,
                Some(ServerError::ShuttingDown.to_string()),
            ),
        };
        Self {
            index,
            status,
            id,
            error,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PushResponse {
    /// 成功入队的数量
    pub counts: usize,
    pub results: Vec<PushResultItem>,
}

/// 提交推送
///
/// 每个 PushRequest 按 token 展开，`results` 与展开后的顺序一一对应；
/// 没有 token 的 PushRequest 占一个 `rejected_invalid` 结果。
/// 入队是非阻塞的：队列放不下的成员返回 `rejected_queue_full`，由调用方决定是否重试。
async fn push_notification(
    State(state): State<HttpServerState>,
    body: Result<Json<PushBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!("推送请求解析失败: {}", rejection.body_text());
            let error = ServerError::BadRequest("invalid request body".to_string());
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::with_details(&error, rejection.body_text())),
            )
                .into_response();
        }
    };

    if body.notifications.is_empty() {
        return ServerError::BadRequest("notifications field is empty".to_string()).into_response();
    }

    let max = state.config.core.max_notifications;
    if max > 0 && body.notifications.len() > max {
        return ServerError::BadRequest(format!(
            "number of notifications ({}) over limit ({})",
            body.notifications.len(),
            max
        ))
        .into_response();
    }

    let results = state.dispatcher.push_requests(body.notifications);
    let counts = results.iter().filter(|r| r.is_accepted()).count();
    debug!("推送请求入队: accepted={}, total={}", counts, results.len());

    let results = results
        .into_iter()
        .enumerate()
        .map(|(index, result)| PushResultItem::new(index, result))
        .collect();

    Json(PushResponse { counts, results }).into_response()
}
