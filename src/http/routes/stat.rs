//! 推送统计接口

use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use serde_json::{json, Value};

use crate::http::HttpServerState;
use crate::push::StatsSnapshot;

pub fn create_route() -> Router<HttpServerState> {
    Router::new().route("/api/stat/app", get(get_app_stats).delete(reset_app_stats))
}

/// 统计快照 + 队列使用情况
#[derive(Debug, Serialize)]
pub struct AppStats {
    #[serde(flatten)]
    pub snapshot: StatsSnapshot,
    pub queue_max: usize,
    /// 含退避中重试预留的空位
    pub queue_usage: usize,
    pub pending_retries: usize,
}

async fn get_app_stats(State(state): State<HttpServerState>) -> Json<AppStats> {
    let dispatcher = &state.dispatcher;
    Json(AppStats {
        snapshot: dispatcher.read_snapshot(),
        queue_max: dispatcher.queue_capacity(),
        queue_usage: dispatcher.queue_usage(),
        pending_retries: dispatcher.pending_retries(),
    })
}

async fn reset_app_stats(State(state): State<HttpServerState>) -> Json<Value> {
    state.dispatcher.reset_snapshot();
    Json(json!({ "success": true }))
}
