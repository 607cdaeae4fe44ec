//! 配置查看接口

use axum::{extract::State, response::Json, routing::get, Router};

use crate::config::PushConfig;
use crate::http::HttpServerState;

pub fn create_route() -> Router<HttpServerState> {
    Router::new().route("/api/config", get(get_config))
}

/// 当前生效的配置，凭证字段已隐藏
async fn get_config(State(state): State<HttpServerState>) -> Json<PushConfig> {
    Json(state.config.redacted())
}
