//! HTTP 路由模块
//!
//! 路由结构：
//! - `POST /api/push` - 提交推送（按 token 展开，逐条返回入队结果）
//! - `GET /api/stat/app` - 推送统计
//! - `DELETE /api/stat/app` - 清零统计
//! - `GET /api/config` - 当前配置（隐藏凭证）
//! - `GET /healthz` - 健康检查
//! - `GET /metrics` - Prometheus 指标

pub mod config;
pub mod health;
pub mod metrics;
pub mod push;
pub mod stat;

use axum::{routing::get, Router};

use crate::http::HttpServerState;

/// 创建所有路由
pub fn create_routes() -> Router<HttpServerState> {
    Router::new()
        .route("/metrics", get(metrics::metrics_handler))
        .merge(health::create_route())
        .merge(push::create_route())
        .merge(stat::create_route())
        .merge(config::create_route())
}
