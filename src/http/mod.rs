//! HTTP 服务器模块 - 使用 Axum 提供推送入口 API
//!
//! 功能包括：
//! - 推送提交接口
//! - 推送统计查询 / 清零
//! - 配置查看（隐藏凭证）
//! - 健康检查与 Prometheus 指标

pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{create_app, HttpServerState, PushHttpServer};
