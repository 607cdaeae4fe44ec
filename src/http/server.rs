//! HTTP 服务器 - 使用 Axum 提供推送入口

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::PushConfig;
use crate::http::{middleware, routes};
use crate::push::Dispatcher;

/// HTTP 服务器共享状态
#[derive(Clone)]
pub struct HttpServerState {
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<PushConfig>,
}

/// 构建完整路由（含中间件）
pub fn create_app(state: HttpServerState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(axum::middleware::from_fn(middleware::access_log))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 推送 HTTP 服务器
pub struct PushHttpServer {
    state: HttpServerState,
    addr: String,
}

impl PushHttpServer {
    pub fn new(dispatcher: Arc<Dispatcher>, config: Arc<PushConfig>) -> Self {
        let addr = config.core.bind_address();
        Self {
            state: HttpServerState { dispatcher, config },
            addr,
        }
    }

    /// 启动 HTTP 服务器，`shutdown` 完成后停止接收新连接并等待在途请求结束
    pub async fn serve<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = create_app(self.state.clone());

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!("🌐 HTTP 推送服务启动在 {}", self.addr);

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        info!("🌐 HTTP 推送服务已停止接收请求");
        Ok(())
    }
}
