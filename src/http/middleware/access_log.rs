//! 访问日志中间件

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::{ConnectInfo, Request},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::info;

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string()
}

/// 记录每个请求的 method / uri / ip / content-type / user-agent
pub async fn access_log(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string());
    let content_type = header_str(request.headers(), header::CONTENT_TYPE);
    let agent = header_str(request.headers(), header::USER_AGENT);

    let response = next.run(request).await;

    info!(
        target: "pushrelay::access",
        method = %method,
        uri = %uri,
        ip = %ip,
        content_type = %content_type,
        agent = %agent,
        status = response.status().as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "HTTP request"
    );

    response
}
