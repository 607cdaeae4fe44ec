//! Prometheus 指标：推送结果、入口拒绝、重试次数、队列深度
//!
//! 通过 `init()` 安装全局 Recorder，通过 HTTP GET `/metrics` 暴露抓取端点。
//! 未初始化时各 `record_*` 调用为空操作。

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::OnceLock;

use crate::push::status::OutcomeKind;
use crate::push::types::Platform;

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// 指标名称
const COUNTER_PUSH_TOTAL: &str = "pushrelay_push_total";
const COUNTER_REJECTED_TOTAL: &str = "pushrelay_rejected_total";
const COUNTER_RETRY_TOTAL: &str = "pushrelay_retry_total";
const GAUGE_QUEUE_DEPTH: &str = "pushrelay_queue_depth";
const HISTOGRAM_QUEUE_WAIT: &str = "pushrelay_queue_wait_seconds";

/// 初始化 Prometheus 指标（安装全局 Recorder）。
/// 仅需在进程内调用一次；重复调用会返回 Err。
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    HANDLE
        .set(handle)
        .map_err(|_| "metrics already initialized")?;
    Ok(())
}

/// 是否已初始化
pub fn is_initialized() -> bool {
    HANDLE.get().is_some()
}

/// 渲染当前指标为 Prometheus 文本格式，供 GET /metrics 使用。
pub fn render_metrics() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

/// 记录一条终态结果
pub fn record_outcome(platform: Platform, kind: OutcomeKind) {
    metrics::counter!(
        COUNTER_PUSH_TOTAL,
        "platform" => platform.as_str(),
        "outcome" => kind.as_str()
    )
    .increment(1);
}

/// 记录入口拒绝（queue_full / invalid）
pub fn record_rejected(reason: &'static str) {
    metrics::counter!(COUNTER_REJECTED_TOTAL, "reason" => reason).increment(1);
}

/// 记录一次重新入队
pub fn record_retry(platform: Platform) {
    metrics::counter!(COUNTER_RETRY_TOTAL, "platform" => platform.as_str()).increment(1);
}

/// 更新队列深度（Gauge）
pub fn record_queue_depth(depth: usize) {
    metrics::gauge!(GAUGE_QUEUE_DEPTH).set(depth as f64);
}

/// 记录条目在队列中的等待时间
pub fn record_queue_wait(secs: f64) {
    metrics::histogram!(HISTOGRAM_QUEUE_WAIT).record(secs);
}
