use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{error, info, warn};

use crate::config::PushConfig;
use crate::http::PushHttpServer;
use crate::metrics;
use crate::push::{
    ApnsClient, Dispatcher, FcmClient, LogStatusReporter, PlatformClient, StatusFormat,
};

/// 推送服务器
///
/// 启动顺序：指标 → 平台客户端 → 调度器 → HTTP。
/// 关闭顺序相反：HTTP 停止接收 → 调度器在宽限期内收尾。
pub struct PushServer {
    config: Arc<PushConfig>,
}

impl PushServer {
    pub fn new(config: PushConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// 根据配置创建已启用平台的客户端
    pub fn build_clients(config: &PushConfig) -> Result<Vec<Arc<dyn PlatformClient>>> {
        let mut clients: Vec<Arc<dyn PlatformClient>> = Vec::new();

        if config.ios.enabled {
            let client = ApnsClient::new(&config.ios).context("初始化 APNs 客户端失败")?;
            info!(
                "🍎 APNs 客户端已就绪 (production={}, topic={})",
                config.ios.production, config.ios.topic
            );
            clients.push(Arc::new(client));
        }

        if config.android.enabled {
            let client =
                FcmClient::new(config.android.api_key.clone()).context("初始化 FCM 客户端失败")?;
            info!("🤖 FCM 客户端已就绪");
            clients.push(Arc::new(client));
        }

        Ok(clients)
    }

    /// 运行直到收到 Ctrl-C
    pub async fn run(self) -> Result<()> {
        self.config.validate().context("配置校验失败")?;

        if self.config.core.enable_metrics {
            match metrics::init() {
                Ok(()) => info!("📈 Prometheus 指标已启用 (GET /metrics)"),
                Err(e) => warn!("⚠️ Prometheus 指标初始化失败: {}", e),
            }
        }

        let clients = Self::build_clients(&self.config)?;
        let status_format = self
            .config
            .log
            .format
            .parse::<StatusFormat>()
            .unwrap_or_else(|e| {
                warn!("⚠️ {}, 推送结果日志使用 string 格式", e);
                StatusFormat::String
            });
        let reporter = Arc::new(LogStatusReporter::new(status_format));
        let dispatcher = Arc::new(Dispatcher::start(
            self.config.dispatcher_config(),
            clients,
            reporter,
        ));

        let http = PushHttpServer::new(dispatcher.clone(), self.config.clone());
        let serve_result = http.serve(shutdown_signal()).await;

        let grace = self.config.core.shutdown_grace();
        let report = dispatcher.stop(grace).await;
        info!(
            "🛑 推送服务已停止: drained={}, grace_period_elapsed={}",
            report.drained_from_queue, report.grace_period_elapsed
        );

        serve_result.map_err(|e| anyhow!("HTTP 服务运行失败: {}", e))
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("📴 收到关闭信号，开始优雅关闭"),
        Err(e) => {
            error!("❌ 监听关闭信号失败: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
