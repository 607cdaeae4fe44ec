use anyhow::{Context, Result};
use pushrelay::{
    cli::{Cli, Commands},
    config::{self, PushConfig},
    logging, PushServer,
};
use std::fs;
use std::process;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载 .env 文件（如果存在）
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // 处理子命令
    if let Some(command) = &cli.command {
        match command {
            Commands::GenerateConfig { path } => {
                return generate_config(path);
            }
            Commands::ValidateConfig { path } => {
                return validate_config(path);
            }
            Commands::ShowConfig => {
                return show_config(&cli);
            }
        }
    }

    // 快速读取 config.toml 的 [log] 段（不加载完整配置）
    let early_log = config::load_early_logging_config(cli.config_file.as_deref());

    // 合并日志配置（优先级：CLI > config.toml > 默认值）
    let log_level = cli
        .get_log_level()
        .or(early_log.level)
        .unwrap_or_else(|| "info".to_string());
    // [log].format 的 string 对应默认的 compact 输出
    let log_format = cli
        .get_log_format()
        .or(early_log.format.filter(|f| f != "string"));
    let log_file = cli.log_file.as_deref().or(early_log.file.as_deref());

    let _log_guard = logging::init_logging(&log_level, log_format.as_deref(), log_file, cli.quiet)?;

    tracing::info!("🚀 PushRelay starting...");

    // 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    let config = PushConfig::load(&cli).context("加载配置失败")?;

    tracing::info!("📊 Server Configuration:");
    tracing::info!("  - HTTP: {}", config.core.bind_address());
    tracing::info!("  - Workers: {}", config.core.worker_num);
    tracing::info!("  - Queue Capacity: {}", config.core.queue_capacity);
    tracing::info!("  - Max Retry Ceiling: {}", config.core.max_retry_ceiling);
    tracing::info!("  - Send Timeout: {}ms", config.core.send_timeout_ms);
    tracing::info!("  - Shutdown Grace: {}ms", config.core.shutdown_grace_ms);
    tracing::info!("  - iOS: {}", config.ios.enabled);
    tracing::info!("  - Android: {}", config.android.enabled);
    tracing::info!("  - Metrics: {}", config.core.enable_metrics);
    tracing::info!("  - Log Level: {}", config.log.level);
    if let Some(f) = log_file {
        tracing::info!("  - Log File: {}", f);
    }

    if let Err(e) = PushServer::new(config).run().await {
        tracing::error!("❌ 服务器运行失败: {:#}", e);
        tracing::error!("💡 请检查配置与推送凭证后重试");
        process::exit(1);
    }

    Ok(())
}

/// 生成默认配置文件
fn generate_config(path: &str) -> Result<()> {
    let default_config = r#"# PushRelay 配置文件
# 此文件由 pushrelay generate-config 生成

[core]
host = "0.0.0.0"
port = 8088
queue_capacity = 8192
# worker_num 默认为 CPU 核数
# worker_num = 8
max_retry_ceiling = 10
send_timeout_ms = 10000
shutdown_grace_ms = 5000
max_notifications = 100
enable_metrics = false

[core.backoff]
strategy = "exponential"  # fixed / exponential
base_ms = 200
max_ms = 30000
jitter = 0.1

[ios]
enabled = false
key_path = "key.p8"
key_id = ""
team_id = ""
topic = ""
production = false
max_retry = 0

[android]
enabled = false
api_key = ""
max_retry = 0

[log]
level = "info"
format = "string"  # string / json
# file = "./logs/pushrelay.log"
"#;

    fs::write(path, default_config).with_context(|| format!("无法写入配置文件: {}", path))?;

    println!("✅ 配置文件已生成: {}", path);
    Ok(())
}

/// 验证配置文件
fn validate_config(path: &str) -> Result<()> {
    let config = PushConfig::from_toml_file(path)
        .with_context(|| format!("配置文件验证失败: {}", path))?;
    config
        .validate()
        .with_context(|| format!("配置文件验证失败: {}", path))?;

    println!("✅ 配置文件有效: {}", path);
    println!("📊 配置摘要:");
    println!("  - HTTP: {}", config.core.bind_address());
    println!("  - Workers: {}", config.core.worker_num);
    println!("  - Queue Capacity: {}", config.core.queue_capacity);
    println!("  - iOS: {}", config.ios.enabled);
    println!("  - Android: {}", config.android.enabled);

    Ok(())
}

/// 显示最终配置（合并后的配置）
fn show_config(cli: &Cli) -> Result<()> {
    let _log_guard = logging::init_logging("info", None, None, false)?;

    let config = PushConfig::load(cli).context("加载配置失败")?;

    println!("📊 最终配置（合并后的配置）:");
    println!("{}", toml::to_string_pretty(&config.redacted())?);

    Ok(())
}
