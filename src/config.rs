use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::push::dispatcher::DispatcherConfig;
use crate::push::retry::{BackoffConfig, BackoffStrategy, HARD_RETRY_CEILING};
use crate::push::types::Platform;

const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// 推送服务配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushConfig {
    pub core: CoreConfig,
    pub ios: IosConfig,
    pub android: AndroidConfig,
    pub log: LogConfig,
}

/// 核心配置（启动后不可变）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// HTTP 监听地址
    pub host: String,
    /// HTTP 监听端口
    pub port: u16,
    /// 队列容量
    pub queue_capacity: usize,
    /// worker 数量
    pub worker_num: usize,
    /// max_retry 上限
    pub max_retry_ceiling: u32,
    /// 单次发送超时（毫秒）
    pub send_timeout_ms: u64,
    /// 关闭宽限期（毫秒）
    pub shutdown_grace_ms: u64,
    /// 单次请求 notifications 列表的长度上限（按 token 展开前计数）
    pub max_notifications: usize,
    /// 启用 Prometheus 指标
    pub enable_metrics: bool,
    /// 重试退避
    pub backoff: BackoffConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8088,
            queue_capacity: 8192,
            worker_num: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            max_retry_ceiling: 10,
            send_timeout_ms: 10_000,
            shutdown_grace_ms: 5_000,
            max_notifications: 100,
            enable_metrics: false,
            backoff: BackoffConfig::default(),
        }
    }
}

impl CoreConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// iOS (APNs) 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IosConfig {
    pub enabled: bool,
    /// .p8 私钥文件路径
    pub key_path: String,
    pub key_id: String,
    pub team_id: String,
    /// 默认 apns-topic（Bundle ID）
    pub topic: String,
    /// 生产环境 / 沙箱
    pub production: bool,
    /// 请求未指定时的默认重试次数
    pub max_retry: u32,
}

impl Default for IosConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            key_path: String::new(),
            key_id: String::new(),
            team_id: String::new(),
            topic: String::new(),
            production: false,
            max_retry: 0,
        }
    }
}

/// Android (FCM) 配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AndroidConfig {
    pub enabled: bool,
    pub api_key: String,
    pub max_retry: u32,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
    /// 推送结果日志格式：string / json
    pub format: String,
    /// 输出文件（为空则输出到 stdout）
    pub file: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "string".to_string(),
            file: None,
        }
    }
}

impl PushConfig {
    /// 从 TOML 文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("无法读取配置文件: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content).with_context(|| "配置文件格式错误")?;
        Ok(toml_config.into())
    }

    /// 从环境变量加载配置（PUSHRELAY_ 前缀）
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(host) = env::var("PUSHRELAY_HOST") {
            self.core.host = host;
        }
        if let Ok(port) = env::var("PUSHRELAY_PORT") {
            self.core.port = port.parse().unwrap_or(self.core.port);
        }
        if let Ok(capacity) = env::var("PUSHRELAY_QUEUE_CAPACITY") {
            self.core.queue_capacity = capacity.parse().unwrap_or(self.core.queue_capacity);
        }
        if let Ok(workers) = env::var("PUSHRELAY_WORKER_NUM") {
            self.core.worker_num = workers.parse().unwrap_or(self.core.worker_num);
        }
        if let Ok(key_path) = env::var("PUSHRELAY_IOS_KEY_PATH") {
            self.ios.key_path = key_path;
        }
        if let Ok(api_key) = env::var("PUSHRELAY_ANDROID_API_KEY") {
            self.android.api_key = api_key;
        }
        if let Ok(log_level) = env::var("PUSHRELAY_LOG_LEVEL") {
            self.log.level = log_level;
        }
        Ok(())
    }

    /// 从命令行参数合并配置
    pub fn merge_from_cli(&mut self, cli: &crate::cli::Cli) {
        if let Some(host) = &cli.host {
            self.core.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.core.port = port;
        }
        if let Some(key_path) = &cli.ios_key {
            self.ios.key_path = key_path.clone();
        }
        if let Some(api_key) = &cli.android_api_key {
            self.android.api_key = api_key.clone();
        }
        if let Some(workers) = cli.worker_num {
            self.core.worker_num = workers;
        }
        if let Some(capacity) = cli.queue_capacity {
            self.core.queue_capacity = capacity;
        }
        if cli.enable_metrics {
            self.core.enable_metrics = true;
        }
        if let Some(log_level) = cli.get_log_level() {
            self.log.level = log_level;
        }
        if let Some(log_file) = &cli.log_file {
            self.log.file = Some(log_file.clone());
        }
    }

    /// 加载配置（按优先级：命令行 > 环境变量 > 配置文件 > 默认值）
    pub fn load(cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if let Some(config_file) = &cli.config_file {
            if !Path::new(config_file).exists() {
                bail!("配置文件不存在: {}", config_file);
            }
            info!("📄 从配置文件加载: {}", config_file);
            Self::from_toml_file(config_file)?
        } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
            info!("📄 从默认配置文件加载: {}", DEFAULT_CONFIG_FILE);
            Self::from_toml_file(DEFAULT_CONFIG_FILE)?
        } else {
            Self::default()
        };

        config.merge_from_env()?;
        config.merge_from_cli(cli);

        if config.core.max_retry_ceiling > HARD_RETRY_CEILING {
            warn!(
                "⚠️ max_retry_ceiling {} 超过硬上限，截断为 {}",
                config.core.max_retry_ceiling, HARD_RETRY_CEILING
            );
            config.core.max_retry_ceiling = HARD_RETRY_CEILING;
        }

        Ok(config)
    }

    /// 启动前校验
    pub fn validate(&self) -> Result<()> {
        if !self.ios.enabled && !self.android.enabled {
            bail!("请在配置中启用 iOS 或 Android");
        }
        if self.ios.enabled && self.ios.key_path.is_empty() {
            bail!("iOS 私钥路径未配置 (ios.key_path)");
        }
        if self.android.enabled && self.android.api_key.is_empty() {
            bail!("Android API Key 未配置 (android.api_key)");
        }
        if self.core.queue_capacity == 0 {
            bail!("core.queue_capacity 必须大于 0");
        }
        if self.core.worker_num == 0 {
            bail!("core.worker_num 必须大于 0");
        }
        if self.core.backoff.max_ms < self.core.backoff.base_ms {
            bail!("core.backoff.max_ms 不能小于 base_ms");
        }
        Ok(())
    }

    /// 调度器参数
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        let mut default_max_retry = HashMap::new();
        default_max_retry.insert(Platform::Ios, self.ios.max_retry);
        default_max_retry.insert(Platform::Android, self.android.max_retry);

        DispatcherConfig {
            queue_capacity: self.core.queue_capacity,
            worker_num: self.core.worker_num,
            max_retry_ceiling: self.core.max_retry_ceiling,
            send_timeout: self.core.send_timeout(),
            backoff: self.core.backoff.clone(),
            default_max_retry,
        }
    }

    /// 隐藏凭证后的副本（用于展示）
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.android.api_key.is_empty() {
            config.android.api_key = "******".to_string();
        }
        config
    }
}

/// 快速读取 [log] 段，用于在完整配置加载前初始化日志
#[derive(Debug, Default)]
pub struct EarlyLogConfig {
    pub level: Option<String>,
    pub format: Option<String>,
    pub file: Option<String>,
}

pub fn load_early_logging_config(config_file: Option<&str>) -> EarlyLogConfig {
    let path = config_file.unwrap_or(DEFAULT_CONFIG_FILE);
    let Ok(content) = fs::read_to_string(path) else {
        return EarlyLogConfig::default();
    };

    #[derive(Deserialize)]
    struct EarlyToml {
        log: Option<TomlLogConfig>,
    }

    match toml::from_str::<EarlyToml>(&content) {
        Ok(EarlyToml { log: Some(log) }) => EarlyLogConfig {
            level: log.level,
            format: log.format,
            file: log.file,
        },
        _ => EarlyLogConfig::default(),
    }
}

/// TOML 配置文件结构（用于反序列化）
#[derive(Debug, Deserialize)]
struct TomlConfig {
    core: Option<TomlCoreConfig>,
    ios: Option<TomlIosConfig>,
    android: Option<TomlAndroidConfig>,
    log: Option<TomlLogConfig>,
}

#[derive(Debug, Deserialize)]
struct TomlCoreConfig {
    host: Option<String>,
    port: Option<u16>,
    queue_capacity: Option<usize>,
    worker_num: Option<usize>,
    max_retry_ceiling: Option<u32>,
    send_timeout_ms: Option<u64>,
    shutdown_grace_ms: Option<u64>,
    max_notifications: Option<usize>,
    enable_metrics: Option<bool>,
    backoff: Option<TomlBackoffConfig>,
}

#[derive(Debug, Deserialize)]
struct TomlBackoffConfig {
    strategy: Option<BackoffStrategy>,
    base_ms: Option<u64>,
    max_ms: Option<u64>,
    jitter: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TomlIosConfig {
    enabled: Option<bool>,
    key_path: Option<String>,
    key_id: Option<String>,
    team_id: Option<String>,
    topic: Option<String>,
    production: Option<bool>,
    max_retry: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TomlAndroidConfig {
    enabled: Option<bool>,
    api_key: Option<String>,
    max_retry: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TomlLogConfig {
    level: Option<String>,
    format: Option<String>,
    file: Option<String>,
}

impl From<TomlConfig> for PushConfig {
    fn from(toml: TomlConfig) -> Self {
        let mut config = Self::default();

        if let Some(core) = toml.core {
            if let Some(host) = core.host {
                config.core.host = host;
            }
            if let Some(port) = core.port {
                config.core.port = port;
            }
            if let Some(capacity) = core.queue_capacity {
                config.core.queue_capacity = capacity;
            }
            if let Some(workers) = core.worker_num {
                config.core.worker_num = workers;
            }
            if let Some(ceiling) = core.max_retry_ceiling {
                config.core.max_retry_ceiling = ceiling;
            }
            if let Some(timeout) = core.send_timeout_ms {
                config.core.send_timeout_ms = timeout;
            }
            if let Some(grace) = core.shutdown_grace_ms {
                config.core.shutdown_grace_ms = grace;
            }
            if let Some(max) = core.max_notifications {
                config.core.max_notifications = max;
            }
            if let Some(enable) = core.enable_metrics {
                config.core.enable_metrics = enable;
            }
            if let Some(backoff) = core.backoff {
                if let Some(strategy) = backoff.strategy {
                    config.core.backoff.strategy = strategy;
                }
                if let Some(base) = backoff.base_ms {
                    config.core.backoff.base_ms = base;
                }
                if let Some(max) = backoff.max_ms {
                    config.core.backoff.max_ms = max;
                }
                if let Some(jitter) = backoff.jitter {
                    config.core.backoff.jitter = jitter;
                }
            }
        }

        if let Some(ios) = toml.ios {
            if let Some(enabled) = ios.enabled {
                config.ios.enabled = enabled;
            }
            if let Some(key_path) = ios.key_path {
                config.ios.key_path = key_path;
            }
            if let Some(key_id) = ios.key_id {
                config.ios.key_id = key_id;
            }
            if let Some(team_id) = ios.team_id {
                config.ios.team_id = team_id;
            }
            if let Some(topic) = ios.topic {
                config.ios.topic = topic;
            }
            if let Some(production) = ios.production {
                config.ios.production = production;
            }
            if let Some(max_retry) = ios.max_retry {
                config.ios.max_retry = max_retry;
            }
        }

        if let Some(android) = toml.android {
            if let Some(enabled) = android.enabled {
                config.android.enabled = enabled;
            }
            if let Some(api_key) = android.api_key {
                config.android.api_key = api_key;
            }
            if let Some(max_retry) = android.max_retry {
                config.android.max_retry = max_retry;
            }
        }

        if let Some(log) = toml.log {
            if let Some(level) = log.level {
                config.log.level = level;
            }
            if let Some(format) = log.format {
                config.log.format = format;
            }
            if log.file.is_some() {
                config.log.file = log.file;
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml_merges_over_defaults() {
        let config = PushConfig::from_toml_str(
            r#"
[core]
port = 9000
queue_capacity = 10
worker_num = 2

[core.backoff]
strategy = "fixed"
base_ms = 50

[ios]
enabled = true
key_path = "/etc/push/key.p8"
max_retry = 1

[log]
format = "json"
"#,
        )
        .unwrap();

        assert_eq!(config.core.port, 9000);
        assert_eq!(config.core.queue_capacity, 10);
        assert_eq!(config.core.worker_num, 2);
        assert_eq!(config.core.backoff.strategy, BackoffStrategy::Fixed);
        assert_eq!(config.core.backoff.base_ms, 50);
        assert_eq!(config.core.backoff.max_ms, BackoffConfig::default().max_ms);
        assert!(config.ios.enabled);
        assert_eq!(config.ios.max_retry, 1);
        assert!(!config.android.enabled);
        assert_eq!(config.log.format, "json");
        assert_eq!(config.core.send_timeout_ms, 10_000);
    }

    #[test]
    fn test_validate_requires_credentials() {
        let mut config = PushConfig::default();
        assert!(config.validate().is_err());

        config.ios.enabled = true;
        assert!(config.validate().is_err());
        config.ios.key_path = "key.p8".to_string();
        assert!(config.validate().is_ok());

        config.android.enabled = true;
        assert!(config.validate().is_err());
        config.android.api_key = "secret".to_string();
        assert!(config.validate().is_ok());

        config.core.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dispatcher_config_and_redaction() {
        let mut config = PushConfig::default();
        config.android.api_key = "secret".to_string();
        config.android.max_retry = 3;

        let dispatcher = config.dispatcher_config();
        assert_eq!(dispatcher.default_max_retry[&Platform::Android], 3);
        assert_eq!(dispatcher.default_max_retry[&Platform::Ios], 0);

        assert_eq!(config.redacted().android.api_key, "******");
        assert_eq!(config.android.api_key, "secret");
    }

    #[test]
    fn test_early_logging_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("push.toml");
        fs::write(&path, "[log]\nlevel = \"debug\"\nformat = \"json\"\n").unwrap();

        let early = load_early_logging_config(path.to_str());
        assert_eq!(early.level.as_deref(), Some("debug"));
        assert_eq!(early.format.as_deref(), Some("json"));
        assert!(early.file.is_none());

        let missing = load_early_logging_config(Some("/nonexistent/push.toml"));
        assert!(missing.level.is_none());
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(PushConfig::from_toml_str("[core\nport = ").is_err());
    }
}
