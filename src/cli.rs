use clap::{Parser, Subcommand};

impl Cli {
    /// 解析命令行参数
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

/// PushRelay - iOS / Android 推送分发服务
#[derive(Parser, Debug, Default)]
#[command(name = "pushrelay")]
#[command(version)]
#[command(about = "APNs / FCM 推送通知分发服务", long_about = None)]
pub struct Cli {
    /// 配置文件路径
    #[arg(long, short = 'c', value_name = "FILE", help = "指定配置文件路径")]
    pub config_file: Option<String>,

    /// 服务器监听地址
    #[arg(long, value_name = "ADDRESS", help = "HTTP 监听地址")]
    pub host: Option<String>,

    /// HTTP 端口
    #[arg(long, short = 'p', value_name = "PORT", help = "HTTP 监听端口")]
    pub port: Option<u16>,

    /// iOS 私钥路径
    #[arg(long, short = 'i', value_name = "FILE", help = "APNs .p8 私钥文件路径")]
    pub ios_key: Option<String>,

    /// Android API Key
    #[arg(long, short = 'k', value_name = "KEY", help = "FCM 服务端 API Key")]
    pub android_api_key: Option<String>,

    /// worker 数量
    #[arg(long, value_name = "NUM", help = "推送 worker 数量")]
    pub worker_num: Option<usize>,

    /// 队列容量
    #[arg(long, value_name = "NUM", help = "推送队列容量")]
    pub queue_capacity: Option<usize>,

    /// 日志级别
    #[arg(
        long,
        value_name = "LEVEL",
        help = "日志级别: trace, debug, info, warn, error"
    )]
    pub log_level: Option<String>,

    /// 日志格式
    #[arg(long, value_name = "FORMAT", help = "日志格式: pretty, json, compact")]
    pub log_format: Option<String>,

    /// 日志文件路径
    #[arg(long, value_name = "PATH", help = "日志输出文件路径（stdout / stderr 为特殊值）")]
    pub log_file: Option<String>,

    /// 启用监控指标
    #[arg(long, help = "启用 Prometheus 监控指标")]
    pub enable_metrics: bool,

    /// 详细输出（可重复使用：-v, -vv, -vvv）
    #[arg(short, action = clap::ArgAction::Count, help = "详细输出级别")]
    pub verbose: u8,

    /// 静默模式
    #[arg(long, short = 'q', help = "静默模式（只输出错误）")]
    pub quiet: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 生成默认配置文件
    GenerateConfig {
        /// 输出文件路径
        #[arg(value_name = "PATH", default_value = "config.toml")]
        path: String,
    },
    /// 验证配置文件
    ValidateConfig {
        /// 配置文件路径
        #[arg(value_name = "PATH", default_value = "config.toml")]
        path: String,
    },
    /// 显示最终配置（合并后的配置）
    ShowConfig,
}

impl Cli {
    /// 获取日志级别（考虑 verbose 和 quiet）
    pub fn get_log_level(&self) -> Option<String> {
        if self.quiet {
            return Some("error".to_string());
        }

        if let Some(level) = &self.log_level {
            return Some(level.clone());
        }

        match self.verbose {
            0 => None,
            1 => Some("info".to_string()),
            2 => Some("debug".to_string()),
            _ => Some("trace".to_string()),
        }
    }

    /// 获取日志格式
    pub fn get_log_format(&self) -> Option<String> {
        self.log_format.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_flags() {
        let cli = <Cli as Parser>::try_parse_from([
            "pushrelay", "-c", "push.toml", "-p", "9000", "-i", "key.p8", "-k", "secret", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.config_file.as_deref(), Some("push.toml"));
        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.ios_key.as_deref(), Some("key.p8"));
        assert_eq!(cli.android_api_key.as_deref(), Some("secret"));
        assert_eq!(cli.get_log_level().as_deref(), Some("debug"));
    }

    #[test]
    fn test_quiet_wins_over_log_level() {
        let cli =
            <Cli as Parser>::try_parse_from(["pushrelay", "--quiet", "--log-level", "trace"])
                .unwrap();
        assert_eq!(cli.get_log_level().as_deref(), Some("error"));
    }

    #[test]
    fn test_subcommand() {
        let cli = <Cli as Parser>::try_parse_from(["pushrelay", "validate-config", "a.toml"])
            .unwrap();
        match cli.command {
            Some(Commands::ValidateConfig { path }) => assert_eq!(path, "a.toml"),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
