use std::path::Path;

use anyhow::{anyhow, Result};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 初始化日志系统
///
/// `log_file` 为空或为 `stdout` 时输出到标准输出，`stderr` 输出到标准错误，
/// 其余值视为文件路径（追加写入）。返回的 guard 需要在进程生命周期内保持存活。
pub fn init_logging(
    log_level: &str,
    log_format: Option<&str>,
    log_file: Option<&str>,
    quiet: bool,
) -> Result<WorkerGuard> {
    // 如果静默模式，只输出错误
    let level = if quiet { "error" } else { log_level };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (writer, guard) = make_writer(log_file)?;
    let ansi = matches!(log_file, None | Some("stdout") | Some("stderr") | Some(""));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match log_format {
        Some("json") => registry
            .with(fmt::layer().json().with_writer(writer))
            .try_init(),
        Some("pretty") | Some("dev") => registry
            .with(fmt::layer().pretty().with_ansi(ansi).with_writer(writer))
            .try_init(),
        _ => registry
            .with(fmt::layer().compact().with_ansi(ansi).with_writer(writer))
            .try_init(),
    };
    result.map_err(|e| anyhow!("日志系统初始化失败: {}", e))?;

    Ok(guard)
}

fn make_writer(log_file: Option<&str>) -> Result<(NonBlocking, WorkerGuard)> {
    match log_file {
        None | Some("") | Some("stdout") => Ok(tracing_appender::non_blocking(std::io::stdout())),
        Some("stderr") => Ok(tracing_appender::non_blocking(std::io::stderr())),
        Some(path) => {
            let path = Path::new(path);
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow!("无效的日志文件路径: {:?}", path))?;
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            Ok(tracing_appender::non_blocking(appender))
        }
    }
}
