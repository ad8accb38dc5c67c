//! 日志系统配置模块
//! 支持结构化日志、日志级别配置和日志轮转

use std::path::Path;

use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::config::LoggingConfig;

/// 初始化日志系统
///
/// 返回的 guard 必须在进程生命周期内持有，否则非阻塞写入线程退出、
/// 文件日志丢失。
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let json = config.format == "json";

    if config.enable_file_logging {
        let log_dir = config
            .log_file_path
            .as_deref()
            .map(Path::new)
            .and_then(Path::parent)
            .unwrap_or_else(|| Path::new("./logs"));
        std::fs::create_dir_all(log_dir)?;

        let file_appender = rolling::daily(log_dir, "fundcore.log");
        let (writer, guard) = non_blocking(file_appender);

        if json {
            let file_layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_timer(ChronoUtc::rfc_3339());
            let stdout_layer = fmt::layer().json().with_timer(ChronoUtc::rfc_3339());
            Registry::default()
                .with(filter)
                .with(file_layer)
                .with(stdout_layer)
                .init();
        } else {
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_timer(ChronoUtc::rfc_3339());
            let stdout_layer = fmt::layer().with_timer(ChronoUtc::rfc_3339());
            Registry::default()
                .with(filter)
                .with(file_layer)
                .with(stdout_layer)
                .init();
        }
        Ok(Some(guard))
    } else {
        if json {
            Registry::default()
                .with(filter)
                .with(fmt::layer().json().with_timer(ChronoUtc::rfc_3339()))
                .init();
        } else {
            Registry::default()
                .with(filter)
                .with(fmt::layer().with_timer(ChronoUtc::rfc_3339()))
                .init();
        }
        Ok(None)
    }
}
