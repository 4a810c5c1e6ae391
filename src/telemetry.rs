//! 日志初始化

use tracing_subscriber::EnvFilter;

use crate::error::{DriverError, Result};

/// 安装全局 tracing subscriber
///
/// 过滤规则优先读取 `RUST_LOG`，否则使用 `default_directive`（如 `"info"`）。
/// 启用 `json-log` feature 时输出 JSON。重复初始化返回错误，不会 panic。
pub fn init(default_directive: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| DriverError::Config(format!("invalid log filter: {}", e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    #[cfg(feature = "json-log")]
    let result = builder.json().try_init();
    #[cfg(not(feature = "json-log"))]
    let result = builder.try_init();

    result.map_err(|e| DriverError::Config(format!("tracing already initialized: {}", e)))
}
