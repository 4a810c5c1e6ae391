//! 驱动错误处理模块
//!
//! 所有对外操作都返回 [`DriverError`]，每个错误都能映射到稳定的 [`ErrorCode`]，
//! 便于日志检索和宿主侧分类处理。

pub mod code;
pub mod conversions;

pub use code::ErrorCode;

use thiserror::Error;

/// 驱动统一错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// 目标地址不是合法的 URL
    #[error("malformed url '{url}': {reason}")]
    MalformedUrl { url: String, reason: String },

    /// 不支持的 scheme
    #[error("unknown scheme: {0}")]
    UnsupportedScheme(String),

    /// TLS 文件缺失或不可读
    #[error("tls config error for '{path}': {reason}")]
    TlsConfig { path: String, reason: String },

    /// Nacos 地址格式错误（必须是 host:port）
    #[error("nacos host '{0}' must be in host:port form")]
    NacosHostFormat(String),

    /// 无法拆分的 RPC 地址
    #[error("bad url: '{url}'. {reason}")]
    BadUrl { url: String, reason: String },

    /// 后端客户端构建或注册失败
    #[error("{backend} backend error: {message}")]
    Backend { backend: &'static str, message: String },

    /// IO 错误
    #[error("io error: {0}")]
    Io(String),

    /// 序列化错误
    #[error("serialization error: {0}")]
    Serialization(String),

    /// 配置错误
    #[error("config error: {0}")]
    Config(String),
}

impl DriverError {
    pub fn malformed_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        DriverError::MalformedUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn tls(path: impl Into<String>, reason: impl Into<String>) -> Self {
        DriverError::TlsConfig {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn bad_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        DriverError::BadUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn backend(backend: &'static str, message: impl Into<String>) -> Self {
        DriverError::Backend {
            backend,
            message: message.into(),
        }
    }

    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            DriverError::MalformedUrl { .. } => ErrorCode::MalformedUrl,
            DriverError::UnsupportedScheme(_) => ErrorCode::UnsupportedScheme,
            DriverError::TlsConfig { .. } => ErrorCode::TlsConfig,
            DriverError::NacosHostFormat(_) => ErrorCode::NacosHostFormat,
            DriverError::BadUrl { .. } => ErrorCode::BadUrl,
            DriverError::Backend { .. } => ErrorCode::BackendFailed,
            DriverError::Io(_) => ErrorCode::IoError,
            DriverError::Serialization(_) => ErrorCode::SerializationError,
            DriverError::Config(_) => ErrorCode::ConfigurationError,
        }
    }
}

/// 驱动结果类型
pub type Result<T> = std::result::Result<T, DriverError>;
