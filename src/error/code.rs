//! 错误代码定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 驱动错误代码
///
/// 错误代码按类别分组：
/// - 1000-1999: 目标地址解析错误
/// - 2000-2999: TLS 配置错误
/// - 3000-3999: 后端错误
/// - 9000-9999: 通用错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    // ============================================================
    // 目标地址解析错误 (1000-1999)
    // ============================================================
    MalformedUrl = 1000,
    UnsupportedScheme = 1001,
    NacosHostFormat = 1002,
    BadUrl = 1003,

    // ============================================================
    // TLS 配置错误 (2000-2999)
    // ============================================================
    TlsConfig = 2000,

    // ============================================================
    // 后端错误 (3000-3999)
    // ============================================================
    BackendFailed = 3000,

    // ============================================================
    // 通用错误 (9000-9999)
    // ============================================================
    IoError = 9000,
    SerializationError = 9001,
    ConfigurationError = 9002,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl ErrorCode {
    /// 获取错误代码的数字值
    #[inline]
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// 从数字值创建错误代码
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            1000 => Some(ErrorCode::MalformedUrl),
            1001 => Some(ErrorCode::UnsupportedScheme),
            1002 => Some(ErrorCode::NacosHostFormat),
            1003 => Some(ErrorCode::BadUrl),
            2000 => Some(ErrorCode::TlsConfig),
            3000 => Some(ErrorCode::BackendFailed),
            9000 => Some(ErrorCode::IoError),
            9001 => Some(ErrorCode::SerializationError),
            9002 => Some(ErrorCode::ConfigurationError),
            _ => None,
        }
    }

    /// 获取错误代码的英文标识符
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MalformedUrl => "MALFORMED_URL",
            ErrorCode::UnsupportedScheme => "UNSUPPORTED_SCHEME",
            ErrorCode::NacosHostFormat => "NACOS_HOST_FORMAT",
            ErrorCode::BadUrl => "BAD_URL",
            ErrorCode::TlsConfig => "TLS_CONFIG",
            ErrorCode::BackendFailed => "BACKEND_FAILED",
            ErrorCode::IoError => "IO_ERROR",
            ErrorCode::SerializationError => "SERIALIZATION_ERROR",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_values_round_trip() {
        for code in [
            ErrorCode::MalformedUrl,
            ErrorCode::UnsupportedScheme,
            ErrorCode::NacosHostFormat,
            ErrorCode::BadUrl,
            ErrorCode::TlsConfig,
            ErrorCode::BackendFailed,
            ErrorCode::IoError,
            ErrorCode::SerializationError,
            ErrorCode::ConfigurationError,
        ] {
            assert_eq!(ErrorCode::from_u32(code.as_u32()), Some(code));
        }
        assert_eq!(ErrorCode::from_u32(42), None);
    }
}
