//! 错误类型转换实现

use super::DriverError;
use std::io;

impl From<io::Error> for DriverError {
    fn from(err: io::Error) -> Self {
        DriverError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(err: serde_json::Error) -> Self {
        DriverError::Serialization(format!("JSON 序列化错误: {}", err))
    }
}

impl From<toml::de::Error> for DriverError {
    fn from(err: toml::de::Error) -> Self {
        DriverError::Config(err.to_string())
    }
}

impl From<etcd_client::Error> for DriverError {
    fn from(err: etcd_client::Error) -> Self {
        DriverError::backend("etcd", err.to_string())
    }
}

impl From<reqwest::Error> for DriverError {
    fn from(err: reqwest::Error) -> Self {
        // Consul 和 Nacos 都走 HTTP，调用方需要区分时自行 map_err
        DriverError::backend("http", err.to_string())
    }
}
