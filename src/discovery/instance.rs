//! 服务实例定义

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::discovery::config::IdStrategy;

/// 服务实例
///
/// 每次注册都会新建一个实例交给后端，本地不再修改。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceInstance {
    /// 实例 ID（唯一标识）
    pub id: String,

    /// 服务名（目标地址的 path 部分）
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// 可访问地址列表，如 `grpc://1.2.3.4:5678`
    pub endpoints: Vec<String>,
}

impl ServiceInstance {
    pub fn new(id: impl Into<String>, name: impl Into<String>, endpoints: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: String::new(),
            metadata: HashMap::new(),
            endpoints,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 可拨号的 gRPC 地址（`host:port`）
    ///
    /// 只接受 `grpc://` endpoint；`insecure` 为 false 时还要求带 `isSecure=true`。
    pub fn grpc_addresses(&self, insecure: bool) -> Vec<String> {
        self.endpoints
            .iter()
            .filter_map(|endpoint| {
                let url = url::Url::parse(endpoint).ok()?;
                if url.scheme() != "grpc" {
                    return None;
                }
                if !insecure && !is_secure(&url) {
                    return None;
                }
                host_port(&url)
            })
            .collect()
    }

    /// 第一个能解析出 host:port 的 endpoint
    pub fn first_host_port(&self) -> Option<(String, u16)> {
        self.endpoints.iter().find_map(|e| endpoint_host_port(e))
    }
}

fn is_secure(url: &url::Url) -> bool {
    url.query_pairs()
        .any(|(k, v)| k == "isSecure" && v == "true")
}

fn host_port(url: &url::Url) -> Option<String> {
    let host = url.host_str()?;
    let port = url.port()?;
    Some(format!("{}:{}", host, port))
}

/// 从 endpoint 字符串中取出 (host, port)
pub fn endpoint_host_port(endpoint: &str) -> Option<(String, u16)> {
    let url = url::Url::parse(endpoint).ok()?;
    let host = url.host_str()?.trim_matches(|c| c == '[' || c == ']').to_string();
    let port = url.port_or_known_default()?;
    Some((host, port))
}

impl IdStrategy {
    /// 为一次注册生成实例 ID
    pub fn instance_id(&self, endpoints: &[String]) -> String {
        match self {
            IdStrategy::Generated => uuid::Uuid::new_v4().to_string(),
            IdStrategy::Endpoint => endpoints
                .iter()
                .find_map(|e| endpoint_host_port(e))
                .map(|(host, port)| format!("{}:{}", host, port))
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            IdStrategy::Fixed(id) => id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grpc_addresses_filter_scheme_and_security() {
        let instance = ServiceInstance::new(
            "1",
            "svc",
            vec![
                "grpc://10.0.0.1:9000".to_string(),
                "http://10.0.0.1:8080".to_string(),
                "grpc://10.0.0.2:9000?isSecure=true".to_string(),
                "not a url".to_string(),
            ],
        );
        assert_eq!(
            instance.grpc_addresses(true),
            vec!["10.0.0.1:9000".to_string(), "10.0.0.2:9000".to_string()]
        );
        assert_eq!(instance.grpc_addresses(false), vec!["10.0.0.2:9000".to_string()]);
    }

    #[test]
    fn endpoint_id_strategy_is_stable() {
        let endpoints = vec!["grpc://1.2.3.4:5678".to_string()];
        assert_eq!(IdStrategy::Endpoint.instance_id(&endpoints), "1.2.3.4:5678");
        assert_eq!(IdStrategy::Fixed("x".into()).instance_id(&endpoints), "x");
        let generated = IdStrategy::Generated.instance_id(&endpoints);
        assert!(uuid::Uuid::parse_str(&generated).is_ok());
    }
}
