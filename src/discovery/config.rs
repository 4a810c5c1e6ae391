//! 驱动配置

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DriverError, Result};

/// 后端类型：etcd, consul, nacos
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    Etcd,
    Consul,
    Nacos,
}

impl BackendType {
    /// 根据目标地址的 scheme 选择后端（区分大小写）
    ///
    /// `discovery` 与 `etcd` 是同义词。
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            DISCOVERY_SCHEME | ETCD_SCHEME => Some(BackendType::Etcd),
            CONSUL_SCHEME => Some(BackendType::Consul),
            NACOS_SCHEME => Some(BackendType::Nacos),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::Etcd => "etcd",
            BackendType::Consul => "consul",
            BackendType::Nacos => "nacos",
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "etcd" | "discovery" => Ok(BackendType::Etcd),
            "consul" => Ok(BackendType::Consul),
            "nacos" => Ok(BackendType::Nacos),
            _ => Err(format!("Unknown backend type: {}", s)),
        }
    }
}

pub const DISCOVERY_SCHEME: &str = "discovery";
pub const ETCD_SCHEME: &str = "etcd";
pub const CONSUL_SCHEME: &str = "consul";
pub const NACOS_SCHEME: &str = "nacos";

/// 驱动配置
///
/// 所有字段都有默认值，TOML 里只需要写想覆盖的部分。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DriverConfig {
    /// 实例 ID 生成策略
    pub id_strategy: IdStrategy,

    /// 通过环境变量合成本地 endpoint（例如 K8s 的 POD_IP）
    pub endpoint_override: Option<EndpointOverride>,

    /// 解析时是否接受未标记 `isSecure=true` 的 endpoint
    pub resolver_insecure: bool,

    /// resolver watch 的轮询间隔（秒）
    pub watch_interval_secs: u64,

    pub etcd: EtcdOptions,
    pub consul: ConsulOptions,
    pub nacos: NacosOptions,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            id_strategy: IdStrategy::default(),
            endpoint_override: None,
            resolver_insecure: true,
            watch_interval_secs: 10,
            etcd: EtcdOptions::default(),
            consul: ConsulOptions::default(),
            nacos: NacosOptions::default(),
        }
    }
}

impl DriverConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            DriverError::Config(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DriverConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.etcd.lease_ttl_secs < 3 {
            return Err(DriverError::Config(
                "etcd.lease_ttl_secs must be at least 3".to_string(),
            ));
        }
        if self.consul.heartbeat_interval_secs >= self.consul.check_ttl_secs {
            return Err(DriverError::Config(
                "consul.heartbeat_interval_secs must be shorter than consul.check_ttl_secs"
                    .to_string(),
            ));
        }
        if self.nacos.beat_interval_secs == 0 || self.watch_interval_secs == 0 {
            return Err(DriverError::Config("intervals must be positive".to_string()));
        }
        if let IdStrategy::Fixed(id) = &self.id_strategy {
            if id.is_empty() {
                return Err(DriverError::Config("fixed instance id is empty".to_string()));
            }
        }
        Ok(())
    }
}

/// 实例 ID 生成策略
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// 每次注册生成新的 UUID
    #[default]
    Generated,
    /// 由第一个 endpoint 的 host:port 推导，重启后 ID 不变
    Endpoint,
    /// 固定 ID
    Fixed(String),
}

/// 通过环境变量合成 endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointOverride {
    #[serde(default = "default_override_env")]
    pub env: String,
    #[serde(default = "default_override_scheme")]
    pub scheme: String,
    pub port: u16,
}

fn default_override_env() -> String {
    "POD_IP".to_string()
}

fn default_override_scheme() -> String {
    "grpc".to_string()
}

impl EndpointOverride {
    /// 用给定的查找函数读取环境变量，变量不存在或为空时返回 None
    pub fn resolve_with<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(&self.env)
            .map(|ip| ip.trim().to_string())
            .filter(|ip| !ip.is_empty())
            .map(|ip| format!("{}://{}:{}", self.scheme, ip, self.port))
    }

    pub fn resolve(&self) -> Option<String> {
        self.resolve_with(|key| std::env::var(key).ok())
    }
}

/// etcd 后端配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EtcdOptions {
    /// key 前缀，实例存放在 `{prefix}/{service}/{id}`
    pub prefix: String,
    pub lease_ttl_secs: i64,
    pub connect_timeout_ms: u64,
}

impl Default for EtcdOptions {
    fn default() -> Self {
        Self {
            prefix: "/microservices".to_string(),
            lease_ttl_secs: 15,
            connect_timeout_ms: 3000,
        }
    }
}

/// Consul 后端配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConsulOptions {
    pub check_ttl_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub deregister_critical_after_secs: u64,
}

impl Default for ConsulOptions {
    fn default() -> Self {
        // TTL 取心跳间隔的 2-3 倍，避免网络抖动误判
        Self {
            check_ttl_secs: 45,
            heartbeat_interval_secs: 20,
            deregister_critical_after_secs: 90,
        }
    }
}

/// Nacos 后端配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NacosOptions {
    pub group_name: String,
    pub cluster_name: String,
    pub beat_interval_secs: u64,
    /// 实例列表快照目录，默认 `{tmp}/nacos/naming/{namespace}`
    pub cache_dir: Option<PathBuf>,
}

impl Default for NacosOptions {
    fn default() -> Self {
        Self {
            group_name: "DEFAULT_GROUP".to_string(),
            cluster_name: "DEFAULT".to_string(),
            beat_interval_secs: 5,
            cache_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_mapping_is_case_sensitive() {
        assert_eq!(BackendType::from_scheme("discovery"), Some(BackendType::Etcd));
        assert_eq!(BackendType::from_scheme("etcd"), Some(BackendType::Etcd));
        assert_eq!(BackendType::from_scheme("consul"), Some(BackendType::Consul));
        assert_eq!(BackendType::from_scheme("nacos"), Some(BackendType::Nacos));
        assert_eq!(BackendType::from_scheme("ETCD"), None);
        assert_eq!(BackendType::from_scheme("dns"), None);
    }

    #[test]
    fn endpoint_override_uses_lookup() {
        let over = EndpointOverride {
            env: "POD_IP".to_string(),
            scheme: "grpc".to_string(),
            port: 36790,
        };
        let lookup = |key: &str| (key == "POD_IP").then(|| "10.0.0.7".to_string());
        assert_eq!(
            over.resolve_with(lookup).as_deref(),
            Some("grpc://10.0.0.7:36790")
        );
        assert_eq!(over.resolve_with(|_| Some("  ".to_string())), None);
        assert_eq!(over.resolve_with(|_| None), None);
    }
}
