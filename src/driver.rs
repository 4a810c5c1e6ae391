//! 宿主侧驱动接口
//!
//! 事务协调器在启动时按名字查找驱动，然后调用 `register_service` 注册自身，
//! 之后用 `parse_server_method` 拆分业务地址。

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::discovery::{BackendFactory, DriverConfig};
use crate::error::Result;
use crate::registrar::Registrar;
use crate::resolver::ResolverRegistry;
use crate::server_method;

/// 驱动名称
pub const DRIVER_NAME: &str = "dtm-driver-flare";

/// 驱动接口
#[async_trait]
pub trait Driver: Send + Sync {
    /// 稳定的驱动标识
    fn name(&self) -> &str;

    /// 注册服务并安装对应 scheme 的解析器；`target` 为空时为空操作
    async fn register_service(&self, target: &str, endpoint: &str) -> Result<()>;

    /// 拆分 RPC 地址为 (server, method)
    fn parse_server_method(&self, uri: &str) -> Result<(String, String)>;
}

/// 基于服务发现后端的驱动
pub struct DiscoveryDriver {
    registrar: Registrar,
}

impl DiscoveryDriver {
    /// 使用独立的解析器注册表创建驱动
    pub fn new(config: DriverConfig) -> Self {
        Self::with_registry(config, Arc::new(ResolverRegistry::new()))
    }

    pub fn with_registry(config: DriverConfig, resolvers: Arc<ResolverRegistry>) -> Self {
        Self {
            registrar: Registrar::new(config, resolvers),
        }
    }

    pub fn with_factory(
        config: DriverConfig,
        resolvers: Arc<ResolverRegistry>,
        factory: Arc<dyn BackendFactory>,
    ) -> Self {
        Self {
            registrar: Registrar::with_factory(config, resolvers, factory),
        }
    }

    pub fn registrar(&self) -> &Registrar {
        &self.registrar
    }

    pub fn resolvers(&self) -> &Arc<ResolverRegistry> {
        self.registrar.resolvers()
    }

    /// 按配置的间隔持续解析地址，如 `discovery:///dtmservice`
    pub fn watch(&self, address: &str) -> Result<mpsc::Receiver<Vec<String>>> {
        self.registrar.watch(address)
    }

    /// 优雅关闭：注销所有已注册实例
    pub async fn shutdown(&self) -> Result<()> {
        self.registrar.deregister_all().await
    }
}

#[async_trait]
impl Driver for DiscoveryDriver {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    async fn register_service(&self, target: &str, endpoint: &str) -> Result<()> {
        self.registrar.register(target, endpoint).await.map(|_| ())
    }

    fn parse_server_method(&self, uri: &str) -> Result<(String, String)> {
        server_method::parse_server_method(uri)
    }
}

/// 按名字索引的驱动表
#[derive(Default)]
pub struct DriverRegistry {
    drivers: DashMap<String, Arc<dyn Driver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册驱动，同名驱动会被替换
    pub fn register(&self, driver: Arc<dyn Driver>) {
        let name = driver.name().to_string();
        info!(driver = %name, "Driver registered");
        self.drivers.insert(name, driver);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.drivers.get(name).map(|d| d.value().clone())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.iter().map(|d| d.key().clone()).collect();
        names.sort();
        names
    }
}
