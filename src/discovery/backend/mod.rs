//! 服务注册后端抽象和实现

pub mod consul;
pub mod etcd;
pub mod nacos;

use async_trait::async_trait;

use crate::discovery::config::BackendType;
use crate::discovery::instance::ServiceInstance;
use crate::error::Result;

pub use consul::ConsulBackend;
pub use etcd::EtcdBackend;
pub use nacos::NacosBackend;

/// 服务注册后端 trait
///
/// 所有后端（etcd、consul、nacos）都需要实现这个 trait。
/// 由于需要动态分发（dyn），使用 async-trait。
#[async_trait]
pub trait RegistryBackend: Send + Sync {
    /// 后端类型
    fn kind(&self) -> BackendType;

    /// 注册服务实例，并在后台保持其存活（lease / TTL / beat）
    async fn register(&self, instance: &ServiceInstance) -> Result<()>;

    /// 注销服务实例并停止后台保活
    async fn deregister(&self, instance: &ServiceInstance) -> Result<()>;

    /// 列出服务当前的健康实例
    async fn list_instances(&self, service_name: &str) -> Result<Vec<ServiceInstance>>;
}
