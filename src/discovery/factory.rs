//! 注册后端工厂
//!
//! 根据解析后的目标地址构建对应后端。工厂以 trait 形式注入注册器，
//! 测试时可以替换为内存实现。

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::discovery::backend::{ConsulBackend, EtcdBackend, NacosBackend, RegistryBackend};
use crate::discovery::config::{BackendType, DriverConfig};
use crate::error::{DriverError, Result};
use crate::target::ParsedTarget;

/// 后端工厂
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn create_backend(
        &self,
        target: &ParsedTarget,
        config: &DriverConfig,
    ) -> Result<Arc<dyn RegistryBackend>>;
}

/// 默认工厂：连接真实的 etcd / Consul / Nacos
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

#[async_trait]
impl BackendFactory for DefaultBackendFactory {
    async fn create_backend(
        &self,
        target: &ParsedTarget,
        config: &DriverConfig,
    ) -> Result<Arc<dyn RegistryBackend>> {
        let tls = match &target.tls {
            Some(tls) => Some(tls.load().await?),
            None => None,
        };

        let backend: Arc<dyn RegistryBackend> = match target.backend {
            BackendType::Etcd => Arc::new(
                EtcdBackend::connect(&target.hosts, tls.as_ref(), config.etcd.clone()).await?,
            ),
            BackendType::Consul => {
                let host = target
                    .hosts
                    .first()
                    .ok_or_else(|| {
                        DriverError::backend("consul", "consul address not configured")
                    })?;
                if target.hosts.len() > 1 {
                    warn!(
                        hosts = ?target.hosts,
                        "Consul accepts a single agent address, using the first one"
                    );
                }
                Arc::new(ConsulBackend::new(host, tls.as_ref(), config.consul.clone())?)
            }
            BackendType::Nacos => {
                let params = target.nacos.as_ref().ok_or_else(|| {
                    DriverError::backend("nacos", "nacos parameters missing from target")
                })?;
                Arc::new(NacosBackend::new(params, tls.as_ref(), config.nacos.clone()).await?)
            }
        };

        info!(
            backend = %target.backend,
            host = %target.host,
            tls = target.tls_enabled(),
            "Registry backend created"
        );
        Ok(backend)
    }
}
