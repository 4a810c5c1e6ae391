//! 基于注册后端的解析器

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{Resolver, ResolverBuilder};
use crate::discovery::RegistryBackend;
use crate::error::{DriverError, Result};

/// 基于注册后端的解析器工厂
///
/// 同一个 builder 可以同时安装在多个 scheme 下（例如 `etcd` 与 `discovery`）。
pub struct DiscoveryResolverBuilder {
    backend: Arc<dyn RegistryBackend>,
    insecure: bool,
}

impl DiscoveryResolverBuilder {
    pub fn new(backend: Arc<dyn RegistryBackend>, insecure: bool) -> Self {
        Self { backend, insecure }
    }

    pub fn backend(&self) -> &Arc<dyn RegistryBackend> {
        &self.backend
    }

    pub fn insecure(&self) -> bool {
        self.insecure
    }
}

impl std::fmt::Debug for DiscoveryResolverBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryResolverBuilder")
            .field("backend", &self.backend.kind())
            .field("insecure", &self.insecure)
            .finish()
    }
}

/// 从 `scheme://[authority]/service` 中取服务名；path 为空时使用 authority
pub fn service_name_of(target: &str) -> Result<String> {
    let (_, rest) = target
        .split_once("://")
        .ok_or_else(|| DriverError::bad_url(target, "missing scheme"))?;
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    let (authority, path) = match rest.find('/') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };

    let name = path.trim_start_matches('/');
    let name = if name.is_empty() { authority } else { name };
    if name.is_empty() {
        return Err(DriverError::bad_url(target, "no service name found"));
    }
    Ok(name.to_string())
}

impl ResolverBuilder for DiscoveryResolverBuilder {
    fn build(&self, target: &str) -> Result<Arc<dyn Resolver>> {
        Ok(Arc::new(DiscoveryResolver {
            backend: self.backend.clone(),
            service_name: service_name_of(target)?,
            insecure: self.insecure,
        }))
    }
}

/// 单个服务的解析器
pub struct DiscoveryResolver {
    backend: Arc<dyn RegistryBackend>,
    service_name: String,
    insecure: bool,
}

impl DiscoveryResolver {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

#[async_trait]
impl Resolver for DiscoveryResolver {
    async fn resolve(&self) -> Result<Vec<String>> {
        let instances = self.backend.list_instances(&self.service_name).await?;
        let addresses: BTreeSet<String> = instances
            .iter()
            .flat_map(|instance| instance.grpc_addresses(self.insecure))
            .collect();
        Ok(addresses.into_iter().collect())
    }
}
