//! 服务注册器
//!
//! 解析目标地址，选择后端，注册本地实例，成功后再把解析器工厂安装进注入的
//! [`ResolverRegistry`]。注册失败时不会安装任何解析器。

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tonic::transport::Channel;
use tracing::{debug, error, info, warn};

use crate::discovery::config::{DISCOVERY_SCHEME, ETCD_SCHEME};
use crate::discovery::{
    BackendFactory, DefaultBackendFactory, DriverConfig, RegistryBackend, ServiceInstance,
};
use crate::error::Result;
use crate::resolver::{
    self, CacheKey, CachedDiscovery, DiscoveryResolverBuilder, ResolverBuilder,
    ResolverBuilderCache, ResolverRegistry,
};
use crate::target::{ParsedTarget, parse_target};

/// 服务注册器
pub struct Registrar {
    config: DriverConfig,
    factory: Arc<dyn BackendFactory>,
    cache: ResolverBuilderCache,
    resolvers: Arc<ResolverRegistry>,
    /// 已注册实例：instance_id -> (后端, 实例)，用于优雅关闭
    registered: DashMap<String, (Arc<dyn RegistryBackend>, ServiceInstance)>,
}

impl Registrar {
    pub fn new(config: DriverConfig, resolvers: Arc<ResolverRegistry>) -> Self {
        Self::with_factory(config, resolvers, Arc::new(DefaultBackendFactory))
    }

    pub fn with_factory(
        config: DriverConfig,
        resolvers: Arc<ResolverRegistry>,
        factory: Arc<dyn BackendFactory>,
    ) -> Self {
        Self {
            config,
            factory,
            cache: ResolverBuilderCache::new(),
            resolvers,
            registered: DashMap::new(),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn resolvers(&self) -> &Arc<ResolverRegistry> {
        &self.resolvers
    }

    pub fn cache(&self) -> &ResolverBuilderCache {
        &self.cache
    }

    /// 注册服务
    ///
    /// `target` 为空时什么都不做，返回 `Ok(None)`。
    pub async fn register(
        &self,
        target: &str,
        endpoint: &str,
    ) -> Result<Option<ServiceInstance>> {
        if target.is_empty() {
            debug!("Empty discovery target, skipping registration");
            return Ok(None);
        }

        let parsed = parse_target(target)?;
        let discovery = self.discovery_for(&parsed).await?;
        let instance = self.build_instance(&parsed, endpoint);

        if let Err(e) = discovery.backend.register(&instance).await {
            error!(
                backend = %parsed.backend,
                service = %instance.name,
                error = %e,
                "❌ Failed to register service"
            );
            return Err(e);
        }

        let builder: Arc<dyn ResolverBuilder> = discovery.builder.clone();
        for scheme in install_schemes(&parsed.scheme) {
            self.resolvers.install(scheme, builder.clone());
        }

        self.registered.insert(
            instance.id.clone(),
            (discovery.backend.clone(), instance.clone()),
        );

        info!(
            backend = %parsed.backend,
            service = %instance.name,
            instance_id = %instance.id,
            endpoints = ?instance.endpoints,
            "✅ Service registered"
        );
        Ok(Some(instance))
    }

    /// 取得（或构建并缓存）目标地址对应的后端与解析器工厂
    pub async fn discovery_for(&self, target: &ParsedTarget) -> Result<CachedDiscovery> {
        let key = CacheKey::from_target(target);
        let insecure = self.config.resolver_insecure;
        self.cache
            .get_or_try_insert_with(key, || async {
                let backend = self.factory.create_backend(target, &self.config).await?;
                let builder = Arc::new(DiscoveryResolverBuilder::new(backend.clone(), insecure));
                Ok(CachedDiscovery { backend, builder })
            })
            .await
    }

    /// endpoint 列表：配置了环境变量覆盖且变量存在时使用合成地址
    pub fn endpoints(&self, endpoint: &str) -> Vec<String> {
        if let Some(over) = &self.config.endpoint_override {
            if let Some(synthesized) = over.resolve() {
                debug!(endpoint = %synthesized, env = %over.env, "Using endpoint from environment");
                return vec![synthesized];
            }
        }
        endpoint.split(',').map(str::to_string).collect()
    }

    fn build_instance(&self, target: &ParsedTarget, endpoint: &str) -> ServiceInstance {
        let endpoints = self.endpoints(endpoint);
        let id = self.config.id_strategy.instance_id(&endpoints);
        ServiceInstance::new(id, target.service_name.clone(), endpoints)
    }

    /// 配置的 watch 轮询间隔，至少 1 秒
    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.config.watch_interval_secs.max(1))
    }

    /// 按配置的间隔持续解析地址
    pub fn watch(&self, address: &str) -> Result<mpsc::Receiver<Vec<String>>> {
        let resolver = self.resolvers.build(address)?;
        Ok(resolver::watch(resolver, self.watch_interval()))
    }

    /// 按配置的间隔刷新的负载均衡 Channel
    pub fn balanced_channel(
        &self,
        address: &str,
        capacity: usize,
    ) -> Result<(Channel, JoinHandle<()>)> {
        let resolver = self.resolvers.build(address)?;
        Ok(resolver::balanced_channel(
            resolver,
            self.watch_interval(),
            capacity,
        ))
    }

    /// 已注册的实例
    pub fn registered(&self) -> Vec<ServiceInstance> {
        self.registered.iter().map(|e| e.value().1.clone()).collect()
    }

    /// 注销所有已注册实例
    ///
    /// 逐个注销，遇到失败记录日志后继续，最后返回第一个错误。
    pub async fn deregister_all(&self) -> Result<()> {
        let entries: Vec<(String, Arc<dyn RegistryBackend>, ServiceInstance)> = self
            .registered
            .iter()
            .map(|e| (e.key().clone(), e.value().0.clone(), e.value().1.clone()))
            .collect();

        let mut first_error = None;
        for (id, backend, instance) in entries {
            match backend.deregister(&instance).await {
                Ok(()) => {
                    self.registered.remove(&id);
                }
                Err(e) => {
                    warn!(instance_id = %id, error = %e, "⚠️ Failed to unregister service");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// 需要安装解析器的 scheme
///
/// 总是包含目标自身的 scheme 和 `discovery`；`discovery` 目标同时安装到 `etcd`。
pub fn install_schemes(scheme: &str) -> Vec<&str> {
    let mut schemes = vec![scheme];
    if scheme == DISCOVERY_SCHEME {
        schemes.push(ETCD_SCHEME);
    } else {
        schemes.push(DISCOVERY_SCHEME);
    }
    schemes
}
