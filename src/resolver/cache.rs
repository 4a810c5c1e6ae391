//! 解析器工厂缓存
//!
//! 构建后端客户端远比一次 map 查找昂贵，同一个后端地址只保留一份客户端。
//! 查找和插入都不会在构建客户端期间持有锁：并发未命中时双方都可能构建，
//! 先写入者生效，后到者的客户端直接丢弃。

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use super::DiscoveryResolverBuilder;
use crate::discovery::{BackendType, RegistryBackend};
use crate::error::Result;
use crate::target::{ParsedTarget, TlsConfig};

/// 缓存键：后端类型 + 目标地址的 host 串 + 决定客户端形态的参数
///
/// host 相同但 TLS 配置或 Nacos 命名空间不同的目标必须使用不同的客户端。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub backend: BackendType,
    pub host: String,
    pub tls: Option<TlsConfig>,
    pub nacos: Option<NacosClientKey>,
}

/// Nacos 客户端参数（不含 server 列表，server 列表已在 host 中）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NacosClientKey {
    pub namespace_id: String,
    pub timeout_ms: u64,
    pub not_load_cache_at_start: bool,
}

impl CacheKey {
    /// 不带 TLS 和 Nacos 参数的键
    pub fn new(backend: BackendType, host: impl Into<String>) -> Self {
        Self {
            backend,
            host: host.into(),
            tls: None,
            nacos: None,
        }
    }

    pub fn from_target(target: &ParsedTarget) -> Self {
        Self {
            backend: target.backend,
            host: target.host.clone(),
            tls: target.tls.clone(),
            nacos: target.nacos.as_ref().map(|params| NacosClientKey {
                namespace_id: params.namespace_id.clone(),
                timeout_ms: params.timeout_ms,
                not_load_cache_at_start: params.not_load_cache_at_start,
            }),
        }
    }
}

/// 缓存的后端及其解析器工厂
#[derive(Clone)]
pub struct CachedDiscovery {
    pub backend: Arc<dyn RegistryBackend>,
    pub builder: Arc<DiscoveryResolverBuilder>,
}

impl std::fmt::Debug for CachedDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedDiscovery")
            .field("backend", &self.backend.kind())
            .field("builder", &self.builder)
            .finish()
    }
}

/// 解析器工厂缓存，条目懒创建、永不淘汰
#[derive(Debug, Default)]
pub struct ResolverBuilderCache {
    entries: DashMap<CacheKey, CachedDiscovery>,
}

impl ResolverBuilderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<CachedDiscovery> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// 命中直接返回；未命中时构建并尝试写入，返回最终留在缓存中的那一份
    pub async fn get_or_try_insert_with<F, Fut>(
        &self,
        key: CacheKey,
        make: F,
    ) -> Result<CachedDiscovery>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CachedDiscovery>>,
    {
        if let Some(hit) = self.get(&key) {
            debug!(backend = %key.backend, host = %key.host, "Resolver builder cache hit");
            return Ok(hit);
        }

        let built = make().await?;

        match self.entries.entry(key) {
            Entry::Occupied(occupied) => {
                debug!(
                    backend = %occupied.key().backend,
                    host = %occupied.key().host,
                    "Concurrent build lost the race, discarding duplicate client"
                );
                Ok(occupied.get().clone())
            }
            Entry::Vacant(vacant) => {
                vacant.insert(built.clone());
                Ok(built)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
