//! 解析器注册表

use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::{Resolver, ResolverBuilder};
use crate::error::{DriverError, Result};

/// 按 URI scheme 索引的解析器注册表
///
/// 注册表由调用方创建并注入注册器，不依赖进程级全局状态。
#[derive(Default)]
pub struct ResolverRegistry {
    builders: DashMap<String, Arc<dyn ResolverBuilder>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 安装解析器工厂
    ///
    /// 同一个 builder 重复安装是空操作，返回 false；不同 builder 会替换旧的（后写者生效）。
    /// scheme 统一按小写存储。
    pub fn install(&self, scheme: &str, builder: Arc<dyn ResolverBuilder>) -> bool {
        let scheme = scheme.to_lowercase();
        if let Some(existing) = self.builders.get(&scheme) {
            if Arc::ptr_eq(existing.value(), &builder) {
                debug!(scheme = %scheme, "Resolver already installed");
                return false;
            }
        }
        let replaced = self.builders.insert(scheme.clone(), builder).is_some();
        info!(scheme = %scheme, replaced, "Resolver installed");
        true
    }

    /// 获取 scheme 对应的解析器工厂（不区分大小写）
    pub fn get(&self, scheme: &str) -> Option<Arc<dyn ResolverBuilder>> {
        self.builders
            .get(&scheme.to_lowercase())
            .map(|b| b.value().clone())
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.builders.contains_key(&scheme.to_lowercase())
    }

    /// 已安装的 scheme（排序后）
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.builders.iter().map(|e| e.key().clone()).collect();
        schemes.sort();
        schemes
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    /// 为地址构建解析器
    pub fn build(&self, address: &str) -> Result<Arc<dyn Resolver>> {
        let (scheme, _) = address
            .split_once("://")
            .ok_or_else(|| DriverError::bad_url(address, "missing scheme"))?;
        let builder = self
            .get(scheme)
            .ok_or_else(|| DriverError::UnsupportedScheme(scheme.to_string()))?;
        builder.build(address)
    }

    /// 解析一次地址
    pub async fn resolve(&self, address: &str) -> Result<Vec<String>> {
        self.build(address)?.resolve().await
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}
