//! gRPC 名字解析
//!
//! [`ResolverRegistry`] 按 URI scheme 保存 [`ResolverBuilder`]。拨号方拿到
//! `discovery:///svc` 这样的地址后，按 scheme 找到 builder，构建 [`Resolver`]，
//! 再通过 [`Resolver::resolve`] 或 [`watch`] 获取实时地址。

pub mod cache;
pub mod channel;
pub mod discovery;
pub mod registry;

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;

pub use cache::{CacheKey, CachedDiscovery, NacosClientKey, ResolverBuilderCache};
pub use channel::balanced_channel;
pub use discovery::{DiscoveryResolver, DiscoveryResolverBuilder};
pub use registry::ResolverRegistry;

/// 地址解析器
#[async_trait]
pub trait Resolver: Send + Sync {
    /// 解析一次，返回 `host:port` 列表（已去重、有序）
    async fn resolve(&self) -> Result<Vec<String>>;
}

/// 解析器工厂，按 scheme 注册到 [`ResolverRegistry`]
pub trait ResolverBuilder: Send + Sync {
    /// 为 `scheme://[authority]/service` 形式的地址构建解析器
    fn build(&self, target: &str) -> Result<Arc<dyn Resolver>>;
}

/// watch 的最小轮询间隔
pub const MIN_WATCH_INTERVAL: Duration = Duration::from_millis(1);

/// 周期性解析，地址集合变化时发送最新结果
///
/// 第一次解析的结果总会发送。接收端被丢弃后后台任务退出。
/// 间隔小于 [`MIN_WATCH_INTERVAL`] 时按最小值处理。
pub fn watch(resolver: Arc<dyn Resolver>, interval: Duration) -> mpsc::Receiver<Vec<String>> {
    let interval = interval.max(MIN_WATCH_INTERVAL);
    let (tx, rx) = mpsc::channel(16);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        let mut last: Option<BTreeSet<String>> = None;
        loop {
            ticker.tick().await;
            if tx.is_closed() {
                break;
            }
            let addresses = match resolver.resolve().await {
                Ok(addresses) => addresses,
                Err(e) => {
                    warn!(error = %e, "Resolve failed, keeping last known addresses");
                    continue;
                }
            };
            let current: BTreeSet<String> = addresses.iter().cloned().collect();
            if last.as_ref() == Some(&current) {
                continue;
            }
            debug!(count = current.len(), "Resolved addresses changed");
            if tx.send(addresses).await.is_err() {
                break;
            }
            last = Some(current);
        }
    });

    rx
}
