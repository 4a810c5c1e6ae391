//! 把解析结果接入 tonic 负载均衡 Channel

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tonic::transport::{Channel, Endpoint};
use tonic::transport::channel::Change;
use tracing::{debug, warn};

use super::{Resolver, watch};

/// 创建一个由解析器驱动的负载均衡 Channel
///
/// 后台任务把地址集合的增删转换为 [`Change`] 推给 `Channel::balance_channel`。
/// 返回的 `JoinHandle` 可用于停止更新。
pub fn balanced_channel(
    resolver: Arc<dyn Resolver>,
    interval: Duration,
    capacity: usize,
) -> (Channel, JoinHandle<()>) {
    let (channel, tx) = Channel::balance_channel::<String>(capacity);
    let mut updates = watch(resolver, interval);

    let handle = tokio::spawn(async move {
        let mut current: HashSet<String> = HashSet::new();
        while let Some(addresses) = updates.recv().await {
            let next: HashSet<String> = addresses.into_iter().collect();

            for removed in current.difference(&next) {
                debug!(address = %removed, "Endpoint removed");
                if tx.send(Change::Remove(removed.clone())).await.is_err() {
                    return;
                }
            }
            for added in next.difference(&current) {
                let endpoint = match Endpoint::from_shared(format!("http://{}", added)) {
                    Ok(endpoint) => endpoint,
                    Err(e) => {
                        warn!(address = %added, error = %e, "Skipping invalid endpoint");
                        continue;
                    }
                };
                debug!(address = %added, "Endpoint added");
                if tx.send(Change::Insert(added.clone(), endpoint)).await.is_err() {
                    return;
                }
            }

            current = next;
        }
    });

    (channel, handle)
}
