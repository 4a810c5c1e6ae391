//! etcd 注册后端
//!
//! 实例以 JSON 存放在 `{prefix}/{service}/{id}`，绑定一个 lease，
//! 后台任务按 TTL 的 1/3 续期。

use async_trait::async_trait;
use dashmap::DashMap;
use etcd_client::{Client, ConnectOptions, GetOptions, PutOptions};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::discovery::backend::RegistryBackend;
use crate::discovery::config::{BackendType, EtcdOptions};
use crate::discovery::instance::ServiceInstance;
use crate::error::{DriverError, Result};
use crate::target::TlsMaterial;

/// etcd 注册后端
pub struct EtcdBackend {
    client: Client,
    options: EtcdOptions,
    /// key -> 续期任务
    keep_alives: DashMap<String, JoinHandle<()>>,
}

impl EtcdBackend {
    /// 连接 etcd 集群
    pub async fn connect(
        endpoints: &[String],
        tls: Option<&TlsMaterial>,
        options: EtcdOptions,
    ) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(DriverError::backend("etcd", "etcd endpoints not configured"));
        }

        let mut connect_options = ConnectOptions::new()
            .with_connect_timeout(Duration::from_millis(options.connect_timeout_ms));
        if let Some(material) = tls {
            connect_options = connect_options.with_tls(material.etcd_options());
        }

        let client = Client::connect(endpoints, Some(connect_options))
            .await
            .map_err(|e| {
                DriverError::backend("etcd", format!("Failed to connect to etcd: {}", e))
            })?;

        debug!(endpoints = ?endpoints, "etcd client connected");

        Ok(Self {
            client,
            options,
            keep_alives: DashMap::new(),
        })
    }

    fn service_prefix(&self, service_name: &str) -> String {
        format!("{}/{}/", self.options.prefix.trim_end_matches('/'), service_name)
    }

    fn instance_key(&self, instance: &ServiceInstance) -> String {
        format!("{}{}", self.service_prefix(&instance.name), instance.id)
    }

    fn start_keep_alive(&self, key: String, lease_id: i64) {
        let mut client = self.client.clone();
        let ttl = self.options.lease_ttl_secs.max(3) as u64;
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let (mut keeper, mut stream) = match client.lease_keep_alive(lease_id).await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(key = %task_key, error = %e, "Lease keep-alive failed");
                    return;
                }
            };

            loop {
                tokio::time::sleep(Duration::from_secs(ttl / 3)).await;

                if let Err(e) = keeper.keep_alive().await {
                    error!(key = %task_key, error = %e, "Lease keep-alive request failed");
                    break;
                }
                match stream.next().await {
                    Some(Ok(resp)) if resp.ttl() > 0 => {
                        debug!(key = %task_key, lease_id, ttl = resp.ttl(), "💓 Lease renewed");
                    }
                    Some(Ok(_)) => {
                        warn!(key = %task_key, lease_id, "⚠️ Lease expired, keep-alive stopped");
                        break;
                    }
                    Some(Err(e)) => {
                        error!(key = %task_key, error = %e, "Lease keep-alive stream error");
                        break;
                    }
                    None => break,
                }
            }
        });

        if let Some(previous) = self.keep_alives.insert(key, handle) {
            previous.abort();
        }
    }
}

#[async_trait]
impl RegistryBackend for EtcdBackend {
    fn kind(&self) -> BackendType {
        BackendType::Etcd
    }

    async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        let mut client = self.client.clone();

        let lease = client
            .lease_grant(self.options.lease_ttl_secs, None)
            .await
            .map_err(|e| DriverError::backend("etcd", format!("Failed to grant lease: {}", e)))?;
        let lease_id = lease.id();

        let key = self.instance_key(instance);
        let value = serde_json::to_string(instance)?;

        client
            .put(key.clone(), value, Some(PutOptions::new().with_lease(lease_id)))
            .await
            .map_err(|e| {
                DriverError::backend("etcd", format!("Failed to register service: {}", e))
            })?;

        info!(
            service = %instance.name,
            instance_id = %instance.id,
            lease_id,
            "✅ Service registered in etcd"
        );

        self.start_keep_alive(key, lease_id);
        Ok(())
    }

    async fn deregister(&self, instance: &ServiceInstance) -> Result<()> {
        let key = self.instance_key(instance);
        if let Some((_, handle)) = self.keep_alives.remove(&key) {
            handle.abort();
        }

        let mut client = self.client.clone();
        client.delete(key, None).await?;

        info!(
            service = %instance.name,
            instance_id = %instance.id,
            "Service unregistered from etcd"
        );
        Ok(())
    }

    async fn list_instances(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
        let mut client = self.client.clone();
        let resp = client
            .get(
                self.service_prefix(service_name),
                Some(GetOptions::new().with_prefix()),
            )
            .await?;

        let mut instances = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            match serde_json::from_slice::<ServiceInstance>(kv.value()) {
                Ok(instance) => instances.push(instance),
                Err(e) => {
                    warn!(
                        key = %String::from_utf8_lossy(kv.key()),
                        error = %e,
                        "Skipping undecodable instance"
                    );
                }
            }
        }
        Ok(instances)
    }
}

impl Drop for EtcdBackend {
    fn drop(&mut self) {
        for entry in self.keep_alives.iter() {
            entry.value().abort();
        }
    }
}
