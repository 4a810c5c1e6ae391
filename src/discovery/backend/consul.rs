//! Consul 注册后端
//!
//! 通过 agent HTTP API 注册服务，使用 TTL 检查：注册后立即上报一次 pass，
//! 然后由后台任务按心跳间隔持续上报。

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::discovery::backend::RegistryBackend;
use crate::discovery::config::{BackendType, ConsulOptions};
use crate::discovery::instance::{ServiceInstance, endpoint_host_port};
use crate::error::{DriverError, Result};
use crate::target::TlsMaterial;

/// Consul 注册后端
pub struct ConsulBackend {
    http_client: HttpClient,
    consul_url: String,
    options: ConsulOptions,
    /// check_id -> 心跳任务
    heartbeats: DashMap<String, JoinHandle<()>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HealthEntry {
    service: AgentService,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AgentService {
    #[serde(rename = "ID")]
    id: String,
    service: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    port: u16,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    meta: Option<HashMap<String, String>>,
    #[serde(default)]
    tagged_addresses: Option<HashMap<String, TaggedAddress>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TaggedAddress {
    address: String,
}

fn consul_error(message: impl Into<String>) -> DriverError {
    DriverError::backend("consul", message)
}

impl ConsulBackend {
    /// 创建新的 Consul 后端
    ///
    /// `host` 不带 scheme 时，根据是否启用 TLS 补上 `http` / `https`。
    pub fn new(host: &str, tls: Option<&TlsMaterial>, options: ConsulOptions) -> Result<Self> {
        let consul_url = if host.contains("://") {
            host.trim_end_matches('/').to_string()
        } else if tls.is_some() {
            format!("https://{}", host)
        } else {
            format!("http://{}", host)
        };

        let mut builder = HttpClient::builder();
        if let Some(material) = tls {
            builder = material.apply_to_http(builder)?;
        }
        let http_client = builder
            .build()
            .map_err(|e| consul_error(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            http_client,
            consul_url,
            options,
            heartbeats: DashMap::new(),
        })
    }

    pub fn url(&self) -> &str {
        &self.consul_url
    }

    fn check_id(instance: &ServiceInstance) -> String {
        format!("service:{}", Self::service_id(instance))
    }

    /// Consul 在 ID 为空时使用服务名作为 ID
    fn service_id(instance: &ServiceInstance) -> &str {
        if instance.id.is_empty() {
            &instance.name
        } else {
            &instance.id
        }
    }

    fn registration_payload(&self, instance: &ServiceInstance) -> serde_json::Value {
        let (address, port) = instance.first_host_port().unwrap_or_default();

        let mut tagged_addresses = serde_json::Map::new();
        for endpoint in &instance.endpoints {
            let Ok(url) = url::Url::parse(endpoint) else {
                continue;
            };
            let port = url.port_or_known_default().unwrap_or_default();
            tagged_addresses.insert(
                url.scheme().to_string(),
                serde_json::json!({ "Address": endpoint, "Port": port }),
            );
        }

        let mut tags = Vec::new();
        if !instance.version.is_empty() {
            tags.push(format!("version={}", instance.version));
        }

        let ttl = self.options.check_ttl_secs;
        serde_json::json!({
            "ID": Self::service_id(instance),
            "Name": instance.name,
            "Tags": tags,
            "Meta": instance.metadata,
            "Address": address,
            "Port": port,
            "TaggedAddresses": tagged_addresses,
            "Check": {
                "CheckID": Self::check_id(instance),
                "TTL": format!("{}s", ttl),
                "DeregisterCriticalServiceAfter":
                    format!("{}s", self.options.deregister_critical_after_secs),
            }
        })
    }

    /// 上报一次 TTL 检查通过
    pub async fn pass_check(&self, check_id: &str) -> Result<()> {
        pass_check(&self.http_client, &self.consul_url, check_id).await
    }

    fn start_heartbeat(&self, check_id: String) {
        let http_client = self.http_client.clone();
        let consul_url = self.consul_url.clone();
        let interval = Duration::from_secs(self.options.heartbeat_interval_secs.max(1));
        let task_check_id = check_id.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // 第一次 tick 立即返回，注册时已经上报过
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match pass_check(&http_client, &consul_url, &task_check_id).await {
                    Ok(()) => debug!(check_id = %task_check_id, "💓 Heartbeat sent"),
                    Err(e) => warn!(
                        check_id = %task_check_id,
                        error = %e,
                        "⚠️ Failed to send heartbeat"
                    ),
                }
            }
        });

        if let Some(previous) = self.heartbeats.insert(check_id, handle) {
            previous.abort();
        }
    }
}

async fn pass_check(http_client: &HttpClient, consul_url: &str, check_id: &str) -> Result<()> {
    let url = format!("{}/v1/agent/check/pass/{}", consul_url, check_id);
    let resp = http_client
        .put(&url)
        .send()
        .await
        .map_err(|e| consul_error(format!("TTL update request failed: {}", e)))?;
    if !resp.status().is_success() {
        return Err(consul_error(format!(
            "TTL update failed with status: {}",
            resp.status()
        )));
    }
    Ok(())
}

#[async_trait]
impl RegistryBackend for ConsulBackend {
    fn kind(&self) -> BackendType {
        BackendType::Consul
    }

    async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        let url = format!("{}/v1/agent/service/register", self.consul_url);
        let payload = self.registration_payload(instance);

        let resp = self
            .http_client
            .put(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| consul_error(format!("register request failed: {}", e)))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(consul_error(format!(
                "register failed with status {}: {}",
                status, body
            )));
        }

        let check_id = Self::check_id(instance);
        self.pass_check(&check_id).await?;
        self.start_heartbeat(check_id);

        info!(
            service = %instance.name,
            instance_id = %Self::service_id(instance),
            consul = %self.consul_url,
            "✅ Service registered in consul"
        );
        Ok(())
    }

    async fn deregister(&self, instance: &ServiceInstance) -> Result<()> {
        if let Some((_, handle)) = self.heartbeats.remove(&Self::check_id(instance)) {
            handle.abort();
        }

        let url = format!(
            "{}/v1/agent/service/deregister/{}",
            self.consul_url,
            Self::service_id(instance)
        );
        let resp = self
            .http_client
            .put(&url)
            .send()
            .await
            .map_err(|e| consul_error(format!("deregister request failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(consul_error(format!(
                "deregister failed with status: {}",
                resp.status()
            )));
        }

        info!(
            service = %instance.name,
            instance_id = %Self::service_id(instance),
            "Service unregistered from consul"
        );
        Ok(())
    }

    async fn list_instances(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
        let url = format!("{}/v1/health/service/{}", self.consul_url, service_name);
        let resp = self
            .http_client
            .get(&url)
            .query(&[("passing", "true")])
            .send()
            .await
            .map_err(|e| consul_error(format!("health query failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(consul_error(format!(
                "health query failed with status: {}",
                resp.status()
            )));
        }

        let entries: Vec<HealthEntry> = resp
            .json()
            .await
            .map_err(|e| consul_error(format!("invalid health response: {}", e)))?;

        Ok(entries.into_iter().map(|e| into_instance(e.service)).collect())
    }
}

fn into_instance(service: AgentService) -> ServiceInstance {
    let mut endpoints: Vec<String> = service
        .tagged_addresses
        .unwrap_or_default()
        .into_values()
        .map(|tagged| tagged.address)
        .filter(|address| address.contains("://") && endpoint_host_port(address).is_some())
        .collect();
    endpoints.sort();
    if endpoints.is_empty() && !service.address.is_empty() {
        endpoints.push(format!("grpc://{}:{}", service.address, service.port));
    }

    let version = service
        .tags
        .unwrap_or_default()
        .iter()
        .find_map(|tag| tag.strip_prefix("version=").map(str::to_string))
        .unwrap_or_default();

    ServiceInstance {
        id: service.id,
        name: service.service,
        version,
        metadata: service.meta.unwrap_or_default(),
        endpoints,
    }
}

impl Drop for ConsulBackend {
    fn drop(&mut self) {
        for entry in self.heartbeats.iter() {
            entry.value().abort();
        }
    }
}
