//! Nacos 注册后端
//!
//! 基于 Nacos v1 Open API：
//! - 注册：`POST /nacos/v1/ns/instance`（临时实例，每个 endpoint 一条）
//! - 心跳：`PUT /nacos/v1/ns/instance/beat`
//! - 注销：`DELETE /nacos/v1/ns/instance`
//! - 查询：`GET /nacos/v1/ns/instance/list`
//!
//! 查询结果会写入本地快照目录；服务端不可用时回退到最近一次快照。
//! `notLoadCacheAtStart=false` 时，构建后端时先把快照目录加载进内存。

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client as HttpClient, Method};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::discovery::backend::RegistryBackend;
use crate::discovery::config::{BackendType, NacosOptions};
use crate::discovery::instance::{ServiceInstance, endpoint_host_port};
use crate::error::{DriverError, Result};
use crate::target::{NacosParams, TlsMaterial};

const INSTANCE_PATH: &str = "/nacos/v1/ns/instance";
const BEAT_PATH: &str = "/nacos/v1/ns/instance/beat";
const LIST_PATH: &str = "/nacos/v1/ns/instance/list";

const META_ENDPOINT: &str = "endpoint";
const META_INSTANCE_ID: &str = "instanceId";
const META_VERSION: &str = "version";

fn nacos_error(message: impl Into<String>) -> DriverError {
    DriverError::backend("nacos", message)
}

/// Nacos 注册后端
pub struct NacosBackend {
    http_client: HttpClient,
    servers: Vec<String>,
    namespace_id: String,
    options: NacosOptions,
    cache_dir: PathBuf,
    /// service -> 最近一次成功查询到的实例
    snapshots: DashMap<String, Vec<ServiceInstance>>,
    /// `service#ip:port` -> 心跳任务
    beats: DashMap<String, JoinHandle<()>>,
}

#[derive(Debug, Deserialize)]
struct InstanceList {
    #[serde(default)]
    hosts: Vec<NacosHost>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NacosHost {
    #[serde(default)]
    instance_id: String,
    ip: String,
    port: u16,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// 单个 endpoint 在 Nacos 中对应的实例
struct NacosEndpoint<'a> {
    endpoint: &'a str,
    ip: String,
    port: u16,
}

impl NacosBackend {
    /// 创建新的 Nacos 后端
    pub async fn new(
        params: &NacosParams,
        tls: Option<&TlsMaterial>,
        options: NacosOptions,
    ) -> Result<Self> {
        let secure = tls.is_some();
        let servers: Vec<String> = params.servers.iter().map(|s| s.base_url(secure)).collect();
        if servers.is_empty() {
            return Err(nacos_error("nacos servers not configured"));
        }

        let mut builder =
            HttpClient::builder().timeout(Duration::from_millis(params.timeout_ms));
        if let Some(material) = tls {
            builder = material.apply_to_http(builder)?;
        }
        let http_client = builder
            .build()
            .map_err(|e| nacos_error(format!("failed to build http client: {}", e)))?;

        let cache_dir = options.cache_dir.clone().unwrap_or_else(|| {
            std::env::temp_dir()
                .join("nacos")
                .join("naming")
                .join(&params.namespace_id)
        });

        let backend = Self {
            http_client,
            servers,
            namespace_id: params.namespace_id.clone(),
            options,
            cache_dir,
            snapshots: DashMap::new(),
            beats: DashMap::new(),
        };

        if !params.not_load_cache_at_start {
            backend.load_snapshots().await;
        }
        Ok(backend)
    }

    pub fn namespace_id(&self) -> &str {
        &self.namespace_id
    }

    /// 带分组的服务名，心跳接口需要这种格式
    fn grouped_name(&self, service_name: &str) -> String {
        format!("{}@@{}", self.options.group_name, service_name)
    }

    fn snapshot_path(&self, service_name: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.json", self.grouped_name(service_name)))
    }

    async fn load_snapshots(&self) {
        let mut dir = match tokio::fs::read_dir(&self.cache_dir).await {
            Ok(dir) => dir,
            Err(e) => {
                debug!(dir = %self.cache_dir.display(), error = %e, "No nacos snapshot to load");
                return;
            }
        };

        let prefix = format!("{}@@", self.options.group_name);
        while let Ok(Some(entry)) = dir.next_entry().await {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(service_name) = file_name
                .strip_suffix(".json")
                .and_then(|name| name.strip_prefix(&prefix))
            else {
                continue;
            };
            match tokio::fs::read(entry.path()).await {
                Ok(bytes) => match serde_json::from_slice::<Vec<ServiceInstance>>(&bytes) {
                    Ok(instances) => {
                        debug!(
                            service = %service_name,
                            count = instances.len(),
                            "Loaded nacos snapshot"
                        );
                        self.snapshots.insert(service_name.to_string(), instances);
                    }
                    Err(e) => warn!(file = %file_name, error = %e, "Invalid nacos snapshot"),
                },
                Err(e) => warn!(file = %file_name, error = %e, "Failed to read nacos snapshot"),
            }
        }
    }

    async fn save_snapshot(&self, service_name: &str, instances: &[ServiceInstance]) {
        let result = async {
            tokio::fs::create_dir_all(&self.cache_dir).await?;
            let bytes = serde_json::to_vec(instances)?;
            tokio::fs::write(self.snapshot_path(service_name), bytes).await?;
            Ok::<(), DriverError>(())
        }
        .await;
        if let Err(e) = result {
            warn!(service = %service_name, error = %e, "Failed to write nacos snapshot");
        }
    }

    /// 依次尝试每个 server，返回第一个成功响应的 body
    async fn call(&self, method: Method, path: &str, params: &[(&str, String)]) -> Result<String> {
        call_servers(&self.http_client, &self.servers, method, path, params).await
    }

    fn endpoints<'a>(&self, instance: &'a ServiceInstance) -> Vec<NacosEndpoint<'a>> {
        instance
            .endpoints
            .iter()
            .filter_map(|endpoint| {
                let (ip, port) = endpoint_host_port(endpoint)?;
                Some(NacosEndpoint { endpoint, ip, port })
            })
            .collect()
    }

    fn metadata(&self, instance: &ServiceInstance, endpoint: &str) -> HashMap<String, String> {
        let mut metadata = instance.metadata.clone();
        metadata.insert(META_ENDPOINT.to_string(), endpoint.to_string());
        metadata.insert(META_INSTANCE_ID.to_string(), instance.id.clone());
        if !instance.version.is_empty() {
            metadata.insert(META_VERSION.to_string(), instance.version.clone());
        }
        metadata
    }

    fn start_beat(&self, instance: &ServiceInstance, target: &NacosEndpoint<'_>) {
        let beat = serde_json::json!({
            "serviceName": self.grouped_name(&instance.name),
            "ip": target.ip,
            "port": target.port,
            "cluster": self.options.cluster_name,
            "weight": 1.0,
            "metadata": self.metadata(instance, target.endpoint),
        });
        let params = vec![
            ("serviceName", self.grouped_name(&instance.name)),
            ("groupName", self.options.group_name.clone()),
            ("namespaceId", self.namespace_id.clone()),
            ("beat", beat.to_string()),
        ];

        let http_client = self.http_client.clone();
        let servers = self.servers.clone();
        let interval = Duration::from_secs(self.options.beat_interval_secs.max(1));
        let key = format!("{}#{}:{}", instance.name, target.ip, target.port);
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match call_servers(&http_client, &servers, Method::PUT, BEAT_PATH, &params).await {
                    Ok(_) => debug!(instance = %task_key, "💓 Nacos beat sent"),
                    Err(e) => {
                        warn!(instance = %task_key, error = %e, "⚠️ Failed to send nacos beat")
                    }
                }
            }
        });

        if let Some(previous) = self.beats.insert(key, handle) {
            previous.abort();
        }
    }

    /// 撤回已注册的 endpoint，失败只记录日志
    async fn rollback(&self, service_name: &str, registered: &[NacosEndpoint<'_>]) {
        for target in registered {
            let params = self.instance_params(service_name, target);
            match self.call(Method::DELETE, INSTANCE_PATH, &params).await {
                Ok(_) => debug!(
                    service = %service_name,
                    ip = %target.ip,
                    port = target.port,
                    "Rolled back nacos instance"
                ),
                Err(e) => warn!(
                    service = %service_name,
                    ip = %target.ip,
                    port = target.port,
                    error = %e,
                    "⚠️ Failed to roll back nacos instance"
                ),
            }
        }
    }

    fn instance_params(
        &self,
        service_name: &str,
        target: &NacosEndpoint<'_>,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("serviceName", service_name.to_string()),
            ("groupName", self.options.group_name.clone()),
            ("clusterName", self.options.cluster_name.clone()),
            ("namespaceId", self.namespace_id.clone()),
            ("ip", target.ip.clone()),
            ("port", target.port.to_string()),
            ("ephemeral", "true".to_string()),
        ]
    }
}

async fn call_servers(
    http_client: &HttpClient,
    servers: &[String],
    method: Method,
    path: &str,
    params: &[(&str, String)],
) -> Result<String> {
    let mut last_error = nacos_error("no nacos server available");
    for server in servers {
        let url = format!("{}{}", server, path);
        let resp = match http_client
            .request(method.clone(), &url)
            .query(params)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                debug!(server = %server, error = %e, "Nacos server request failed, trying next");
                last_error = nacos_error(format!("request to {} failed: {}", server, e));
                continue;
            }
        };

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if status.is_success() {
            return Ok(body);
        }
        // 4xx 是请求本身的问题，换 server 也不会成功
        if status.is_client_error() {
            return Err(nacos_error(format!("{} returned {}: {}", url, status, body)));
        }
        last_error = nacos_error(format!("{} returned {}: {}", url, status, body));
    }
    Err(last_error)
}

#[async_trait]
impl RegistryBackend for NacosBackend {
    fn kind(&self) -> BackendType {
        BackendType::Nacos
    }

    async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        let targets = self.endpoints(instance);
        if targets.is_empty() {
            return Err(nacos_error(format!(
                "instance {} has no endpoint with host:port",
                instance.name
            )));
        }

        // 全部 endpoint 注册成功后才启动心跳；中途失败则撤回已注册的部分
        for (idx, target) in targets.iter().enumerate() {
            let mut params = self.instance_params(&instance.name, target);
            params.push(("weight", "1.0".to_string()));
            params.push(("enabled", "true".to_string()));
            params.push(("healthy", "true".to_string()));
            params.push((
                "metadata",
                serde_json::to_string(&self.metadata(instance, target.endpoint))?,
            ));

            if let Err(e) = self.call(Method::POST, INSTANCE_PATH, &params).await {
                self.rollback(&instance.name, &targets[..idx]).await;
                return Err(e);
            }
        }
        for target in &targets {
            self.start_beat(instance, target);
        }

        info!(
            service = %instance.name,
            instance_id = %instance.id,
            namespace = %self.namespace_id,
            endpoints = targets.len(),
            "✅ Service registered in nacos"
        );
        Ok(())
    }

    async fn deregister(&self, instance: &ServiceInstance) -> Result<()> {
        for target in self.endpoints(instance) {
            let key = format!("{}#{}:{}", instance.name, target.ip, target.port);
            if let Some((_, handle)) = self.beats.remove(&key) {
                handle.abort();
            }
            let params = self.instance_params(&instance.name, &target);
            self.call(Method::DELETE, INSTANCE_PATH, &params).await?;
        }

        info!(
            service = %instance.name,
            instance_id = %instance.id,
            "Service unregistered from nacos"
        );
        Ok(())
    }

    async fn list_instances(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
        let params = vec![
            ("serviceName", service_name.to_string()),
            ("groupName", self.options.group_name.clone()),
            ("namespaceId", self.namespace_id.clone()),
            ("healthyOnly", "true".to_string()),
        ];

        let body = match self.call(Method::GET, LIST_PATH, &params).await {
            Ok(body) => body,
            Err(e) => {
                if let Some(snapshot) = self.snapshots.get(service_name) {
                    warn!(
                        service = %service_name,
                        error = %e,
                        "Nacos unavailable, serving instances from snapshot"
                    );
                    return Ok(snapshot.value().clone());
                }
                return Err(e);
            }
        };

        let list: InstanceList = serde_json::from_str(&body)
            .map_err(|e| nacos_error(format!("invalid instance list: {}", e)))?;
        let instances = group_hosts(service_name, list.hosts);

        self.snapshots
            .insert(service_name.to_string(), instances.clone());
        self.save_snapshot(service_name, &instances).await;
        Ok(instances)
    }
}

/// 同一个实例的多个 endpoint 在 Nacos 中是多条记录，按 instanceId 元数据归并
fn group_hosts(service_name: &str, hosts: Vec<NacosHost>) -> Vec<ServiceInstance> {
    let mut grouped: BTreeMap<String, ServiceInstance> = BTreeMap::new();
    for mut host in hosts {
        let endpoint = host
            .metadata
            .remove(META_ENDPOINT)
            .unwrap_or_else(|| format!("grpc://{}:{}", host.ip, host.port));
        let id = host
            .metadata
            .remove(META_INSTANCE_ID)
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| host.instance_id.clone());
        let version = host.metadata.remove(META_VERSION).unwrap_or_default();

        let instance = grouped.entry(id.clone()).or_insert_with(|| ServiceInstance {
            id,
            name: service_name.to_string(),
            version,
            metadata: host.metadata,
            endpoints: Vec::new(),
        });
        instance.endpoints.push(endpoint);
    }
    grouped.into_values().collect()
}

impl Drop for NacosBackend {
    fn drop(&mut self) {
        for entry in self.beats.iter() {
            entry.value().abort();
        }
    }
}
