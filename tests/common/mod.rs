//! 测试公共设施：内存后端与计数工厂

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use flare_dtm_driver::discovery::{BackendFactory, BackendType, DriverConfig, RegistryBackend};
use flare_dtm_driver::target::ParsedTarget;
use flare_dtm_driver::{DriverError, Result, ServiceInstance};

/// 内存注册后端
pub struct MemoryBackend {
    kind: BackendType,
    instances: Mutex<HashMap<String, ServiceInstance>>,
    fail_register: AtomicBool,
}

impl MemoryBackend {
    pub fn new(kind: BackendType) -> Self {
        Self {
            kind,
            instances: Mutex::new(HashMap::new()),
            fail_register: AtomicBool::new(false),
        }
    }

    pub fn failing(kind: BackendType) -> Self {
        let backend = Self::new(kind);
        backend.fail_register.store(true, Ordering::SeqCst);
        backend
    }

    pub async fn instances(&self) -> Vec<ServiceInstance> {
        self.instances.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl RegistryBackend for MemoryBackend {
    fn kind(&self) -> BackendType {
        self.kind
    }

    async fn register(&self, instance: &ServiceInstance) -> Result<()> {
        if self.fail_register.load(Ordering::SeqCst) {
            return Err(DriverError::backend("memory", "registration refused"));
        }
        self.instances
            .lock()
            .await
            .insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    async fn deregister(&self, instance: &ServiceInstance) -> Result<()> {
        self.instances.lock().await.remove(&instance.id);
        Ok(())
    }

    async fn list_instances(&self, service_name: &str) -> Result<Vec<ServiceInstance>> {
        Ok(self
            .instances
            .lock()
            .await
            .values()
            .filter(|i| i.name == service_name)
            .cloned()
            .collect())
    }
}

/// 计数工厂：每次调用都新建一个内存后端，并记录调用次数
pub struct CountingFactory {
    pub calls: AtomicUsize,
    fail_register: bool,
    build_delay: Duration,
}

impl CountingFactory {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_register: false,
            build_delay: Duration::ZERO,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_register: true,
            ..Self::new()
        }
    }

    /// 构建时等待一段时间，放大并发未命中的窗口
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            build_delay: delay,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackendFactory for CountingFactory {
    async fn create_backend(
        &self,
        target: &ParsedTarget,
        _config: &DriverConfig,
    ) -> Result<Arc<dyn RegistryBackend>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.build_delay.is_zero() {
            tokio::time::sleep(self.build_delay).await;
        }
        let backend = if self.fail_register {
            MemoryBackend::failing(target.backend)
        } else {
            MemoryBackend::new(target.backend)
        };
        Ok(Arc::new(backend))
    }
}

/// 在临时目录下写一个文件，返回路径
pub fn temp_file(name: &str, content: &str) -> String {
    let dir = std::env::temp_dir().join(format!("flare-dtm-driver-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path.to_string_lossy().to_string()
}

pub const FAKE_CA: &str = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

/// 在临时目录下创建一个干净的子目录
pub fn temp_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir()
        .join(format!("flare-dtm-driver-{}", std::process::id()))
        .join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// 一个已释放的本地端口，连接会被拒绝
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// 极简 HTTP 服务：记录请求行（`METHOD /path?query`），由闭包决定响应
pub struct FakeHttpServer {
    pub port: u16,
    requests: Arc<std::sync::Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl FakeHttpServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(std::sync::Mutex::new(Vec::new()));
        let handler = Arc::new(handler);

        let log = requests.clone();
        let handle = tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let handler = handler.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let mut head: Vec<u8> = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => head.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&head).to_string();
                    let line = head.lines().next().unwrap_or_default();
                    let request = line
                        .rsplit_once(' ')
                        .map(|(request, _)| request)
                        .unwrap_or(line)
                        .to_string();
                    log.lock().unwrap().push(request.clone());

                    let (status, body) = handler(&request);
                    let response = format!(
                        "HTTP/1.1 {} FAKE\r\ncontent-type: application/json\r\n\
                         content-length: {}\r\nconnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self {
            port,
            requests,
            handle,
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// 停止监听，之后的连接会被拒绝
    pub async fn stop(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }
}
