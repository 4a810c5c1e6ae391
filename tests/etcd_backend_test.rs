//! etcd 后端集成测试
//!
//! 这些测试需要运行中的 etcd 服务器实例。
//! 默认情况下，测试会被忽略，需要使用 `cargo test --test etcd_backend_test -- --ignored` 运行。
//!
//! 启动 etcd 服务器：
//! ```bash
//! docker run -d --name etcd-test -p 2379:2379 -p 2380:2380 \
//!   quay.io/coreos/etcd:v3.5.9 \
//!   etcd --advertise-client-urls=http://127.0.0.1:2379 \
//!        --listen-client-urls=http://0.0.0.0:2379
//! ```

use flare_dtm_driver::discovery::{EtcdBackend, EtcdOptions, RegistryBackend};
use flare_dtm_driver::{DiscoveryDriver, Driver, DriverConfig, ServiceInstance};
use tokio::time::{Duration, sleep};

/// etcd 服务器地址，可以通过环境变量 ETCD_ENDPOINTS 覆盖
fn etcd_endpoints() -> Vec<String> {
    std::env::var("ETCD_ENDPOINTS")
        .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
        .unwrap_or_else(|_| vec!["http://127.0.0.1:2379".to_string()])
}

fn test_options() -> EtcdOptions {
    EtcdOptions {
        prefix: "/flare-dtm-test".to_string(),
        ..EtcdOptions::default()
    }
}

fn test_instance(id: &str, port: u16) -> ServiceInstance {
    ServiceInstance::new(id, "test-service", vec![format!("grpc://127.0.0.1:{}", port)])
        .with_version("v1.0.0")
}

/// 测试：服务注册与注销
#[tokio::test]
#[ignore]
async fn test_etcd_register_and_deregister() {
    let backend = EtcdBackend::connect(&etcd_endpoints(), None, test_options())
        .await
        .expect("Failed to connect etcd");

    let instance = test_instance("node-1", 8080);
    backend
        .register(&instance)
        .await
        .expect("Failed to register service");

    let instances = backend
        .list_instances("test-service")
        .await
        .expect("Failed to list instances");
    assert!(
        instances.iter().any(|i| i.id == "node-1"),
        "Service instance not found after registration"
    );

    backend
        .deregister(&instance)
        .await
        .expect("Failed to deregister service");

    let instances = backend
        .list_instances("test-service")
        .await
        .expect("Failed to list instances");
    assert!(
        !instances.iter().any(|i| i.id == "node-1"),
        "Service instance still exists after deregistration"
    );
}

/// 测试：租约续约，超过一个 TTL 后实例仍然存在
#[tokio::test]
#[ignore]
async fn test_etcd_lease_keep_alive() {
    let options = EtcdOptions {
        lease_ttl_secs: 3,
        ..test_options()
    };
    let backend = EtcdBackend::connect(&etcd_endpoints(), None, options)
        .await
        .expect("Failed to connect etcd");

    let instance = test_instance("node-2", 8081);
    backend.register(&instance).await.expect("Failed to register");

    sleep(Duration::from_secs(5)).await;

    let instances = backend.list_instances("test-service").await.unwrap();
    assert!(instances.iter().any(|i| i.id == "node-2"));

    backend.deregister(&instance).await.unwrap();
}

/// 测试：通过驱动注册后用 discovery scheme 解析
#[tokio::test]
#[ignore]
async fn test_driver_register_and_resolve() {
    let host = etcd_endpoints()
        .first()
        .map(|e| e.trim_start_matches("http://").to_string())
        .unwrap();
    let driver = DiscoveryDriver::new(DriverConfig::default());

    driver
        .register_service(
            &format!("etcd://{}/driver-test-service", host),
            "grpc://127.0.0.1:36790",
        )
        .await
        .expect("Failed to register through driver");

    sleep(Duration::from_millis(500)).await;

    let addresses = driver
        .resolvers()
        .resolve("discovery:///driver-test-service")
        .await
        .expect("Failed to resolve");
    assert!(addresses.contains(&"127.0.0.1:36790".to_string()));

    driver.shutdown().await.expect("Failed to shutdown driver");
}
