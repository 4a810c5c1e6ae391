//! Flare DTM Driver
//!
//! 让分布式事务协调器通过 etcd、Consul 或 Nacos 注册 gRPC 服务，并为
//! `discovery://`、`etcd://`、`consul://`、`nacos://` 地址安装名字解析器。
//!
//! ```rust,no_run
//! use flare_dtm_driver::{DiscoveryDriver, Driver, DriverConfig};
//!
//! # async fn run() -> flare_dtm_driver::Result<()> {
//! let driver = DiscoveryDriver::new(DriverConfig::default());
//! driver
//!     .register_service("etcd://127.0.0.1:2379/dtmservice", "grpc://10.0.0.7:36790")
//!     .await?;
//! let addresses = driver.resolvers().resolve("discovery:///dtmservice").await?;
//! # let _ = addresses;
//! # Ok(())
//! # }
//! ```

pub mod discovery;
pub mod driver;
pub mod error;
pub mod registrar;
pub mod resolver;
pub mod server_method;
pub mod target;
pub mod telemetry;

// Re-exports
pub use discovery::{
    BackendFactory, BackendType, DefaultBackendFactory, DriverConfig, EndpointOverride,
    IdStrategy, RegistryBackend, ServiceInstance,
};
pub use driver::{DRIVER_NAME, DiscoveryDriver, Driver, DriverRegistry};
pub use error::{DriverError, ErrorCode, Result};
pub use registrar::Registrar;
pub use resolver::{
    CacheKey, CachedDiscovery, DiscoveryResolverBuilder, NacosClientKey, Resolver,
    ResolverBuilder, ResolverBuilderCache, ResolverRegistry, balanced_channel, watch,
};
pub use server_method::parse_server_method;
pub use target::{NacosParams, ParsedTarget, TlsConfig, parse_target};
