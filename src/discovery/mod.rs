//! 服务注册模块
//!
//! 支持 etcd、Consul、Nacos 三种后端，统一通过 [`RegistryBackend`] 访问。

pub mod backend;
pub mod config;
pub mod factory;
pub mod instance;

pub use backend::{ConsulBackend, EtcdBackend, NacosBackend, RegistryBackend};
pub use config::{
    BackendType, ConsulOptions, DriverConfig, EndpointOverride, EtcdOptions, IdStrategy,
    NacosOptions,
};
pub use factory::{BackendFactory, DefaultBackendFactory};
pub use instance::ServiceInstance;
