//! 服务注册目录
//!
//! 基于键值存储 TTL 的租约式服务注册：实例记录存在即存活，
//! 租约到期或显式注销后即下线。

pub mod catalog;
pub mod error;
pub mod models;

pub use catalog::ServiceCatalog;
pub use error::{RegistryError, Result};
pub use models::{Endpoint, EndpointKind, ServiceInstance};
