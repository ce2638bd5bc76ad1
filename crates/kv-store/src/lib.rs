//! 键值存储层
//!
//! 控制平面持久化状态（服务注册、路由规则）的统一存储抽象：
//!
//! - [`Store`]: 六个操作的存储契约
//! - [`RedisStore`]: Redis 后端，支持三种连接获取方式
//! - [`MemoryStore`]: 进程内实现，用于测试和单进程部署

pub mod connection;
pub mod error;
pub mod glob;
pub mod memory;
pub mod redis_store;
pub mod reply;
pub mod scan;
pub mod store;

pub use connection::{ConnectionPool, ConnectionSource, Dialer, PooledConnection};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{MissingKeyPolicy, Store};

#[cfg(any(test, feature = "mock"))]
pub use store::MockStore;
