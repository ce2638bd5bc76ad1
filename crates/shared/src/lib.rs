//! 共享库
//!
//! 包含各 crate 共用的配置加载、配置校验、可观测性和重试等基础设施代码。

pub mod config;
pub mod observability;
pub mod retry;
pub mod validation;
