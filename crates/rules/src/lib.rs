//! 路由与动作规则
//!
//! - [`Rule`]: 规则模型，类型为动作或路由二选一
//! - [`filter_rules`]: 按 ID、标签、目标服务、类型过滤规则
//! - [`RuleRepository`]: 基于键值存储的规则持久化

pub mod error;
pub mod filter;
pub mod models;
pub mod repository;

pub use error::{Result, RuleError};
pub use filter::filter_rules;
pub use models::{Filter, Rule, RuleKind, RuleType};
pub use repository::RuleRepository;
