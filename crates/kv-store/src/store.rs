//! 键值存储抽象
//!
//! 所有后端都满足同一份读、写、扫描、过期契约：
//!
//! - `read_keys` 是游标驱动的增量遍历，不是快照。扫描全程存在的键至少返回一次，
//!   扫描期间删除的键可能缺失，返回结果已去重。
//! - `read_entry` 用 `None` 表示键不存在，与后端故障区分。
//! - `read_all_entries` 分两阶段（先扫描，再批量读取），不是原子的。
//!   两阶段之间消失的键按 [`MissingKeyPolicy`] 处理，结果大小可能小于扫描到的键数。
//! - `insert_entry` 幂等覆盖写，不设置 TTL。
//! - `delete_entry` 返回删除数量（0 或 1），键不存在不是错误。
//! - `expire` 以整秒精度设置或刷新 TTL，亚秒部分截断；对不存在的键是空操作。
//!
//! 调用之间没有原子性保证，需要读-改-写一致性的调用方自行在上层实现乐观并发控制。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use mesh_shared::config::MissingKeyPolicy;

/// 键值存储接口
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait Store: Send + Sync {
    /// 按 glob 模式枚举键
    async fn read_keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// 读取单个键
    async fn read_entry(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// 按 glob 模式读取所有条目
    async fn read_all_entries(&self, pattern: &str) -> Result<HashMap<String, Vec<u8>>>;

    /// 写入或覆盖
    async fn insert_entry(&self, key: &str, value: &[u8]) -> Result<()>;

    /// 删除，返回删除的键数量
    async fn delete_entry(&self, key: &str) -> Result<u64>;

    /// 设置或刷新 TTL
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;
}

/// TTL 按整秒截断
pub(crate) fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs()
}

/// 将扫描结果与批量读取结果按位置配对
///
/// `values[i]` 对应 `keys[i]`；值为 `None` 的键说明在两阶段之间被删除或过期。
pub(crate) fn pair_entries(
    keys: Vec<String>,
    values: Vec<Option<Vec<u8>>>,
    policy: MissingKeyPolicy,
) -> Result<HashMap<String, Vec<u8>>> {
    let mut entries = HashMap::with_capacity(keys.len());
    let mut missing = Vec::new();

    for (key, value) in keys.into_iter().zip(values) {
        match value {
            Some(value) => {
                entries.insert(key, value);
            }
            None => missing.push(key),
        }
    }

    if missing.is_empty() {
        return Ok(entries);
    }

    mesh_shared::observability::metrics::record_missing_keys(missing.len());
    tracing::debug!(missing = missing.len(), "批量读取期间部分键已消失");

    match policy {
        MissingKeyPolicy::Omit => Ok(entries),
        MissingKeyPolicy::Report => Err(crate::error::StoreError::MissingKeys { entries, missing }),
    }
}

/// 保序去重
pub(crate) fn dedup_keys(keys: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::with_capacity(keys.len());
    keys.into_iter().filter(|k| seen.insert(k.clone())).collect()
}
