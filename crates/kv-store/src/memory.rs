//! 内存存储
//!
//! 使用 DashMap 实现的 [`Store`]，与 Redis 后端保持相同的可观察行为：
//! glob 方言、整秒 TTL、惰性过期、分页扫描。适用于测试和单进程部署。
//!
//! 扫描按有序键索引分页，每页从上一页最后一个键之后继续，
//! 扫描期间删除其他键不会导致存活的键被跳过。

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{Stream, future, stream};
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::instrument;

use mesh_shared::observability::metrics::record_scan_page;

use crate::error::Result;
use crate::glob::Pattern;
use crate::scan::{collect_entries, collect_keys};
use crate::store::{MissingKeyPolicy, Store, ttl_seconds};

const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone)]
struct Slot {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// 内存键值存储
///
/// 克隆共享同一份数据。增删键时先持有索引写锁，再修改数据，
/// 保证索引与数据中的键集合一致。
#[derive(Debug, Clone)]
pub struct MemoryStore {
    data: Arc<DashMap<String, Slot>>,
    index: Arc<RwLock<BTreeSet<String>>>,
    page_size: usize,
    missing_keys: MissingKeyPolicy,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            index: Arc::new(RwLock::new(BTreeSet::new())),
            page_size: DEFAULT_PAGE_SIZE,
            missing_keys: MissingKeyPolicy::default(),
        }
    }

    /// 每页扫描的键数量
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_missing_keys(mut self, policy: MissingKeyPolicy) -> Self {
        self.missing_keys = policy;
        self
    }

    /// 存活的键数量
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.iter().filter(|e| e.value().is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 剩余 TTL，键不存在或未设置 TTL 时返回 None
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let slot = self.data.get(key)?;
        let at = slot.expires_at?;
        (now < at).then(|| at - now)
    }

    /// 清理所有已过期的键
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut index = self.index.write();
        let before = self.data.len();
        self.data.retain(|_, slot| slot.is_live(now));
        index.retain(|key| self.data.contains_key(key));
        before - self.data.len()
    }

    fn remove(&self, key: &str) -> Option<Slot> {
        let mut index = self.index.write();
        index.remove(key);
        self.data.remove(key).map(|(_, slot)| slot)
    }

    fn live_value(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let value = self
            .data
            .get(key)
            .and_then(|slot| slot.is_live(now).then(|| slot.value.clone()));

        if value.is_none() {
            let mut index = self.index.write();
            if self.data.remove_if(key, |_, slot| !slot.is_live(now)).is_some() {
                index.remove(key);
            }
        }
        value
    }

    /// 取出 `after` 之后的一页，返回匹配的键和下一页的起点
    ///
    /// 起点是本页检查过的最后一个键（无论是否匹配），不足一页时遍历结束。
    fn page(&self, pattern: &Pattern, after: Option<&str>) -> (Vec<String>, Option<String>) {
        let now = Instant::now();
        let index = self.index.read();
        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };

        let window: Vec<&String> = index
            .range::<str, _>((lower, Bound::Unbounded))
            .take(self.page_size)
            .collect();
        let next = (window.len() == self.page_size)
            .then(|| window.last().map(|k| k.to_string()))
            .flatten();

        let keys = window
            .into_iter()
            .filter(|k| pattern.matches(k))
            .filter(|k| self.data.get(k.as_str()).is_some_and(|s| s.is_live(now)))
            .cloned()
            .collect();

        record_scan_page("memory");
        (keys, next)
    }

    /// 惰性键页流，每次调用都从头开始
    fn pages<'a>(&'a self, pattern: &'a Pattern) -> impl Stream<Item = Result<Vec<String>>> + 'a {
        stream::unfold(Some(None::<String>), move |state| async move {
            let after = state?;
            let (keys, next) = self.page(pattern, after.as_deref());
            Some((Ok(keys), next.map(Some)))
        })
    }
}

#[async_trait]
impl Store for MemoryStore {
    #[instrument(skip(self))]
    async fn read_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let pattern = Pattern::new(pattern)?;
        collect_keys(self.pages(&pattern)).await
    }

    async fn read_entry(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.live_value(key))
    }

    #[instrument(skip(self))]
    async fn read_all_entries(&self, pattern: &str) -> Result<HashMap<String, Vec<u8>>> {
        let pattern = Pattern::new(pattern)?;
        collect_entries(
            self.pages(&pattern),
            |keys| future::ready(Ok(keys.iter().map(|k| self.live_value(k)).collect())),
            self.missing_keys,
        )
        .await
    }

    async fn insert_entry(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut index = self.index.write();
        index.insert(key.to_string());
        // SET 覆盖写会清除已有 TTL
        self.data.insert(
            key.to_string(),
            Slot {
                value: value.to_vec(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn delete_entry(&self, key: &str) -> Result<u64> {
        let now = Instant::now();
        Ok(match self.remove(key) {
            Some(slot) if slot.is_live(now) => 1,
            _ => 0,
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let seconds = ttl_seconds(ttl);

        // 与 EXPIRE 0 一致：非正 TTL 立即删除
        if seconds == 0 {
            self.remove(key);
            return Ok(());
        }

        if let Some(mut slot) = self.data.get_mut(key) {
            if slot.is_live(now) {
                slot.expires_at = Some(now + Duration::from_secs(seconds));
            }
        }
        Ok(())
    }
}
