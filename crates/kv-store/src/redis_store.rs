//! Redis 后端实现
//!
//! 连接获取方式在构造时注入（见 [`ConnectionSource`]）。每个逻辑操作
//! 只借用一次连接，扫描跨越多次往返也使用同一条连接。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::Stream;
use redis::Value;
use redis::aio::MultiplexedConnection;
use tracing::{info, instrument};

use mesh_shared::config::{ConnectionMode, StoreConfig};
use mesh_shared::observability::metrics::{record_scan_page, record_store_operation};

use crate::connection::{ConnectionPool, ConnectionSource, Dialer};
use crate::error::{Result, StoreError};
use crate::reply::{self, ScanPage};
use crate::scan::{collect_entries, collect_keys, key_pages};
use crate::store::{MissingKeyPolicy, Store, ttl_seconds};

/// Redis 键值存储
#[derive(Clone)]
pub struct RedisStore {
    source: ConnectionSource,
    scan_count: Option<u32>,
    missing_keys: MissingKeyPolicy,
}

impl RedisStore {
    /// 使用注入的连接获取方式创建
    pub fn new(source: ConnectionSource) -> Self {
        Self {
            source,
            scan_count: None,
            missing_keys: MissingKeyPolicy::default(),
        }
    }

    /// 复用调用方持有的长连接
    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self::new(ConnectionSource::Shared(conn))
    }

    /// 使用已有的连接池
    pub fn with_pool(pool: ConnectionPool) -> Self {
        Self::new(ConnectionSource::Pooled(pool))
    }

    /// 每次调用独立建连
    pub fn per_call(address: &str, password: &str) -> Result<Self> {
        Ok(Self::new(ConnectionSource::PerCall(Dialer::new(address, password)?)))
    }

    /// 按配置创建
    ///
    /// `single` 模式会立即建立一条连接，其余模式延迟到首次调用。
    pub async fn from_config(config: &StoreConfig) -> Result<Self> {
        let dialer = Dialer::new(&config.url, &config.password)?;
        let source = match config.mode {
            ConnectionMode::Single => ConnectionSource::Shared(dialer.dial().await?),
            ConnectionMode::Pool => ConnectionSource::Pooled(ConnectionPool::new(
                dialer,
                config.pool_size as usize,
                config.checkout_timeout(),
            )),
            ConnectionMode::PerCall => ConnectionSource::PerCall(dialer),
        };

        info!(mode = source.kind(), address = %config.url, "Redis store created");

        Ok(Self::new(source)
            .with_scan_count(config.scan_count)
            .with_missing_keys(config.missing_keys))
    }

    /// SCAN 的 COUNT 提示
    pub fn with_scan_count(mut self, count: Option<u32>) -> Self {
        self.scan_count = count;
        self
    }

    pub fn with_missing_keys(mut self, policy: MissingKeyPolicy) -> Self {
        self.missing_keys = policy;
        self
    }

    pub fn connection_source(&self) -> &ConnectionSource {
        &self.source
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.source.acquire().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map(|_| ())
            .map_err(StoreError::from)
    }

    /// 在一条借用连接上执行操作，记录指标，失败时通知连接池
    async fn run<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = match self.source.acquire().await {
            Ok(mut lease) => {
                // lease 在整个操作期间保持借出，闭包使用其克隆句柄
                let result = f(lease.handle()).await;
                if let Err(err) = &result {
                    lease.observe(err);
                }
                result
            }
            Err(err) => Err(err),
        };

        record_store_operation(operation, result.is_ok(), started.elapsed());
        result
    }
}

/// 在给定连接上惰性扫描匹配的键
fn scan_pages(
    conn: MultiplexedConnection,
    pattern: &str,
    count: Option<u32>,
) -> impl Stream<Item = Result<Vec<String>>> {
    let pattern = pattern.to_string();
    key_pages(move |cursor| {
        let mut conn = conn.clone();
        let pattern = pattern.clone();
        async move { fetch_scan_page(&mut conn, cursor, &pattern, count).await }
    })
}

async fn fetch_scan_page(
    conn: &mut MultiplexedConnection,
    cursor: u64,
    pattern: &str,
    count: Option<u32>,
) -> Result<Option<ScanPage>> {
    let mut cmd = redis::cmd("SCAN");
    cmd.arg(cursor).arg("MATCH").arg(pattern);
    if let Some(count) = count {
        cmd.arg("COUNT").arg(count);
    }

    let value: Value = cmd.query_async(conn).await?;
    record_scan_page("redis");
    reply::decode_scan_page(value)
}

async fn multi_get(conn: &mut MultiplexedConnection, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = redis::cmd("MGET").arg(keys).query_async(conn).await?;
    reply::decode_multi_get(value, keys.len())
}

#[async_trait]
impl Store for RedisStore {
    #[instrument(skip(self))]
    async fn read_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let count = self.scan_count;
        self.run("read_keys", |conn| collect_keys(scan_pages(conn, pattern, count)))
            .await
    }

    #[instrument(skip(self))]
    async fn read_entry(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.run("read_entry", |mut conn| async move {
            let value: Value = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
            reply::decode_optional_bytes("GET", value)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn read_all_entries(&self, pattern: &str) -> Result<HashMap<String, Vec<u8>>> {
        let count = self.scan_count;
        let policy = self.missing_keys;

        self.run("read_all_entries", |conn| {
            let pages = scan_pages(conn.clone(), pattern, count);
            collect_entries(
                pages,
                move |keys| async move {
                    let mut conn = conn;
                    multi_get(&mut conn, &keys).await
                },
                policy,
            )
        })
        .await
    }

    #[instrument(skip(self, value), fields(len = value.len()))]
    async fn insert_entry(&self, key: &str, value: &[u8]) -> Result<()> {
        self.run("insert_entry", |mut conn| async move {
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .query_async::<()>(&mut conn)
                .await
                .map_err(StoreError::from)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_entry(&self, key: &str) -> Result<u64> {
        self.run("delete_entry", |mut conn| async move {
            let value: Value = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
            let removed = reply::decode_integer("DEL", value)?;
            Ok(removed.max(0) as u64)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let seconds = ttl_seconds(ttl);
        self.run("expire", |mut conn| async move {
            // 返回 0 表示键不存在，按契约视为空操作
            let value: Value = redis::cmd("EXPIRE")
                .arg(key)
                .arg(seconds)
                .query_async(&mut conn)
                .await?;
            reply::decode_integer("EXPIRE", value).map(|_| ())
        })
        .await
    }
}
