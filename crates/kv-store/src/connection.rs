//! 后端连接获取
//!
//! 三种互斥的获取方式，在构造时选定：
//!
//! 1. [`ConnectionSource::Shared`]：调用方持有的单条长连接，所有调用复用；
//! 2. [`ConnectionSource::Pooled`]：连接池，每次逻辑操作借出一条，结束后立即归还；
//! 3. [`ConnectionSource::PerCall`]：每次调用独立建连并认证，用完关闭。

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use redis::aio::MultiplexedConnection;
use redis::Client;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::error::{Result, StoreError};

/// 建连器：负责拨号与认证
#[derive(Clone)]
pub struct Dialer {
    client: Client,
    address: String,
    password: Option<String>,
}

impl Dialer {
    /// `address` 可以是 `host:port` 或完整的 `redis://` URL；
    /// `password` 为空时不发送 AUTH。
    pub fn new(address: &str, password: &str) -> Result<Self> {
        let url = if address.contains("://") {
            address.to_string()
        } else {
            format!("redis://{}", address)
        };

        let client = Client::open(url.as_str()).map_err(|source| StoreError::Connect {
            address: address.to_string(),
            source,
        })?;

        Ok(Self {
            client,
            address: address.to_string(),
            password: (!password.is_empty()).then(|| password.to_string()),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// 建立一条新连接并完成认证
    pub async fn dial(&self) -> Result<MultiplexedConnection> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|source| StoreError::Connect {
                address: self.address.clone(),
                source,
            })?;

        if let Some(password) = &self.password {
            redis::cmd("AUTH")
                .arg(password)
                .query_async::<()>(&mut conn)
                .await
                .map_err(StoreError::Auth)?;
        }

        debug!(address = %self.address, "connection established");
        Ok(conn)
    }
}

// ---------------------------------------------------------------------------
// ConnectionPool: 有界连接池
// ---------------------------------------------------------------------------

struct PoolInner {
    dialer: Dialer,
    idle: Mutex<Vec<MultiplexedConnection>>,
    permits: Arc<Semaphore>,
    max_size: usize,
    checkout_timeout: Duration,
}

/// 有界连接池
///
/// 同时借出的连接数不超过 `max_size`，耗尽后借用方排队等待，
/// 超过 `checkout_timeout` 返回 [`StoreError::PoolTimeout`]。
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(dialer: Dialer, max_size: usize, checkout_timeout: Duration) -> Self {
        let max_size = max_size.max(1);
        Self {
            inner: Arc::new(PoolInner {
                dialer,
                idle: Mutex::new(Vec::with_capacity(max_size)),
                permits: Arc::new(Semaphore::new(max_size)),
                max_size,
                checkout_timeout,
            }),
        }
    }

    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }

    /// 当前空闲连接数
    pub fn idle_count(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// 当前可借出的名额
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    /// 借出一条连接，优先复用空闲连接
    pub async fn checkout(&self) -> Result<PooledConnection> {
        let started = Instant::now();
        let permit = tokio::time::timeout(
            self.inner.checkout_timeout,
            self.inner.permits.clone().acquire_owned(),
        )
        .await
        .map_err(|_| StoreError::PoolTimeout {
            waited_ms: started.elapsed().as_millis() as u64,
        })?
        .map_err(|_| StoreError::PoolClosed)?;

        let idle = self.inner.idle.lock().pop();
        let conn = match idle {
            Some(conn) => conn,
            None => self.inner.dialer.dial().await?,
        };

        Ok(PooledConnection {
            conn,
            pool: Arc::clone(&self.inner),
            broken: false,
            _permit: permit,
        })
    }

    /// 关闭连接池：拒绝新的借用并丢弃空闲连接
    pub fn close(&self) {
        self.inner.permits.close();
        self.inner.idle.lock().clear();
    }
}

/// 借出的连接，drop 时归还连接池
pub struct PooledConnection {
    conn: MultiplexedConnection,
    pool: Arc<PoolInner>,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// 标记连接已损坏，归还时丢弃而不放回空闲队列
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl Deref for PooledConnection {
    type Target = MultiplexedConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.broken || self.pool.permits.is_closed() {
            return;
        }
        let mut idle = self.pool.idle.lock();
        if idle.len() < self.pool.max_size {
            idle.push(self.conn.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// ConnectionSource: 构造时选定的获取方式
// ---------------------------------------------------------------------------

/// 连接获取方式
#[derive(Clone)]
pub enum ConnectionSource {
    Shared(MultiplexedConnection),
    Pooled(ConnectionPool),
    PerCall(Dialer),
}

impl ConnectionSource {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Shared(_) => "shared",
            Self::Pooled(_) => "pooled",
            Self::PerCall(_) => "per_call",
        }
    }

    /// 为一次逻辑操作获取连接
    pub(crate) async fn acquire(&self) -> Result<Lease> {
        match self {
            Self::Shared(conn) => Ok(Lease::Shared(conn.clone())),
            Self::Pooled(pool) => Ok(Lease::Pooled(pool.checkout().await?)),
            Self::PerCall(dialer) => Ok(Lease::Dialed(dialer.dial().await?)),
        }
    }
}

/// 一次逻辑操作期间持有的连接
///
/// 对于连接池，drop 即归还；对于独立建连，drop 即关闭。
pub(crate) enum Lease {
    Shared(MultiplexedConnection),
    Pooled(PooledConnection),
    Dialed(MultiplexedConnection),
}

impl Lease {
    /// 借出连接的句柄；多路复用连接的克隆共享同一条底层连接
    pub(crate) fn handle(&self) -> MultiplexedConnection {
        (**self).clone()
    }

    /// 操作失败后根据错误类型决定是否废弃连接
    pub(crate) fn observe(&mut self, err: &StoreError) {
        if let Self::Pooled(conn) = self {
            if err.is_retryable() {
                warn!(error = %err, "discarding pooled connection after transient failure");
                conn.mark_broken();
            }
        }
    }
}

impl Deref for Lease {
    type Target = MultiplexedConnection;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Shared(conn) | Self::Dialed(conn) => conn,
            Self::Pooled(conn) => &**conn,
        }
    }
}

impl DerefMut for Lease {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Shared(conn) | Self::Dialed(conn) => conn,
            Self::Pooled(conn) => &mut **conn,
        }
    }
}
