//! 存储层错误类型
//!
//! "键不存在" 不是错误，由 `Option` 表达；这里只描述后端不可用、
//! 回复格式异常以及部分结果三类情况。

use std::collections::HashMap;

use mesh_shared::retry::Retryable;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    // ==================== 连接错误 ====================
    #[error("连接后端失败: {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: redis::RedisError,
    },

    #[error("后端认证失败: {0}")]
    Auth(#[source] redis::RedisError),

    #[error("等待连接池超时: {waited_ms}ms")]
    PoolTimeout { waited_ms: u64 },

    #[error("连接池已关闭")]
    PoolClosed,

    // ==================== 命令错误 ====================
    #[error("Redis 错误: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("回复解码失败: {command} - {reason}")]
    Decode {
        command: &'static str,
        reason: String,
    },

    #[error("无效的匹配模式: {pattern} - {reason}")]
    InvalidPattern { pattern: String, reason: String },

    // ==================== 部分结果 ====================
    #[error("扫描中断，已收集 {} 个键: {source}", .keys.len())]
    IncompleteScan {
        keys: Vec<String>,
        #[source]
        source: Box<StoreError>,
    },

    #[error("批量读取不完整，已读取 {} 个条目: {source}", .entries.len())]
    PartialEntries {
        entries: HashMap<String, Vec<u8>>,
        #[source]
        source: Box<StoreError>,
    },

    #[error("{} 个键在扫描与批量读取之间消失", .missing.len())]
    MissingKeys {
        entries: HashMap<String, Vec<u8>>,
        missing: Vec<String>,
    },
}

/// 存储层结果类型别名
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    pub(crate) fn decode(command: &'static str, reason: impl Into<String>) -> Self {
        Self::Decode {
            command,
            reason: reason.into(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "CONNECT_FAILED",
            Self::Auth(_) => "AUTH_FAILED",
            Self::PoolTimeout { .. } => "POOL_TIMEOUT",
            Self::PoolClosed => "POOL_CLOSED",
            Self::Redis(_) => "REDIS_ERROR",
            Self::Decode { .. } => "DECODE_ERROR",
            Self::InvalidPattern { .. } => "INVALID_PATTERN",
            Self::IncompleteScan { .. } => "INCOMPLETE_SCAN",
            Self::PartialEntries { .. } => "PARTIAL_ENTRIES",
            Self::MissingKeys { .. } => "MISSING_KEYS",
        }
    }

    /// 是否为可重试的瞬时故障
    ///
    /// 部分结果错误按其内部原因判断。
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect { .. } | Self::PoolTimeout { .. } => true,
            Self::Redis(e) => {
                e.is_io_error()
                    || e.is_timeout()
                    || e.is_connection_dropped()
                    || e.is_connection_refusal()
            }
            Self::IncompleteScan { source, .. } | Self::PartialEntries { source, .. } => {
                source.is_retryable()
            }
            _ => false,
        }
    }

    /// 是否为配置级别的致命错误（重试无意义）
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::PoolClosed)
    }

    /// 部分结果错误中已收集到的键
    pub fn partial_keys(&self) -> Option<&[String]> {
        match self {
            Self::IncompleteScan { keys, .. } => Some(keys),
            _ => None,
        }
    }

    /// 部分结果错误中已读取到的条目
    pub fn partial_entries(&self) -> Option<&HashMap<String, Vec<u8>>> {
        match self {
            Self::PartialEntries { entries, .. } | Self::MissingKeys { entries, .. } => {
                Some(entries)
            }
            _ => None,
        }
    }
}

impl Retryable for StoreError {
    fn is_retryable(&self) -> bool {
        StoreError::is_retryable(self)
    }
}
