//! 服务注册错误类型

use kv_store::StoreError;
use mesh_shared::validation::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("服务实例不合法: {0}")]
    Invalid(#[from] ValidationError),

    #[error("服务实例未注册或租约已过期: {service}/{instance_id}")]
    NotRegistered { service: String, instance_id: String },

    #[error("服务实例记录解析失败: {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("存储错误: {0}")]
    Store(#[from] StoreError),
}

impl RegistryError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "INSTANCE_INVALID",
            Self::NotRegistered { .. } => "INSTANCE_NOT_REGISTERED",
            Self::Decode { .. } => "INSTANCE_DECODE_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Store(e) => e.code(),
        }
    }

    /// 存储层瞬时故障可重试，其余错误重试无意义
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_retryable())
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
