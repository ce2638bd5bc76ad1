//! 规则错误类型

use kv_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则缺少目标服务: {id}")]
    MissingDestination { id: String },

    #[error("规则缺少 ID")]
    MissingId,

    #[error("规则必须且只能设置 actions 或 route 之一: {id}")]
    AmbiguousKind { id: String },

    #[error("规则 {field} 不能包含键分隔符 ':': {value}")]
    KeySeparator { field: &'static str, value: String },

    #[error("存储键与规则内容不一致: {key} 中存放的是 {destination}/{id}")]
    KeyMismatch {
        key: String,
        destination: String,
        id: String,
    },

    #[error("规则解析失败: {key}: {source}")]
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

impl RuleError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingDestination { .. } => "RULE_MISSING_DESTINATION",
            Self::MissingId => "RULE_MISSING_ID",
            Self::AmbiguousKind { .. } => "RULE_AMBIGUOUS_KIND",
            Self::KeySeparator { .. } => "RULE_KEY_SEPARATOR",
            Self::KeyMismatch { .. } => "RULE_KEY_MISMATCH",
            Self::Decode { .. } => "RULE_DECODE_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Store(e) => e.code(),
        }
    }

    /// 规则本身不合法（准入阶段拒绝）
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::MissingDestination { .. }
                | Self::MissingId
                | Self::AmbiguousKind { .. }
                | Self::KeySeparator { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
