//! 配置校验组合子
//!
//! 每个检查项都是一个具名、可独立调用的闭包，由 [`validate`] 按顺序执行，
//! 只报告第一个失败的检查项，不做聚合。

use std::time::Duration;

use thiserror::Error;
use url::Url;

/// 校验失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{name} is empty")]
    Empty { name: String },

    #[error("{name} is not a valid URL: {value}")]
    InvalidUrl { name: String, value: String },

    #[error("{name} is not in range [{min}, {max}]")]
    OutOfRange { name: String, min: i64, max: i64 },

    #[error("{name} must be between {min:?} and {max:?}")]
    DurationOutOfRange {
        name: String,
        min: Duration,
        max: Duration,
    },

    #[error("{name} must not contain {forbidden:?}")]
    Forbidden { name: String, forbidden: char },
}

impl ValidationError {
    /// 获取失败的字段名
    pub fn field(&self) -> &str {
        match self {
            Self::Empty { name }
            | Self::InvalidUrl { name, .. }
            | Self::OutOfRange { name, .. }
            | Self::DurationOutOfRange { name, .. }
            | Self::Forbidden { name, .. } => name,
        }
    }
}

/// 单个校验检查项
pub type Check = Box<dyn Fn() -> Result<(), ValidationError> + Send + Sync>;

/// 依次执行检查项，返回第一个失败
pub fn validate(checks: &[Check]) -> Result<(), ValidationError> {
    for check in checks {
        check()?;
    }
    Ok(())
}

/// 字符串非空
pub fn is_not_empty(name: impl Into<String>, value: impl Into<String>) -> Check {
    let name = name.into();
    let value = value.into();
    Box::new(move || {
        if value.is_empty() {
            return Err(ValidationError::Empty { name: name.clone() });
        }
        Ok(())
    })
}

/// 绝对 URL，必须同时包含 scheme 与 host
pub fn is_valid_url(name: impl Into<String>, value: impl Into<String>) -> Check {
    let name = name.into();
    let value = value.into();
    Box::new(move || {
        if value.is_empty() {
            return Err(ValidationError::Empty { name: name.clone() });
        }

        let invalid = || ValidationError::InvalidUrl {
            name: name.clone(),
            value: value.clone(),
        };

        let url = Url::parse(&value).map_err(|_| invalid())?;
        match url.host_str() {
            Some(host) if !host.is_empty() && !url.scheme().is_empty() => Ok(()),
            _ => Err(invalid()),
        }
    })
}

/// 整数在闭区间 [min, max] 内
pub fn is_in_range(name: impl Into<String>, value: i64, min: i64, max: i64) -> Check {
    let name = name.into();
    Box::new(move || {
        if value < min || value > max {
            return Err(ValidationError::OutOfRange {
                name: name.clone(),
                min,
                max,
            });
        }
        Ok(())
    })
}

/// 时长在闭区间 [min, max] 内，按整秒比较
pub fn is_in_range_duration(
    name: impl Into<String>,
    value: Duration,
    min: Duration,
    max: Duration,
) -> Check {
    let name = name.into();
    Box::new(move || {
        let secs = value.as_secs();
        if secs < min.as_secs() || secs > max.as_secs() {
            return Err(ValidationError::DurationOutOfRange {
                name: name.clone(),
                min,
                max,
            });
        }
        Ok(())
    })
}

/// 字符串不包含指定字符，用于键的分段
pub fn does_not_contain(name: impl Into<String>, value: impl Into<String>, forbidden: char) -> Check {
    let name = name.into();
    let value = value.into();
    Box::new(move || {
        if value.contains(forbidden) {
            return Err(ValidationError::Forbidden {
                name: name.clone(),
                forbidden,
            });
        }
        Ok(())
    })
}
