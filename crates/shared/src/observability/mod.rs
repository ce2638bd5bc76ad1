//! 统一可观测性模块
//!
//! 提供 logging 与 metrics 的统一初始化。指标只通过 `metrics` 门面记录，
//! 导出器由嵌入进程自行安装。

pub mod metrics;

use ::tracing::info;
use anyhow::Result;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::ObservabilityConfig;

/// 可观测性资源守卫
///
/// 持有初始化状态，drop 时输出关闭日志。
pub struct ObservabilityGuard {
    service_name: String,
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        info!(service = %self.service_name, "Shutting down observability...");
    }
}

/// 统一初始化可观测性
///
/// 1. 日志：`RUST_LOG` 优先，否则使用配置中的级别
/// 2. 指标：注册指标描述
///
/// 全局 subscriber 只能安装一次，重复调用返回错误而不是 panic。
///
/// # Example
///
/// ```ignore
/// use mesh_shared::config::AppConfig;
/// use mesh_shared::observability;
///
/// let config = AppConfig::load("mesh-registry")?;
/// let _guard = observability::init(&config.service_name, &config.observability)?;
/// ```
pub fn init(service_name: &str, config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = if config.json_logs() {
        fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    metrics::describe();

    info!(
        service = %service_name,
        log_level = %config.log_level,
        log_format = %config.log_format,
        "Observability initialized"
    );

    Ok(ObservabilityGuard {
        service_name: service_name.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error() {
        let config = ObservabilityConfig::default();
        // 其他测试可能已经安装了 subscriber，因此第一次结果不做断言
        let _first = init("test-service", &config);
        assert!(init("test-service", &config).is_err());
    }
}
