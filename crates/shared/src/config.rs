//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::validation::{
    self, ValidationError, is_in_range, is_in_range_duration, is_not_empty, is_valid_url,
};

/// 存储连接获取方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// 单条长连接，所有调用复用
    Single,
    /// 连接池，每次逻辑操作借出一条连接
    #[default]
    Pool,
    /// 每次调用独立建连、认证、关闭
    PerCall,
}

/// 批量读取时，扫描与 MGET 之间消失的键如何处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingKeyPolicy {
    /// 静默丢弃，结果中不包含该键
    #[default]
    Omit,
    /// 返回错误，同时携带已读取到的条目和缺失的键
    Report,
}

/// 存储后端配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: String,
    /// 为空时不发送 AUTH
    pub password: String,
    pub mode: ConnectionMode,
    pub pool_size: u32,
    pub checkout_timeout_ms: u64,
    /// SCAN 的 COUNT 提示，None 表示由后端决定页大小
    pub scan_count: Option<u32>,
    pub missing_keys: MissingKeyPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            password: String::new(),
            mode: ConnectionMode::default(),
            pool_size: 10,
            checkout_timeout_ms: 5_000,
            scan_count: None,
            missing_keys: MissingKeyPolicy::default(),
        }
    }
}

impl StoreConfig {
    pub fn checkout_timeout(&self) -> Duration {
        Duration::from_millis(self.checkout_timeout_ms)
    }
}

/// 服务注册表配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub namespace: String,
    pub default_ttl_secs: u64,
    /// 注册遇到瞬时故障时的最大重试次数
    pub register_retries: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            namespace: "registry".to_string(),
            default_ttl_secs: 60,
            register_retries: 3,
        }
    }
}

impl RegistryConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

/// 规则存储配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    pub namespace: String,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            namespace: "rules".to_string(),
        }
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub store: StoreConfig,
    pub registry: RegistryConfig,
    pub rules: RulesConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（MESH_ 前缀，双下划线分隔层级，如 MESH_STORE__URL -> store.url）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("MESH_ENV").unwrap_or_else(|_| "development".to_string());
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(Path::new(&config_dir), service_name, &env)
    }

    /// 从指定目录加载配置
    pub fn load_from(config_dir: &Path, service_name: &str, env: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            )
            .add_source(
                Environment::with_prefix("MESH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// 校验配置，返回第一个不满足的检查项
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(&[
            is_not_empty("service_name", self.service_name.as_str()),
            is_valid_url("store.url", self.store.url.as_str()),
            is_in_range("store.pool_size", i64::from(self.store.pool_size), 1, 1024),
            is_in_range(
                "store.scan_count",
                i64::from(self.store.scan_count.unwrap_or(10)),
                1,
                100_000,
            ),
            is_not_empty("registry.namespace", self.registry.namespace.as_str()),
            is_in_range_duration(
                "registry.default_ttl_secs",
                self.registry.default_ttl(),
                Duration::from_secs(1),
                Duration::from_secs(24 * 60 * 60),
            ),
            is_not_empty("rules.namespace", self.rules.namespace.as_str()),
        ])
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            service_name: "mesh-registry".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.store.pool_size, 10);
        assert_eq!(config.store.mode, ConnectionMode::Pool);
        assert_eq!(config.store.missing_keys, MissingKeyPolicy::Omit);
        assert_eq!(config.registry.default_ttl(), Duration::from_secs(60));
        assert!(!config.observability.json_logs());
    }

    #[test]
    fn test_validate_accepts_defaults_with_service_name() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_reports_first_violation() {
        let mut config = valid_config();
        config.store.url = "localhost:6379".to_string();
        config.store.pool_size = 0;

        let err = config.validate().unwrap_err();
        assert_eq!(err.field(), "store.url");
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let mut config = valid_config();
        config.registry.default_ttl_secs = 0;

        let err = config.validate().unwrap_err();
        assert_eq!(err.field(), "registry.default_ttl_secs");
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let dir = std::env::temp_dir().join("mesh-config-does-not-exist");
        let config = AppConfig::load_from(&dir, "mesh-registry", "test").unwrap();

        assert_eq!(config.service_name, "mesh-registry");
        assert_eq!(config.environment, "test");
        assert_eq!(config.rules.namespace, "rules");
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = std::env::temp_dir().join(format!("mesh-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("default.toml"),
            r#"
[store]
url = "redis://cache:6379"
mode = "per_call"
scan_count = 500
missing_keys = "report"

[registry]
namespace = "svc"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&dir, "mesh-registry", "test").unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(config.store.url, "redis://cache:6379");
        assert_eq!(config.store.mode, ConnectionMode::PerCall);
        assert_eq!(config.store.scan_count, Some(500));
        assert_eq!(config.store.missing_keys, MissingKeyPolicy::Report);
        assert_eq!(config.registry.namespace, "svc");
        // 未配置的字段保持默认值
        assert_eq!(config.store.pool_size, 10);
    }
}
