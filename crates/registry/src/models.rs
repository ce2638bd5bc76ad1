//! 服务实例模型

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use mesh_shared::validation::{
    self, ValidationError, does_not_contain, is_in_range, is_not_empty,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 端点协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    #[default]
    Http,
    Grpc,
    Tcp,
}

/// 服务端点
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u32,
    #[serde(default)]
    pub kind: EndpointKind,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u32, kind: EndpointKind) -> Self {
        Self {
            host: host.into(),
            port,
            kind,
        }
    }

    pub fn http(host: impl Into<String>, port: u32) -> Self {
        Self::new(host, port, EndpointKind::Http)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 服务实例
///
/// 存在即存活：实例记录带 TTL 写入，租约过期后自动消失。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub id: String,
    pub service_name: String,
    pub endpoint: Endpoint,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// 对注册中心不透明的附加信息
    #[serde(default)]
    pub metadata: Value,
    #[serde(default = "Utc::now")]
    pub registered_at: DateTime<Utc>,
}

impl ServiceInstance {
    /// 创建实例，ID 随机生成
    pub fn new(service_name: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            service_name: service_name.into(),
            endpoint,
            tags: BTreeSet::new(),
            metadata: Value::Null,
            registered_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// 注册前校验
    ///
    /// 服务名与实例 ID 是存储键的分段，不能包含 `:`。
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(&[
            is_not_empty("service_name", self.service_name.as_str()),
            does_not_contain("service_name", self.service_name.as_str(), ':'),
            is_not_empty("id", self.id.as_str()),
            does_not_contain("id", self.id.as_str(), ':'),
            is_not_empty("endpoint.host", self.endpoint.host.as_str()),
            is_in_range("endpoint.port", i64::from(self.endpoint.port), 1, 65535),
        ])
    }
}
