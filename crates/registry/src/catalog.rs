//! 基于租约的服务目录
//!
//! 实例记录存放在 `{namespace}:{service}:{instance_id}` 下，注册时写入并设置 TTL，
//! 续约即刷新 TTL。租约到期后记录由存储后端移除，实例随之下线。

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use kv_store::Store;
use kv_store::glob::escape;
use mesh_shared::config::RegistryConfig;
use mesh_shared::observability::metrics::record_lease_operation;
use mesh_shared::retry::{RetryPolicy, retry_with_policy};
use mesh_shared::validation::{self, is_in_range_duration};
use tracing::{info, instrument, warn};

use crate::error::{RegistryError, Result};
use crate::models::ServiceInstance;

/// 租约最短 1 秒，更短的 TTL 会被截断为 0 并立即删除记录
const MIN_TTL: Duration = Duration::from_secs(1);
const MAX_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// 服务目录
pub struct ServiceCatalog<S: Store + ?Sized> {
    store: Arc<S>,
    namespace: String,
    retry: RetryPolicy,
}

impl<S: Store + ?Sized> Clone for ServiceCatalog<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            namespace: self.namespace.clone(),
            retry: self.retry.clone(),
        }
    }
}

impl<S: Store + ?Sized> ServiceCatalog<S> {
    pub fn new(store: Arc<S>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(store: Arc<S>, config: &RegistryConfig) -> Self {
        Self::new(store, config.namespace.clone())
            .with_retry_policy(RetryPolicy::default().with_max_retries(config.register_retries))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn key(&self, service: &str, instance_id: &str) -> String {
        format!("{}:{}:{}", self.namespace, service, instance_id)
    }

    /// 注册实例并设置租约
    ///
    /// 写入与设置 TTL 是两次独立调用，瞬时故障时整体重试。
    /// 最终仍未设置成功时删除已写入的记录，不留下没有租约的实例。
    #[instrument(skip(self, instance), fields(service = %instance.service_name, instance_id = %instance.id))]
    pub async fn register(&self, instance: &ServiceInstance, ttl: Duration) -> Result<()> {
        instance.validate()?;
        validate_ttl(ttl)?;

        let key = self.key(&instance.service_name, &instance.id);
        let payload = serde_json::to_vec(instance)?;
        let written = AtomicBool::new(false);

        let (store, key_ref, payload, written_ref) =
            (&self.store, key.as_str(), payload.as_slice(), &written);
        let result = retry_with_policy(&self.retry, "register", move || async move {
            store.insert_entry(key_ref, payload).await?;
            written_ref.store(true, Ordering::Relaxed);
            store.expire(key_ref, ttl).await
        })
        .await;
        record_lease_operation("register", result.is_ok());

        if let Err(err) = result {
            if written.load(Ordering::Relaxed) {
                self.discard_unleased(&key).await;
            }
            return Err(err.into());
        }

        info!(key = %key, ttl_secs = ttl.as_secs(), "service instance registered");
        Ok(())
    }

    /// 续约
    ///
    /// 对不存在的键设置 TTL 是空操作，因此先确认实例仍然存在。
    #[instrument(skip(self))]
    pub async fn renew(&self, service: &str, instance_id: &str, ttl: Duration) -> Result<()> {
        validate_ttl(ttl)?;
        let key = self.key(service, instance_id);

        let result = async {
            if self.store.read_entry(&key).await?.is_none() {
                return Err(RegistryError::NotRegistered {
                    service: service.to_string(),
                    instance_id: instance_id.to_string(),
                });
            }
            retry_with_policy(&self.retry, "renew", || self.store.expire(&key, ttl)).await?;
            Ok(())
        }
        .await;

        record_lease_operation("renew", result.is_ok());
        result
    }

    async fn discard_unleased(&self, key: &str) {
        match self.store.delete_entry(key).await {
            Ok(_) => warn!(key, "lease not set, registration rolled back"),
            Err(err) => warn!(key, error = %err, "lease not set and rollback failed"),
        }
    }

    /// 注销实例，返回实例是否存在
    #[instrument(skip(self))]
    pub async fn deregister(&self, service: &str, instance_id: &str) -> Result<bool> {
        let result = self.store.delete_entry(&self.key(service, instance_id)).await;
        record_lease_operation("deregister", result.is_ok());

        let removed = result? > 0;
        if removed {
            info!(service, instance_id, "service instance deregistered");
        }
        Ok(removed)
    }

    /// 读取单个实例
    #[instrument(skip(self))]
    pub async fn instance(&self, service: &str, instance_id: &str) -> Result<Option<ServiceInstance>> {
        let key = self.key(service, instance_id);
        match self.store.read_entry(&key).await? {
            Some(bytes) => decode(&key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// 服务的所有存活实例，按实例 ID 排序
    #[instrument(skip(self))]
    pub async fn instances(&self, service: &str) -> Result<Vec<ServiceInstance>> {
        let pattern = format!("{}:{}:*", escape(&self.namespace), escape(service));
        let entries = self.store.read_all_entries(&pattern).await?;

        let mut instances: Vec<ServiceInstance> = entries
            .into_iter()
            .filter_map(|(key, bytes)| match decode(&key, &bytes) {
                Ok(instance) => Some(instance),
                Err(err) => {
                    warn!(key = %key, error = %err, "skipping malformed instance record");
                    None
                }
            })
            .collect();
        instances.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        Ok(instances)
    }

    /// 至少有一个存活实例的服务名
    #[instrument(skip(self))]
    pub async fn services(&self) -> Result<Vec<String>> {
        let prefix = format!("{}:", self.namespace);
        let keys = self
            .store
            .read_keys(&format!("{}*", escape(&prefix)))
            .await?;

        let services: BTreeSet<String> = keys
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(|rest| rest.split_once(':'))
            .map(|(service, _)| service.to_string())
            .collect();
        Ok(services.into_iter().collect())
    }
}

fn validate_ttl(ttl: Duration) -> Result<()> {
    validation::validate(&[is_in_range_duration("ttl", ttl, MIN_TTL, MAX_TTL)])?;
    Ok(())
}

fn decode(key: &str, bytes: &[u8]) -> Result<ServiceInstance> {
    serde_json::from_slice(bytes).map_err(|source| RegistryError::Decode {
        key: key.to_string(),
        source,
    })
}
