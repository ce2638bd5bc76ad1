//! 规则持久化
//!
//! 规则以 JSON 存放在 `{namespace}:{destination}:{id}` 下。
//! 存储层不提供跨调用原子性，并发更新同一条规则时后写者生效。

use std::sync::Arc;

use kv_store::Store;
use kv_store::glob::escape;
use tracing::{debug, instrument, warn};

use crate::error::{Result, RuleError};
use crate::models::{Filter, Rule};

/// 规则仓储
pub struct RuleRepository<S: Store + ?Sized> {
    store: Arc<S>,
    namespace: String,
}

impl<S: Store + ?Sized> Clone for RuleRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            namespace: self.namespace.clone(),
        }
    }
}

impl<S: Store + ?Sized> RuleRepository<S> {
    pub fn new(store: Arc<S>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// 规则的存储键
    pub fn key(&self, destination: &str, id: &str) -> String {
        format!("{}:{}:{}", self.namespace, destination, id)
    }

    /// 写入或覆盖规则
    #[instrument(skip(self, rule), fields(rule_id = %rule.id(), destination = %rule.destination()))]
    pub async fn put(&self, rule: &Rule) -> Result<()> {
        let key = self.key(rule.destination(), rule.id());
        let payload = rule.to_json()?;
        self.store.insert_entry(&key, &payload).await?;
        debug!(key = %key, "rule stored");
        Ok(())
    }

    /// 读取规则，记录内容必须与所在的键一致
    #[instrument(skip(self))]
    pub async fn get(&self, destination: &str, id: &str) -> Result<Option<Rule>> {
        let key = self.key(destination, id);
        match self.store.read_entry(&key).await? {
            Some(bytes) => self.decode_at(&key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// 删除规则，返回规则是否存在
    #[instrument(skip(self))]
    pub async fn delete(&self, destination: &str, id: &str) -> Result<bool> {
        let removed = self.store.delete_entry(&self.key(destination, id)).await?;
        Ok(removed > 0)
    }

    /// 列出通过过滤的规则，按存储键排序
    ///
    /// 无法解析的记录会被跳过并记录告警，不影响其他规则。
    #[instrument(skip(self, filter))]
    pub async fn list(&self, filter: &Filter) -> Result<Vec<Rule>> {
        let pattern = match filter.single_destination() {
            Some(destination) => format!("{}:{}:*", escape(&self.namespace), escape(destination)),
            None => format!("{}:*", escape(&self.namespace)),
        };

        let mut entries: Vec<_> = self.store.read_all_entries(&pattern).await?.into_iter().collect();
        entries.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let rules = entries
            .into_iter()
            .filter_map(|(key, bytes)| match self.decode_at(&key, &bytes) {
                Ok(rule) => Some(rule),
                Err(err) => {
                    warn!(key = %key, error = %err, "skipping malformed rule record");
                    None
                }
            })
            .collect();

        Ok(filter.apply(rules))
    }

    fn decode_at(&self, key: &str, bytes: &[u8]) -> Result<Rule> {
        let rule: Rule = serde_json::from_slice(bytes).map_err(|source| RuleError::Decode {
            key: key.to_string(),
            source,
        })?;

        if self.key(rule.destination(), rule.id()) != key {
            return Err(RuleError::KeyMismatch {
                key: key.to_string(),
                destination: rule.destination().to_string(),
                id: rule.id().to_string(),
            });
        }
        Ok(rule)
    }
}
