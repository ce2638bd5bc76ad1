//! 规则领域模型
//!
//! 规则的类型（动作或路由）在构造时确定并校验，之后不会出现
//! "两者都没有" 或 "两者都有" 的状态。`match`、`actions`、`route`
//! 载荷对本模块不透明，只作为 JSON 值透传。

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RuleError};

/// 规则类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// 不限类型，仅用于过滤条件
    #[default]
    Any,
    Action,
    Route,
}

/// 规则载荷，二选一
#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    Action(Value),
    Route(Value),
}

impl RuleKind {
    pub fn rule_type(&self) -> RuleType {
        match self {
            Self::Action(_) => RuleType::Action,
            Self::Route(_) => RuleType::Route,
        }
    }

    pub fn is_action(&self) -> bool {
        matches!(self, Self::Action(_))
    }

    pub fn is_route(&self) -> bool {
        matches!(self, Self::Route(_))
    }

    pub fn payload(&self) -> &Value {
        match self {
            Self::Action(payload) | Self::Route(payload) => payload,
        }
    }
}

/// 存储键 `{namespace}:{destination}:{id}` 的分隔符
pub const KEY_SEPARATOR: char = ':';

/// 规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RuleRecord", into = "RuleRecord")]
pub struct Rule {
    id: String,
    priority: i32,
    tags: BTreeSet<String>,
    destination: String,
    match_: Value,
    kind: RuleKind,
}

impl Rule {
    /// 创建规则
    ///
    /// ID 与目标服务不能为空，也不能包含存储键的分隔符 `:`。
    pub fn new(id: impl Into<String>, destination: impl Into<String>, kind: RuleKind) -> Result<Self> {
        let id = id.into();
        let destination = destination.into();

        if id.trim().is_empty() {
            return Err(RuleError::MissingId);
        }
        if destination.trim().is_empty() {
            return Err(RuleError::MissingDestination { id });
        }
        for (field, value) in [("id", &id), ("destination", &destination)] {
            if value.contains(KEY_SEPARATOR) {
                return Err(RuleError::KeySeparator {
                    field,
                    value: value.clone(),
                });
            }
        }

        Ok(Self {
            id,
            priority: 0,
            tags: BTreeSet::new(),
            destination,
            match_: Value::Null,
            kind,
        })
    }

    pub fn action(id: impl Into<String>, destination: impl Into<String>, actions: Value) -> Result<Self> {
        Self::new(id, destination, RuleKind::Action(actions))
    }

    pub fn route(id: impl Into<String>, destination: impl Into<String>, route: Value) -> Result<Self> {
        Self::new(id, destination, RuleKind::Route(route))
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
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

    pub fn with_match(mut self, match_: Value) -> Self {
        self.match_ = match_;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// 优先级只供消费方排序使用，本模块不解释
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn match_payload(&self) -> &Value {
        &self.match_
    }

    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    pub fn rule_type(&self) -> RuleType {
        self.kind.rule_type()
    }

    /// 从 JSON 解析并校验
    pub fn from_json(json: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(json)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// 规则的存储格式
///
/// `actions` 与 `route` 恰好设置其一。
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RuleRecord {
    id: String,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    tags: BTreeSet<String>,
    destination: String,
    #[serde(default, rename = "match", skip_serializing_if = "Value::is_null")]
    match_: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    actions: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    route: Option<Value>,
}

impl TryFrom<RuleRecord> for Rule {
    type Error = RuleError;

    fn try_from(record: RuleRecord) -> Result<Self> {
        let kind = match (record.actions, record.route) {
            (Some(actions), None) => RuleKind::Action(actions),
            (None, Some(route)) => RuleKind::Route(route),
            _ => return Err(RuleError::AmbiguousKind { id: record.id }),
        };

        Ok(Rule::new(record.id, record.destination, kind)?
            .with_priority(record.priority)
            .with_tags(record.tags)
            .with_match(record.match_))
    }
}

impl From<Rule> for RuleRecord {
    fn from(rule: Rule) -> Self {
        let (actions, route) = match rule.kind {
            RuleKind::Action(payload) => (Some(payload), None),
            RuleKind::Route(payload) => (None, Some(payload)),
        };

        Self {
            id: rule.id,
            priority: rule.priority,
            tags: rule.tags,
            destination: rule.destination,
            match_: rule.match_,
            actions,
            route,
        }
    }
}

/// 规则过滤条件
///
/// 每个维度为空时不做约束；维度之间取 AND，维度内部取 OR。
/// 默认值不约束任何维度，过滤结果与输入相同。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filter {
    pub ids: BTreeSet<String>,
    pub tags: BTreeSet<String>,
    pub destinations: BTreeSet<String>,
    pub rule_type: RuleType,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.ids = ids.into_iter().map(Into::into).collect();
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

    pub fn with_destinations<I, T>(mut self, destinations: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.destinations = destinations.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_rule_type(mut self, rule_type: RuleType) -> Self {
        self.rule_type = rule_type;
        self
    }

    /// 是否不约束任何维度
    pub fn is_unconstrained(&self) -> bool {
        self.ids.is_empty()
            && self.tags.is_empty()
            && self.destinations.is_empty()
            && self.rule_type == RuleType::Any
    }

    /// 仅指定了一个目标服务时返回它
    pub fn single_destination(&self) -> Option<&str> {
        match self.destinations.len() {
            1 => self.destinations.iter().next().map(String::as_str),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_requires_destination() {
        let err = Rule::action("r1", "  ", json!({})).unwrap_err();
        assert!(matches!(err, RuleError::MissingDestination { .. }));
        assert!(err.is_malformed());

        let err = Rule::route("", "svc", json!({})).unwrap_err();
        assert_eq!(err.code(), "RULE_MISSING_ID");
    }

    #[test]
    fn test_rule_rejects_key_separator() {
        let err = Rule::route("a:b", "svc", json!({})).unwrap_err();
        assert!(matches!(err, RuleError::KeySeparator { field: "id", .. }));
        assert!(err.is_malformed());

        let err = Rule::action("r1", "svc:v2", json!([])).unwrap_err();
        assert_eq!(err.code(), "RULE_KEY_SEPARATOR");

        // 解码同样经过校验
        let err = Rule::from_json(br#"{"id":"x:y","destination":"svc","route":{}}"#).unwrap_err();
        assert!(matches!(err, RuleError::Json(_)));
        assert!(err.to_string().contains("x:y"));
    }

    #[test]
    fn test_rule_kind_helpers() {
        let rule = Rule::route("r1", "svc", json!({"backends": ["v1"]})).unwrap();
        assert!(rule.kind().is_route());
        assert!(!rule.kind().is_action());
        assert_eq!(rule.rule_type(), RuleType::Route);
        assert_eq!(rule.kind().payload(), &json!({"backends": ["v1"]}));
    }

    #[test]
    fn test_json_wire_format() {
        let rule = Rule::action("r1", "reviews", json!([{"action": "delay"}]))
            .unwrap()
            .with_priority(5)
            .with_tags(["canary"])
            .with_match(json!({"headers": {"user": "jason"}}));

        let value: Value = serde_json::from_slice(&rule.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "r1",
                "priority": 5,
                "tags": ["canary"],
                "destination": "reviews",
                "match": {"headers": {"user": "jason"}},
                "actions": [{"action": "delay"}],
            })
        );

        let decoded = Rule::from_json(value.to_string().as_bytes()).unwrap();
        assert_eq!(decoded, rule);
    }

    #[test]
    fn test_json_defaults() {
        let rule = Rule::from_json(br#"{"id":"r1","destination":"svc","route":{}}"#).unwrap();
        assert_eq!(rule.priority(), 0);
        assert!(rule.tags().is_empty());
        assert!(rule.match_payload().is_null());
    }

    #[test]
    fn test_json_rejects_neither_or_both_payloads() {
        let neither = Rule::from_json(br#"{"id":"r1","destination":"svc"}"#);
        assert!(neither.is_err());

        let both = Rule::from_json(br#"{"id":"r1","destination":"svc","actions":[],"route":{}}"#);
        assert!(both.is_err());

        let null_payload =
            Rule::from_json(br#"{"id":"r1","destination":"svc","actions":null,"route":{}}"#)
                .unwrap();
        assert!(null_payload.kind().is_route());
    }

    #[test]
    fn test_json_rejects_empty_destination() {
        assert!(Rule::from_json(br#"{"id":"r1","destination":"","route":{}}"#).is_err());
    }

    #[test]
    fn test_filter_builders() {
        let filter = Filter::new()
            .with_tags(["a", "b"])
            .with_destinations(["svc"])
            .with_rule_type(RuleType::Action);

        assert!(!filter.is_unconstrained());
        assert_eq!(filter.single_destination(), Some("svc"));
        assert!(Filter::default().is_unconstrained());
        assert_eq!(Filter::new().with_destinations(["a", "b"]).single_destination(), None);
    }

    #[test]
    fn test_filter_deserializes_with_defaults() {
        let filter: Filter = serde_json::from_str(r#"{"rule_type":"route"}"#).unwrap();
        assert_eq!(filter.rule_type, RuleType::Route);
        assert!(filter.tags.is_empty());
    }
}
