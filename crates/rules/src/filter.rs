//! 规则过滤
//!
//! 纯函数：单次遍历，保持输入顺序，不修改输入，只分配输出集合。

use mesh_shared::observability::metrics::record_rule_filter;

use crate::models::{Filter, Rule, RuleType};

impl Filter {
    /// 单条规则是否通过过滤
    pub fn matches(&self, rule: &Rule) -> bool {
        self.matches_id(rule)
            && self.matches_tags(rule)
            && self.matches_destination(rule)
            && self.matches_type(rule)
    }

    /// 按值过滤
    pub fn apply(&self, rules: Vec<Rule>) -> Vec<Rule> {
        let input = rules.len();
        let output: Vec<Rule> = rules.into_iter().filter(|r| self.matches(r)).collect();
        record_rule_filter(input, output.len());
        output
    }

    fn matches_id(&self, rule: &Rule) -> bool {
        self.ids.is_empty() || self.ids.contains(rule.id())
    }

    // 空标签的规则不能通过非空的标签约束
    fn matches_tags(&self, rule: &Rule) -> bool {
        self.tags.is_empty() || !self.tags.is_disjoint(rule.tags())
    }

    fn matches_destination(&self, rule: &Rule) -> bool {
        self.destinations.is_empty() || self.destinations.contains(rule.destination())
    }

    fn matches_type(&self, rule: &Rule) -> bool {
        self.rule_type == RuleType::Any || self.rule_type == rule.rule_type()
    }
}

/// 过滤规则集合，返回通过的规则引用
pub fn filter_rules<'a>(filter: &Filter, rules: &'a [Rule]) -> Vec<&'a Rule> {
    let output: Vec<&Rule> = if filter.is_unconstrained() {
        rules.iter().collect()
    } else {
        rules.iter().filter(|r| filter.matches(r)).collect()
    };

    record_rule_filter(rules.len(), output.len());
    output
}
