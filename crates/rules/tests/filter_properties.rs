//! 过滤语义测试

use mesh_rules::{Filter, Rule, RuleType, filter_rules};
use serde_json::json;

fn rule1() -> Rule {
    Rule::action("rule1", "service1", json!([{"type": "abort"}]))
        .unwrap()
        .with_tags(["tag1", "tag2"])
}

fn rule2() -> Rule {
    Rule::route("rule2", "service2", json!({"backends": [{"tags": ["v1"]}]})).unwrap()
}

fn ids(rules: Vec<&Rule>) -> Vec<&str> {
    rules.into_iter().map(Rule::id).collect()
}

/// 混合标签、目标服务与类型的规则集
fn corpus() -> Vec<Rule> {
    let mut rules = Vec::new();
    for i in 0..24 {
        let dest = format!("svc{}", i % 3);
        let tags: Vec<String> = (0..(i % 4)).map(|t| format!("t{}", t)).collect();
        let rule = if i % 2 == 0 {
            Rule::action(format!("r{}", i), dest, json!([]))
        } else {
            Rule::route(format!("r{}", i), dest, json!({}))
        };
        rules.push(rule.unwrap().with_tags(tags));
    }
    rules
}

// ==================== 场景 ====================

#[test]
fn test_scenario_empty_filter() {
    let rules = vec![rule1(), rule2()];
    assert_eq!(ids(filter_rules(&Filter::default(), &rules)), vec!["rule1", "rule2"]);
}

#[test]
fn test_scenario_tags() {
    let rules = vec![rule1(), rule2()];
    let filter = Filter::new().with_tags(["tag1"]);
    assert_eq!(ids(filter_rules(&filter, &rules)), vec!["rule1"]);
}

#[test]
fn test_scenario_destinations() {
    let rules = vec![rule1(), rule2()];
    let filter = Filter::new().with_destinations(["service2"]);
    assert_eq!(ids(filter_rules(&filter, &rules)), vec!["rule2"]);
}

#[test]
fn test_scenario_rule_type() {
    let rules = vec![rule1(), rule2()];

    let actions = Filter::new().with_rule_type(RuleType::Action);
    assert_eq!(ids(filter_rules(&actions, &rules)), vec!["rule1"]);

    let routes = Filter::new().with_rule_type(RuleType::Route);
    assert_eq!(ids(filter_rules(&routes, &rules)), vec!["rule2"]);
}

// ==================== 性质 ====================

#[test]
fn test_identity_preserves_order_and_length() {
    let rules = corpus();
    let out = filter_rules(&Filter::default(), &rules);
    assert_eq!(out.len(), rules.len());
    assert!(out.iter().zip(&rules).all(|(a, b)| std::ptr::eq(*a, b)));
}

#[test]
fn test_tag_filter_selects_exactly_tagged_rules() {
    let rules = corpus();
    for tag in ["t0", "t1", "t2", "missing"] {
        let out = filter_rules(&Filter::new().with_tags([tag]), &rules);
        let expected: Vec<&Rule> = rules.iter().filter(|r| r.tags().contains(tag)).collect();
        assert_eq!(out, expected, "tag = {}", tag);
        assert!(out.iter().all(|r| !r.tags().is_empty()));
    }
}

#[test]
fn test_destination_filter_selects_exact_matches() {
    let rules = corpus();
    for dest in ["svc0", "svc1", "svc2", "svc"] {
        let out = filter_rules(&Filter::new().with_destinations([dest]), &rules);
        let expected: Vec<&Rule> = rules.iter().filter(|r| r.destination() == dest).collect();
        assert_eq!(out, expected, "destination = {}", dest);
    }
}

#[test]
fn test_rule_types_partition_rules() {
    let rules = corpus();
    let actions = filter_rules(&Filter::new().with_rule_type(RuleType::Action), &rules);
    let routes = filter_rules(&Filter::new().with_rule_type(RuleType::Route), &rules);

    assert_eq!(actions.len() + routes.len(), rules.len());
    assert!(actions.iter().all(|a| !routes.iter().any(|r| std::ptr::eq(*a, *r))));
}

#[test]
fn test_filter_does_not_mutate_input() {
    let rules = corpus();
    let snapshot = rules.clone();
    let _ = filter_rules(&Filter::new().with_tags(["t1"]).with_rule_type(RuleType::Route), &rules);
    assert_eq!(rules, snapshot);
}

#[test]
fn test_apply_matches_borrowed_variant() {
    let rules = corpus();
    let filter = Filter::new().with_tags(["t1"]).with_destinations(["svc0", "svc2"]);

    let borrowed: Vec<Rule> = filter_rules(&filter, &rules).into_iter().cloned().collect();
    assert_eq!(filter.apply(rules), borrowed);
}
