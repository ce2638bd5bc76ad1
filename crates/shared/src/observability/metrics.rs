//! 指标记录
//!
//! 基于 metrics crate 门面，未安装 recorder 时所有记录均为空操作。

use std::time::Duration;

pub const STORE_OPERATIONS_TOTAL: &str = "kv_store_operations_total";
pub const STORE_OPERATION_DURATION: &str = "kv_store_operation_duration_seconds";
pub const STORE_SCAN_PAGES_TOTAL: &str = "kv_store_scan_pages_total";
pub const STORE_MISSING_KEYS_TOTAL: &str = "kv_store_missing_keys_total";
pub const RULE_FILTER_TOTAL: &str = "rule_filter_evaluations_total";
pub const REGISTRY_LEASES_TOTAL: &str = "registry_lease_operations_total";

/// 注册指标描述，出现在导出端点的 HELP 注释中
pub fn describe() {
    metrics::describe_counter!(STORE_OPERATIONS_TOTAL, "Total number of key-value store operations");
    metrics::describe_histogram!(
        STORE_OPERATION_DURATION,
        "Key-value store operation duration in seconds"
    );
    metrics::describe_counter!(STORE_SCAN_PAGES_TOTAL, "Total number of scan pages fetched");
    metrics::describe_counter!(
        STORE_MISSING_KEYS_TOTAL,
        "Keys that vanished between scan and bulk read"
    );
    metrics::describe_counter!(RULE_FILTER_TOTAL, "Total number of rule filter evaluations");
    metrics::describe_counter!(REGISTRY_LEASES_TOTAL, "Total number of registry lease operations");
}

/// 记录一次存储操作
#[inline]
pub fn record_store_operation(operation: &'static str, ok: bool, elapsed: Duration) {
    let status = if ok { "ok" } else { "error" };
    metrics::counter!(
        STORE_OPERATIONS_TOTAL,
        "operation" => operation,
        "status" => status
    )
    .increment(1);

    metrics::histogram!(STORE_OPERATION_DURATION, "operation" => operation)
        .record(elapsed.as_secs_f64());
}

/// 记录扫描页数
#[inline]
pub fn record_scan_page(backend: &'static str) {
    metrics::counter!(STORE_SCAN_PAGES_TOTAL, "backend" => backend).increment(1);
}

/// 记录批量读取中消失的键数量
#[inline]
pub fn record_missing_keys(count: usize) {
    metrics::counter!(STORE_MISSING_KEYS_TOTAL).increment(count as u64);
}

/// 记录规则过滤
#[inline]
pub fn record_rule_filter(input: usize, output: usize) {
    metrics::counter!(RULE_FILTER_TOTAL).increment(1);
    metrics::histogram!("rule_filter_selectivity")
        .record(if input == 0 { 1.0 } else { output as f64 / input as f64 });
}

/// 记录租约操作（register / renew / deregister）
#[inline]
pub fn record_lease_operation(operation: &'static str, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    metrics::counter!(
        REGISTRY_LEASES_TOTAL,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}
