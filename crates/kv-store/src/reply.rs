//! 后端回复解码
//!
//! 把原始 `redis::Value` 显式解码为类型化结果，形状不符时返回
//! [`StoreError::Decode`]，不依赖运行时类型断言。

use redis::Value;

use crate::error::{Result, StoreError};

/// 一页扫描结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPage {
    /// 下一次请求使用的游标，0 表示遍历回到起点
    pub cursor: u64,
    pub keys: Vec<String>,
}

impl ScanPage {
    pub fn is_last(&self) -> bool {
        self.cursor == 0
    }
}

/// 解码 SCAN 回复
///
/// 空回复（Nil 或空数组）返回 `None`，表示没有更多结果。
pub fn decode_scan_page(value: Value) -> Result<Option<ScanPage>> {
    let items = match value {
        Value::Nil => return Ok(None),
        Value::Array(items) if items.is_empty() => return Ok(None),
        Value::Array(items) => items,
        other => return Err(StoreError::decode("SCAN", format!("expected array, got {:?}", other))),
    };

    if items.len() != 2 {
        return Err(StoreError::decode(
            "SCAN",
            format!("expected [cursor, keys], got {} elements", items.len()),
        ));
    }

    let mut items = items.into_iter();
    let cursor = items.next().map(decode_cursor).transpose()?.unwrap_or(0);
    let keys = match items.next() {
        Some(Value::Array(keys)) => keys
            .into_iter()
            .map(|k| decode_string("SCAN", k))
            .collect::<Result<Vec<_>>>()?,
        Some(Value::Nil) | None => Vec::new(),
        Some(other) => {
            return Err(StoreError::decode(
                "SCAN",
                format!("expected key array, got {:?}", other),
            ));
        }
    };

    Ok(Some(ScanPage { cursor, keys }))
}

/// 解码 GET 回复
pub fn decode_optional_bytes(command: &'static str, value: Value) -> Result<Option<Vec<u8>>> {
    match value {
        Value::Nil => Ok(None),
        Value::BulkString(bytes) => Ok(Some(bytes)),
        Value::SimpleString(s) => Ok(Some(s.into_bytes())),
        other => Err(StoreError::decode(
            command,
            format!("expected bulk string or nil, got {:?}", other),
        )),
    }
}

/// 解码 MGET 回复，结果与请求的键按位置一一对应
pub fn decode_multi_get(value: Value, expected: usize) -> Result<Vec<Option<Vec<u8>>>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Nil if expected == 0 => return Ok(Vec::new()),
        other => return Err(StoreError::decode("MGET", format!("expected array, got {:?}", other))),
    };

    if items.len() != expected {
        return Err(StoreError::decode(
            "MGET",
            format!("expected {} values, got {}", expected, items.len()),
        ));
    }

    items
        .into_iter()
        .map(|v| decode_optional_bytes("MGET", v))
        .collect()
}

/// 解码整数回复（DEL、EXPIRE）
pub fn decode_integer(command: &'static str, value: Value) -> Result<i64> {
    match value {
        Value::Int(n) => Ok(n),
        other => Err(StoreError::decode(
            command,
            format!("expected integer, got {:?}", other),
        )),
    }
}

fn decode_cursor(value: Value) -> Result<u64> {
    match value {
        Value::Int(n) => u64::try_from(n)
            .map_err(|_| StoreError::decode("SCAN", format!("negative cursor {}", n))),
        Value::BulkString(bytes) => parse_cursor(&bytes),
        Value::SimpleString(s) => parse_cursor(s.as_bytes()),
        other => Err(StoreError::decode("SCAN", format!("invalid cursor {:?}", other))),
    }
}

fn parse_cursor(bytes: &[u8]) -> Result<u64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            StoreError::decode(
                "SCAN",
                format!("invalid cursor {:?}", String::from_utf8_lossy(bytes)),
            )
        })
}

fn decode_string(command: &'static str, value: Value) -> Result<String> {
    match value {
        Value::BulkString(bytes) => String::from_utf8(bytes)
            .map_err(|e| StoreError::decode(command, format!("key is not utf-8: {}", e))),
        Value::SimpleString(s) => Ok(s),
        other => Err(StoreError::decode(
            command,
            format!("expected string, got {:?}", other),
        )),
    }
}
