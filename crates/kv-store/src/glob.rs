//! Redis 风格的 glob 匹配模式
//!
//! 支持 `*`、`?`、`[abc]`、`[^abc]`、`[a-z]` 以及 `\` 转义，
//! 与 SCAN MATCH 的方言保持一致。

use regex::Regex;

use crate::error::{Result, StoreError};

const META: &[char] = &['*', '?', '[', ']', '\\', '^'];

/// 转义键片段中的元字符，使其可以安全嵌入扫描模式
///
/// ```
/// assert_eq!(kv_store::glob::escape("svc[v1]*"), r"svc\[v1\]\*");
/// ```
pub fn escape(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if META.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// 编译后的匹配模式
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = Regex::new(&translate(pattern)?).map_err(|e| StoreError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, key: &str) -> bool {
        self.regex.is_match(key)
    }
}

fn translate(pattern: &str) -> Result<String> {
    let invalid = |reason: &str| StoreError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    let mut out = String::from("(?s)^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => {
                let escaped = chars.next().ok_or_else(|| invalid("dangling escape"))?;
                out.push_str(&regex::escape(&escaped.to_string()));
            }
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'^') {
                    chars.next();
                    out.push('^');
                }
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '\\' => {
                            let escaped =
                                chars.next().ok_or_else(|| invalid("dangling escape"))?;
                            out.push_str(&regex::escape(&escaped.to_string()));
                        }
                        '-' => out.push('-'),
                        c => out.push_str(&regex::escape(&c.to_string())),
                    }
                }
                if !closed {
                    return Err(invalid("unclosed character class"));
                }
                out.push(']');
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
    }

    out.push('$');
    Ok(out)
}
