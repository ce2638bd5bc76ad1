//! 游标扫描
//!
//! 扫描表示为惰性的键页流：从初始游标 0 开始逐页请求，
//! 当后端返回的游标回到 0 或回复为空时结束。每次调用 [`key_pages`]
//! 都从头开始一轮新的遍历。

use std::collections::HashMap;
use std::future::Future;

use futures::{Stream, StreamExt, stream};

use crate::error::{Result, StoreError};
use crate::reply::ScanPage;
use crate::store::{MissingKeyPolicy, dedup_keys, pair_entries};

/// 游标初始值，也是遍历完成的标志
pub const INITIAL_CURSOR: u64 = 0;

/// 构造键页流
///
/// `fetch(cursor)` 请求下一页，返回 `Ok(None)` 表示回复为空。
/// 某一页失败时流产出该错误后结束。
pub fn key_pages<F, Fut>(fetch: F) -> impl Stream<Item = Result<Vec<String>>>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<Option<ScanPage>>>,
{
    stream::unfold(
        (fetch, Some(INITIAL_CURSOR)),
        |(mut fetch, cursor)| async move {
            let cursor = cursor?;
            match fetch(cursor).await {
                Ok(Some(page)) => {
                    let next = (!page.is_last()).then_some(page.cursor);
                    Some((Ok(page.keys), (fetch, next)))
                }
                Ok(None) => None,
                Err(err) => Some((Err(err), (fetch, None))),
            }
        },
    )
}

/// 汇总所有页，返回去重后的键
///
/// 中途失败时返回 [`StoreError::IncompleteScan`]，其中携带已收集到的键。
pub async fn collect_keys<S>(pages: S) -> Result<Vec<String>>
where
    S: Stream<Item = Result<Vec<String>>>,
{
    let mut pages = std::pin::pin!(pages);
    let mut keys = Vec::new();

    while let Some(page) = pages.next().await {
        match page {
            Ok(page) => keys.extend(page),
            Err(source) => {
                return Err(StoreError::IncompleteScan {
                    keys: dedup_keys(keys),
                    source: Box::new(source),
                });
            }
        }
    }

    Ok(dedup_keys(keys))
}

/// 扫描后批量读取
///
/// `get_many(keys)` 返回与 `keys` 按位置对应的值。扫描完整时按 `policy`
/// 处理两阶段之间消失的键；扫描中断时仍读取已收集的键，返回
/// [`StoreError::PartialEntries`]，若批量读取也失败则返回原来的
/// [`StoreError::IncompleteScan`]。
pub async fn collect_entries<S, G, Fut>(
    pages: S,
    get_many: G,
    policy: MissingKeyPolicy,
) -> Result<HashMap<String, Vec<u8>>>
where
    S: Stream<Item = Result<Vec<String>>>,
    G: FnOnce(Vec<String>) -> Fut,
    Fut: Future<Output = Result<Vec<Option<Vec<u8>>>>>,
{
    match collect_keys(pages).await {
        Ok(keys) if keys.is_empty() => Ok(HashMap::new()),
        Ok(keys) => {
            let values = get_many(keys.clone()).await?;
            pair_entries(keys, values, policy)
        }
        Err(StoreError::IncompleteScan { keys, source }) if !keys.is_empty() => {
            match get_many(keys.clone()).await {
                Ok(values) => {
                    let entries = pair_entries(keys, values, MissingKeyPolicy::Omit)?;
                    Err(StoreError::PartialEntries { entries, source })
                }
                Err(_) => Err(StoreError::IncompleteScan { keys, source }),
            }
        }
        Err(err) => Err(err),
    }
}
