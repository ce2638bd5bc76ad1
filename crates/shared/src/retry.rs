//! 重试
//!
//! 存储层只报告故障，不自行重试。上层按 [`RetryPolicy`] 重放整个逻辑操作，
//! 错误类型通过 [`Retryable`] 声明哪些故障是瞬时的。

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// 可区分瞬时故障的错误
pub trait Retryable {
    /// 同样的调用稍后重放是否可能成功
    fn is_retryable(&self) -> bool;
}

/// 指数退避策略
///
/// 第 N 次重试前等待 `initial_delay * multiplier^N`，不超过 `max_delay`。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 首次执行之外最多重放的次数
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 只执行一次
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// 本策略允许的全部等待时间，依次对应每一次重放
    pub fn backoff(&self) -> Backoff {
        Backoff {
            next: self.initial_delay,
            max: self.max_delay,
            multiplier: self.multiplier,
            remaining: self.max_retries,
        }
    }
}

/// 退避序列，耗尽即放弃
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
    remaining: u32,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let delay = self.next.min(self.max);
        self.next = Duration::try_from_secs_f64(self.next.as_secs_f64() * self.multiplier)
            .map_or(self.max, |d| d.min(self.max));
        Some(delay)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for Backoff {}

/// 执行 `operation`，瞬时故障时按策略退避后重放
///
/// 不可重试的错误和退避耗尽后的最后一个错误原样返回。
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut backoff = policy.backoff();
    let mut replays = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if replays > 0 {
                    debug!(operation = operation_name, replays, "succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => err,
        };

        let Some(delay) = backoff.next() else {
            warn!(operation = operation_name, replays, error = %err, "retries exhausted");
            return Err(err);
        };

        warn!(
            operation = operation_name,
            replays,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient failure, backing off"
        );
        tokio::time::sleep(delay).await;
        replays += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum StorageError {
        Unavailable,
        Rejected,
    }

    impl Display for StorageError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::Unavailable => f.write_str("backend unavailable"),
                Self::Rejected => f.write_str("request rejected"),
            }
        }
    }

    impl Retryable for StorageError {
        fn is_retryable(&self) -> bool {
            matches!(self, Self::Unavailable)
        }
    }

    /// 前 `failures` 次调用返回 `error`，之后成功
    fn flaky(
        calls: Arc<AtomicU32>,
        failures: u32,
        error: fn() -> StorageError,
    ) -> impl FnMut() -> futures::future::Ready<Result<&'static str, StorageError>> {
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(if n < failures { Err(error()) } else { Ok("stored") })
        }
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        };

        let delays: Vec<u64> = policy.backoff().map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 5, 5]);
        assert_eq!(RetryPolicy::none().backoff().count(), 0);
        assert_eq!(RetryPolicy::default().with_max_retries(2).backoff().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replays_until_success_with_default_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let result = retry_with_policy(
            &RetryPolicy::default(),
            "insert",
            flaky(calls.clone(), 2, || StorageError::Unavailable),
        )
        .await;

        assert_eq!(result, Ok("stored"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms + 200ms
        assert_eq!(started.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_is_returned_without_replay() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let result = retry_with_policy(
            &RetryPolicy::default(),
            "insert",
            flaky(calls.clone(), u32::MAX, || StorageError::Rejected),
        )
        .await;

        assert_eq!(result, Err(StorageError::Rejected));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_with_last_error() {
        let calls = Arc::new(AtomicU32::new(0));

        let result = retry_with_policy(
            &RetryPolicy::default().with_max_retries(2),
            "expire",
            flaky(calls.clone(), u32::MAX, || StorageError::Unavailable),
        )
        .await;

        assert_eq!(result, Err(StorageError::Unavailable));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
