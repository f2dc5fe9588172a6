//! 重试机制
//!
//! 提供可配置的重试策略和指数退避算法；所有等待都可以被取消。

use std::future::Future;
use std::time::Duration;

use log::warn;
use tokio_util::sync::CancellationToken;

use crate::core::error::{DataSourceError, DataSourceResult};
use crate::utils::cancel::sleep_or_cancel;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay_ms: u64) -> Self {
        self.initial_delay_ms = delay_ms;
        self
    }

    pub fn with_max_delay(mut self, delay_ms: u64) -> Self {
        self.max_delay_ms = delay_ms;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.backoff_multiplier,
        )
    }
}

/// 指数退避序列，间隔封顶于 `max`
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    max: Duration,
    multiplier: f64,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            current: initial.min(max),
            max,
            multiplier,
        }
    }

    /// 返回本次等待时长，并推进到下一次
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max)
            .min(self.max);
        delay
    }
}

/// 带退避的异步重试
///
/// 只重试 `is_retryable()` 的错误；`operation` 收到从 1 开始的尝试序号。
/// 取消会中断退避等待并返回 `Cancelled`。
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> DataSourceResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = DataSourceResult<T>>,
{
    let mut backoff = config.backoff();
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(DataSourceError::Cancelled);
        }
        attempt += 1;

        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if e.is_cancelled() || !e.is_retryable() {
                    return Err(e);
                }
                if attempt >= config.max_attempts {
                    return Err(e);
                }

                let delay = backoff.next_delay();
                warn!(
                    "第 {}/{} 次尝试失败: {}，{:?} 后重试",
                    attempt, config.max_attempts, e, delay
                );
                if !sleep_or_cancel(delay, cancel).await {
                    return Err(DataSourceError::Cancelled);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::SubmissionError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unavailable() -> DataSourceError {
        SubmissionError::ServiceUnavailable("throttled".to_string()).into()
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay_ms, 100);
        assert_eq!(config.max_delay_ms, 5000);
        assert_eq!(config.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_retry_config_builder() {
        let config = RetryConfig::new()
            .with_max_attempts(5)
            .with_initial_delay(50)
            .with_max_delay(2000)
            .with_backoff_multiplier(1.5);

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay_ms, 50);
        assert_eq!(config.max_delay_ms, 2000);
        assert_eq!(config.backoff_multiplier, 1.5);
    }

    #[test]
    fn test_backoff_is_capped() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(500), 2.0);
        let delays: Vec<_> = (0..5).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_backoff_success() {
        let config = RetryConfig::new().with_max_attempts(3).with_initial_delay(10);
        let count = &AtomicU32::new(0);

        let result = retry_with_backoff(&config, &CancellationToken::new(), move |_| async move {
            if count.fetch_add(1, Ordering::SeqCst) < 1 {
                Err(unavailable())
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_with_backoff_max_attempts() {
        let config = RetryConfig::new().with_max_attempts(3).with_initial_delay(10);
        let count = &AtomicU32::new(0);

        let result: DataSourceResult<()> =
            retry_with_backoff(&config, &CancellationToken::new(), move |_| async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err(unavailable())
            })
            .await;

        assert_eq!(result, Err(unavailable()));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_non_retryable_error() {
        let config = RetryConfig::new().with_max_attempts(3).with_initial_delay(10);
        let count = &AtomicU32::new(0);

        let result: DataSourceResult<()> =
            retry_with_backoff(&config, &CancellationToken::new(), move |_| async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err(SubmissionError::InvalidSql("syntax error".to_string()).into())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let config = RetryConfig::new().with_max_attempts(10).with_initial_delay(60_000);
        let cancel = CancellationToken::new();
        let count = &AtomicU32::new(0);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result: DataSourceResult<()> = retry_with_backoff(&config, &cancel, move |_| async move {
            count.fetch_add(1, Ordering::SeqCst);
            Err(unavailable())
        })
        .await;

        assert_eq!(result, Err(DataSourceError::Cancelled));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
