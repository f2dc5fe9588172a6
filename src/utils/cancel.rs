//! 可取消的等待与出站调用
//!
//! 取消令牌在批次级别共享；每次等待与每次出站调用都与令牌竞争。

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::client::error::{ApiError, ApiResult};

/// 受保护调用的失败原因
#[derive(Debug, Clone, PartialEq)]
pub enum CallError {
    Cancelled,
    Api(ApiError),
}

/// 等待给定时长；返回 `false` 表示等待期间被取消
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

/// 在取消令牌与单次超时的约束下执行一次出站调用
///
/// 令牌已取消时不会轮询 `call`，因此不会发出请求。超时按瞬时的服务不可用处理。
pub async fn guarded_call<T, F>(
    cancel: &CancellationToken,
    timeout: Duration,
    call: F,
) -> Result<T, CallError>
where
    F: Future<Output = ApiResult<T>>,
{
    if cancel.is_cancelled() {
        return Err(CallError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CallError::Cancelled),
        result = tokio::time::timeout(timeout, call) => match result {
            Ok(result) => result.map_err(CallError::Api),
            Err(_) => Err(CallError::Api(ApiError::Unavailable(format!(
                "request timed out after {:?}",
                timeout
            )))),
        },
    }
}
