//! 语句状态轮询
//!
//! 状态机：Submitted → Running → {Finished | Failed | Aborted}。
//! 每次轮询前先等待，间隔按倍数增长并封顶；终止条件为终态、取消、
//! 总时长预算或轮询次数预算耗尽。

use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::error::ApiError;
use crate::client::ClientHandle;
use crate::config::EngineConfig;
use crate::core::error::{DataSourceError, DataSourceResult};
use crate::core::types::{Statement, StatementStatus};
use crate::utils::{guarded_call, sleep_or_cancel, Backoff, CallError};

const NO_REASON: &str = "no reason reported";

#[derive(Debug, Clone)]
pub struct StatementPoller {
    initial_interval: Duration,
    max_interval: Duration,
    backoff_multiplier: f64,
    max_poll_attempts: u32,
    max_wait: Duration,
    max_poll_errors: u32,
    request_timeout: Duration,
}

impl StatementPoller {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            initial_interval: config.initial_poll_interval(),
            max_interval: config.max_poll_interval(),
            backoff_multiplier: config.backoff_multiplier,
            max_poll_attempts: config.max_poll_attempts,
            max_wait: config.max_wait(),
            max_poll_errors: config.max_poll_errors,
            request_timeout: config.request_timeout(),
        }
    }

    /// 轮询直到语句进入终态
    ///
    /// 只有 Finished 返回 `Ok`；Failed/Aborted 原样携带数仓给出的原因。
    /// 发出的 describe 调用不超过 `max_poll_attempts` 次。
    pub async fn wait(
        &self,
        client: &ClientHandle,
        mut statement: Statement,
        cancel: &CancellationToken,
    ) -> DataSourceResult<Statement> {
        let deadline = Instant::now() + self.max_wait;
        let mut backoff = Backoff::new(self.initial_interval, self.max_interval, self.backoff_multiplier);
        let mut attempts = 0u32;
        let mut consecutive_errors = 0u32;

        loop {
            let now = Instant::now();
            if now >= deadline || attempts >= self.max_poll_attempts {
                return Err(self.time_out(client, &statement, attempts, cancel).await);
            }

            let delay = backoff.next_delay().min(deadline - now);
            if !sleep_or_cancel(delay, cancel).await {
                return Err(DataSourceError::Cancelled);
            }

            attempts += 1;
            let described = guarded_call(
                cancel,
                self.request_timeout,
                client.api().describe_statement(&statement.id),
            )
            .await;

            match described {
                Ok(description) => {
                    consecutive_errors = 0;
                    if description.status != statement.status {
                        debug!(
                            "查询 {} 的语句 {}: {} -> {}",
                            statement.query_ref_id, statement.id, statement.status, description.status
                        );
                    }
                    statement.status = description.status;
                    statement.has_result_set = description.has_result_set;

                    match description.status {
                        StatementStatus::Finished => {
                            info!(
                                "查询 {} 的语句 {} 在 {} 次轮询后完成",
                                statement.query_ref_id, statement.id, attempts
                            );
                            return Ok(statement);
                        }
                        StatementStatus::Failed | StatementStatus::Aborted => {
                            let reason = description.error.unwrap_or_else(|| NO_REASON.to_string());
                            warn!(
                                "查询 {} 的语句 {} {}: {}",
                                statement.query_ref_id, statement.id, description.status, reason
                            );
                            return Err(DataSourceError::StatementFailure {
                                statement_id: statement.id,
                                status: description.status,
                                reason,
                            });
                        }
                        StatementStatus::Submitted | StatementStatus::Running => {}
                    }
                }
                Err(CallError::Cancelled) => return Err(DataSourceError::Cancelled),
                Err(CallError::Api(ApiError::Auth(message))) => {
                    return Err(DataSourceError::Auth(message));
                }
                Err(CallError::Api(error)) if error.is_transient() => {
                    consecutive_errors += 1;
                    if consecutive_errors > self.max_poll_errors {
                        return Err(DataSourceError::Poll(format!(
                            "statement {}: {} consecutive errors, last: {}",
                            statement.id, consecutive_errors, error
                        )));
                    }
                    warn!(
                        "轮询语句 {} 出现瞬时错误 ({}/{}): {}",
                        statement.id, consecutive_errors, self.max_poll_errors, error
                    );
                }
                Err(CallError::Api(error)) => {
                    return Err(DataSourceError::Poll(format!("statement {}: {}", statement.id, error)));
                }
            }
        }
    }

    /// 预算耗尽：尽力取消远端语句，忽略取消结果
    async fn time_out(
        &self,
        client: &ClientHandle,
        statement: &Statement,
        attempts: u32,
        cancel: &CancellationToken,
    ) -> DataSourceError {
        warn!(
            "查询 {} 的语句 {} 轮询 {} 次后仍为 {}，发起取消",
            statement.query_ref_id, statement.id, attempts, statement.status
        );
        let cancelled = guarded_call(
            cancel,
            self.request_timeout,
            client.api().cancel_statement(&statement.id),
        )
        .await;
        if let Err(e) = cancelled {
            debug!("取消语句 {} 失败: {:?}", statement.id, e);
        }
        DataSourceError::Timeout(format!(
            "statement {} did not finish after {} polls",
            statement.id, attempts
        ))
    }
}
