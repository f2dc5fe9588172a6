//! 语句提交

use std::time::Duration;

use chrono::Utc;
use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::client::error::ApiError;
use crate::client::{ClientHandle, ExecuteStatementRequest};
use crate::config::{DatabaseContext, EngineConfig};
use crate::core::error::{DataSourceError, DataSourceResult, SubmissionError};
use crate::core::types::Statement;
use crate::utils::{guarded_call, retry_with_backoff, CallError, RetryConfig};

/// 向数仓提交 SQL 语句
///
/// 每次尝试只发出一次 ExecuteStatement 调用。非法 SQL 不重试，
/// 服务不可用时按 `submit_retries` 有限次退避重试。
#[derive(Debug, Clone)]
pub struct StatementExecutor {
    retry: RetryConfig,
    request_timeout: Duration,
}

impl StatementExecutor {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            retry: RetryConfig::new()
                .with_max_attempts(config.submit_retries.saturating_add(1))
                .with_initial_delay(config.initial_poll_interval_ms)
                .with_max_delay(config.max_poll_interval_ms)
                .with_backoff_multiplier(config.backoff_multiplier),
            request_timeout: config.request_timeout(),
        }
    }

    pub async fn submit(
        &self,
        client: &ClientHandle,
        sql: &str,
        context: &DatabaseContext,
        query_ref_id: &str,
        cancel: &CancellationToken,
    ) -> DataSourceResult<Statement> {
        let request = &ExecuteStatementRequest::new(sql, context).with_statement_name(query_ref_id);
        let timeout = self.request_timeout;

        let output = retry_with_backoff(&self.retry, cancel, move |attempt| async move {
            debug!("提交查询 {} (第 {} 次)", query_ref_id, attempt);
            guarded_call(cancel, timeout, client.api().execute_statement(request))
                .await
                .map_err(submission_error)
        })
        .await?;

        info!("查询 {} 已提交为语句 {}", query_ref_id, output.id);
        Ok(Statement::submitted(
            output.id,
            query_ref_id,
            output.created_at.unwrap_or_else(Utc::now),
        ))
    }
}

fn submission_error(error: CallError) -> DataSourceError {
    match error {
        CallError::Cancelled => DataSourceError::Cancelled,
        CallError::Api(ApiError::Validation(message)) => SubmissionError::InvalidSql(message).into(),
        CallError::Api(ApiError::Auth(message)) => DataSourceError::Auth(message),
        CallError::Api(other) => SubmissionError::ServiceUnavailable(other.to_string()).into(),
    }
}
