//! 统一错误处理
//!
//! 所有错误都限定在产生它的单个查询内，由 `QueryEngine` 写入该查询的响应槽位，
//! 不会影响同一批次中的其他查询。
//!
//! - `DataSourceError` 是内部错误类型，携带完整上下文
//! - `ErrorCode` / `PublicError` 是对外的稳定错误码与消息

use thiserror::Error;

pub mod codes;

pub use codes::{ErrorCode, PublicError, ToPublicError};

use crate::core::types::StatementStatus;

/// 语句提交错误
///
/// `InvalidSql` 永远不会重试；`ServiceUnavailable` 可在提交阶段有限次重试。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubmissionError {
    #[error("invalid SQL: {0}")]
    InvalidSql(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// 数据源错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataSourceError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error("failed to poll statement status: {0}")]
    Poll(String),

    #[error("statement {statement_id} {status}: {reason}")]
    StatementFailure {
        statement_id: String,
        status: StatementStatus,
        reason: String,
    },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("failed to fetch statement result: {0}")]
    Fetch(String),

    #[error("unsupported column type: {0}")]
    UnsupportedType(String),

    #[error("failed to convert result value: {0}")]
    Materialization(String),

    #[error("malformed query: {0}")]
    MalformedQuery(String),

    #[error("query cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

/// 统一的结果类型
pub type DataSourceResult<T> = Result<T, DataSourceError>;

impl DataSourceError {
    /// 传输层的瞬时错误，可以在原调用点重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DataSourceError::Submission(SubmissionError::ServiceUnavailable(_))
                | DataSourceError::Poll(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DataSourceError::Cancelled)
    }
}

impl ToPublicError for DataSourceError {
    fn to_error_code(&self) -> ErrorCode {
        match self {
            DataSourceError::Config(_) => ErrorCode::ConfigError,
            DataSourceError::Auth(_) => ErrorCode::Unauthorized,
            DataSourceError::Submission(SubmissionError::InvalidSql(_)) => ErrorCode::InvalidSql,
            DataSourceError::Submission(SubmissionError::ServiceUnavailable(_)) => {
                ErrorCode::ServiceUnavailable
            }
            DataSourceError::Poll(_) => ErrorCode::PollFailed,
            DataSourceError::StatementFailure { .. } => ErrorCode::StatementFailed,
            DataSourceError::Timeout(_) => ErrorCode::Timeout,
            DataSourceError::Fetch(_) => ErrorCode::FetchFailed,
            DataSourceError::UnsupportedType(_) => ErrorCode::UnsupportedType,
            DataSourceError::Materialization(_) => ErrorCode::ConversionError,
            DataSourceError::MalformedQuery(_) => ErrorCode::MalformedQuery,
            DataSourceError::Cancelled => ErrorCode::Cancelled,
            DataSourceError::Internal(_) => ErrorCode::InternalError,
        }
    }

    fn to_public_message(&self) -> String {
        match self {
            // 内部错误不暴露细节
            DataSourceError::Internal(_) => ErrorCode::InternalError.default_message().to_string(),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_error_conversion() {
        let err: DataSourceError = SubmissionError::InvalidSql("syntax error at or near \"selec\"".into()).into();
        assert!(matches!(err, DataSourceError::Submission(SubmissionError::InvalidSql(_))));
        assert_eq!(err.to_string(), "invalid SQL: syntax error at or near \"selec\"");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_statement_failure_keeps_reason_verbatim() {
        let err = DataSourceError::StatementFailure {
            statement_id: "st-1".into(),
            status: StatementStatus::Failed,
            reason: "ERROR: relation \"nope\" does not exist".into(),
        };
        assert_eq!(
            err.to_string(),
            "statement st-1 failed: ERROR: relation \"nope\" does not exist"
        );
        assert_eq!(err.to_error_code(), ErrorCode::StatementFailed);
    }

    #[test]
    fn test_internal_error_is_masked() {
        let err = DataSourceError::Internal("task panicked at src/foo.rs".into());
        let public = err.to_public_error();
        assert_eq!(public.code, ErrorCode::InternalError);
        assert_eq!(public.message, "internal error");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(DataSourceError::Poll("connection reset".into()).is_retryable());
        assert!(DataSourceError::from(SubmissionError::ServiceUnavailable("throttled".into())).is_retryable());
        assert!(!DataSourceError::Timeout("x".into()).is_retryable());
        assert!(DataSourceError::Cancelled.is_cancelled());
    }
}
