//! 数仓 API 传输层错误
//!
//! 这一层只描述出站调用失败的性质，由各阶段（提交、轮询、拉取）映射到
//! `DataSourceError` 的具体种类。

use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// 请求被服务端校验拒绝，例如 SQL 语法错误
    #[error("{0}")]
    Validation(String),

    /// 网络错误、限流或服务端 5xx
    #[error("{0}")]
    Unavailable(String),

    /// 凭证无效或无权限
    #[error("{0}")]
    Auth(String),

    /// 语句或资源不存在
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// 是否为可重试的瞬时错误
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Unavailable(_))
    }
}
