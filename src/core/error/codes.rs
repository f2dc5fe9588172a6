//! 对外错误码定义
//!
//! 错误码用于查询响应中的结构化错误，保证宿主侧可以稳定地区分错误种类。
//!
//! 错误码格式: XXYY
//! - XX: 错误类别 (01=查询, 02=执行, 03=验证, 04=认证, 09=系统)
//! - YY: 具体错误

use serde::{Deserialize, Serialize};

/// 对外错误码
///
/// 错误码一旦定义不应随意修改，保证宿主侧兼容性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // ==================== 查询错误 (01xx) ====================
    /// 查询负载无法解析
    MalformedQuery = 101,
    /// SQL 被数仓拒绝
    InvalidSql = 102,

    // ==================== 执行错误 (02xx) ====================
    /// 语句在数仓侧失败或被中止
    StatementFailed = 200,
    /// 执行超时
    Timeout = 201,
    /// 调用方取消
    Cancelled = 202,
    /// 轮询失败
    PollFailed = 203,
    /// 结果拉取失败
    FetchFailed = 204,

    // ==================== 验证错误 (03xx) ====================
    /// 配置错误
    ConfigError = 300,
    /// 不支持的列类型
    UnsupportedType = 301,
    /// 单元格无法转换
    ConversionError = 302,

    // ==================== 认证错误 (04xx) ====================
    /// 凭证解析失败
    Unauthorized = 401,

    // ==================== 系统错误 (09xx) ====================
    /// 内部错误
    InternalError = 900,
    /// 服务不可用
    ServiceUnavailable = 901,
}

impl ErrorCode {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// 获取默认的错误消息
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::MalformedQuery => "malformed query",
            ErrorCode::InvalidSql => "invalid SQL",
            ErrorCode::StatementFailed => "statement failed",
            ErrorCode::Timeout => "timed out",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::PollFailed => "status polling failed",
            ErrorCode::FetchFailed => "result fetch failed",
            ErrorCode::ConfigError => "configuration error",
            ErrorCode::UnsupportedType => "unsupported column type",
            ErrorCode::ConversionError => "value conversion failed",
            ErrorCode::Unauthorized => "authentication failed",
            ErrorCode::InternalError => "internal error",
            ErrorCode::ServiceUnavailable => "service unavailable",
        }
    }
}

/// 对外错误信息 - 用于序列化到响应中
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicError {
    pub code: ErrorCode,
    pub message: String,
}

impl PublicError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PublicError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_i32(), self.message)
    }
}

/// 内部错误到对外错误的转换 trait
pub trait ToPublicError {
    fn to_public_error(&self) -> PublicError {
        PublicError::new(self.to_error_code(), self.to_public_message())
    }

    /// 获取对外错误码
    fn to_error_code(&self) -> ErrorCode;

    /// 获取对外错误消息（过滤敏感信息）
    fn to_public_message(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_values() {
        assert_eq!(ErrorCode::InvalidSql.as_i32(), 102);
        assert_eq!(ErrorCode::Unauthorized.as_i32(), 401);
        assert_eq!(ErrorCode::ServiceUnavailable.as_i32(), 901);
    }

    #[test]
    fn test_public_error_display() {
        let err = PublicError::new(ErrorCode::Timeout, ErrorCode::Timeout.default_message());
        assert_eq!(err.code, ErrorCode::Timeout);
        assert_eq!(err.to_string(), "[201] timed out");
    }
}
