//! 自定义断言辅助模块
//!
//! 提供测试中的常用断言函数

use redshift_datasource::core::error::ErrorCode;
use redshift_datasource::core::{DataSourceError, Frame, QueryDataResponse, QueryResponse};

/// 断言结果成功，返回内部值
pub fn assert_ok<T, E: std::fmt::Debug>(result: Result<T, E>) -> T {
    result.expect("operation should succeed")
}

/// 断言批次中存在指定查询的响应并返回
pub fn response<'a>(batch: &'a QueryDataResponse, ref_id: &str) -> &'a QueryResponse {
    batch
        .get(ref_id)
        .unwrap_or_else(|| panic!("missing response for query {}", ref_id))
}

/// 断言查询成功，返回其帧
pub fn assert_frames<'a>(batch: &'a QueryDataResponse, ref_id: &str) -> &'a [Frame] {
    let response = response(batch, ref_id);
    assert!(
        response.error.is_none(),
        "query {} should succeed, got {:?}",
        ref_id,
        response.error
    );
    &response.frames
}

/// 断言查询失败且没有帧，返回错误
pub fn assert_failed<'a>(batch: &'a QueryDataResponse, ref_id: &str) -> &'a DataSourceError {
    let response = response(batch, ref_id);
    assert!(response.frames.is_empty(), "failed query {} must not carry frames", ref_id);
    response
        .error
        .as_ref()
        .unwrap_or_else(|| panic!("query {} should fail", ref_id))
}

/// 断言对外错误码
pub fn assert_error_code(batch: &QueryDataResponse, ref_id: &str, expected: ErrorCode) {
    assert_failed(batch, ref_id);
    let public = response(batch, ref_id)
        .public_error()
        .expect("public error");
    assert_eq!(public.code, expected, "unexpected error for query {}: {}", ref_id, public);
}
