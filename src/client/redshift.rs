//! Redshift Data API 客户端
//!
//! 基于 `aws-sdk-redshiftdata`。凭证、签名与传输由 SDK 负责；SDK 自带的重试关闭，
//! 重试统一由提交与轮询阶段的策略控制。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::provider::ProvideCredentials;
use aws_sdk_redshiftdata::config::http::HttpResponse;
use aws_sdk_redshiftdata::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_redshiftdata::operation::cancel_statement::CancelStatementError;
use aws_sdk_redshiftdata::operation::describe_statement::DescribeStatementError;
use aws_sdk_redshiftdata::operation::execute_statement::ExecuteStatementError;
use aws_sdk_redshiftdata::operation::get_statement_result::GetStatementResultError;
use aws_sdk_redshiftdata::types::{ColumnMetadata, Field};
use chrono::DateTime;
use log::debug;

use crate::client::cache::ClientScope;
use crate::client::error::{ApiError, ApiResult};
use crate::client::traits::{
    ClientFactory, ExecuteStatementOutput, ExecuteStatementRequest, WarehouseApi,
};
use crate::config::{CredentialSource, DataSourceSettings};
use crate::core::error::{DataSourceError, DataSourceResult};
use crate::core::types::{
    CellValue, ColumnDescriptor, ResultPage, StatementDescription, StatementStatus,
};

/// 按作用域创建的 Data API 客户端
#[derive(Debug, Clone)]
pub struct RedshiftDataClient {
    inner: aws_sdk_redshiftdata::Client,
}

impl RedshiftDataClient {
    pub fn new(inner: aws_sdk_redshiftdata::Client) -> Self {
        Self { inner }
    }
}

/// 服务端建模错误到 `ApiError` 构造器的映射
type Classifier<E> = fn(&E) -> Option<fn(String) -> ApiError>;

fn classify_execute(error: &ExecuteStatementError) -> Option<fn(String) -> ApiError> {
    match error {
        ExecuteStatementError::ValidationException(_) => Some(ApiError::Validation),
        ExecuteStatementError::ExecuteStatementException(_)
        | ExecuteStatementError::ActiveStatementsExceededException(_) => {
            Some(ApiError::Unavailable)
        }
        _ => None,
    }
}

fn classify_describe(error: &DescribeStatementError) -> Option<fn(String) -> ApiError> {
    match error {
        DescribeStatementError::ValidationException(_) => Some(ApiError::Validation),
        DescribeStatementError::ResourceNotFoundException(_) => Some(ApiError::NotFound),
        DescribeStatementError::InternalServerException(_) => Some(ApiError::Unavailable),
        _ => None,
    }
}

fn classify_result(error: &GetStatementResultError) -> Option<fn(String) -> ApiError> {
    match error {
        GetStatementResultError::ValidationException(_) => Some(ApiError::Validation),
        GetStatementResultError::ResourceNotFoundException(_) => Some(ApiError::NotFound),
        GetStatementResultError::InternalServerException(_) => Some(ApiError::Unavailable),
        _ => None,
    }
}

fn classify_cancel(error: &CancelStatementError) -> Option<fn(String) -> ApiError> {
    match error {
        CancelStatementError::ValidationException(_) => Some(ApiError::Validation),
        CancelStatementError::ResourceNotFoundException(_) => Some(ApiError::NotFound),
        CancelStatementError::InternalServerException(_)
        | CancelStatementError::DatabaseConnectionException(_) => Some(ApiError::Unavailable),
        _ => None,
    }
}

/// 将 SDK 错误映射为 `ApiError`
///
/// 建模错误按类型分类；未建模的错误（签名、限流等）按错误码与 HTTP 状态分类；
/// 超时与连接失败视为服务暂不可用。
fn map_sdk_error<E>(
    operation: &str,
    error: SdkError<E, HttpResponse>,
    classify: Classifier<E>,
) -> ApiError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let detail = DisplayErrorContext(&error).to_string();
    let mapped = match error {
        SdkError::ServiceError(context) => {
            let status = context.raw().status().as_u16();
            let err = context.into_err();
            let message = err
                .message()
                .filter(|m| !m.is_empty())
                .or(err.code())
                .map(str::to_string)
                .unwrap_or_else(|| detail.clone());
            match classify(&err) {
                Some(kind) => kind(message),
                None => classify_code(err.code(), status, message),
            }
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            ApiError::Unavailable(detail.clone())
        }
        _ => ApiError::Other(detail.clone()),
    };
    debug!("{} 调用失败: {}", operation, detail);
    mapped
}

/// 按错误码与 HTTP 状态对未建模的服务端错误分类
fn classify_code(code: Option<&str>, status: u16, message: String) -> ApiError {
    match code.unwrap_or_default() {
        "UnrecognizedClientException"
        | "InvalidSignatureException"
        | "AccessDeniedException"
        | "ExpiredTokenException"
        | "MissingAuthenticationTokenException" => ApiError::Auth(message),
        "ThrottlingException" | "ServiceUnavailableException" => ApiError::Unavailable(message),
        _ if status == 401 || status == 403 => ApiError::Auth(message),
        _ if status >= 500 || status == 429 => ApiError::Unavailable(message),
        _ => ApiError::Other(message),
    }
}

fn map_status(status: &str) -> ApiResult<StatementStatus> {
    match status {
        "SUBMITTED" => Ok(StatementStatus::Submitted),
        "PICKED" | "STARTED" => Ok(StatementStatus::Running),
        "FINISHED" => Ok(StatementStatus::Finished),
        "FAILED" => Ok(StatementStatus::Failed),
        "ABORTED" => Ok(StatementStatus::Aborted),
        other => Err(ApiError::Other(format!("unknown statement status '{}'", other))),
    }
}

/// 兼容 SDK 中必填（值）与可选（`Option`）两种字段形态
fn present<T>(value: impl Into<Option<T>>) -> Option<T> {
    value.into()
}

fn cell_value(field: Field) -> CellValue {
    match field {
        Field::LongValue(v) => CellValue::Long(v),
        Field::DoubleValue(v) => CellValue::Double(v),
        Field::BooleanValue(v) => CellValue::Boolean(v),
        Field::StringValue(v) => CellValue::String(v),
        Field::BlobValue(blob) => {
            CellValue::String(String::from_utf8_lossy(&blob.into_inner()).into_owned())
        }
        _ => CellValue::Null,
    }
}

fn column(metadata: ColumnMetadata) -> ColumnDescriptor {
    ColumnDescriptor::new(
        metadata.name.unwrap_or_default(),
        metadata.type_name.unwrap_or_default(),
    )
}

#[async_trait]
impl WarehouseApi for RedshiftDataClient {
    async fn execute_statement(
        &self,
        request: &ExecuteStatementRequest,
    ) -> ApiResult<ExecuteStatementOutput> {
        let output = self
            .inner
            .execute_statement()
            .sql(&request.sql)
            .database(&request.database)
            .set_cluster_identifier(request.cluster_identifier.clone())
            .set_workgroup_name(request.workgroup_name.clone())
            .set_db_user(request.db_user.clone())
            .set_secret_arn(request.secret_arn.clone())
            .set_statement_name(request.statement_name.clone())
            .send()
            .await
            .map_err(|e| map_sdk_error("ExecuteStatement", e, classify_execute))?;

        let id = present::<&str>(output.id())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::Other("ExecuteStatement returned no statement id".to_string()))?;
        Ok(ExecuteStatementOutput {
            id: id.to_string(),
            created_at: present::<&aws_sdk_redshiftdata::primitives::DateTime>(output.created_at())
                .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
        })
    }

    async fn describe_statement(&self, statement_id: &str) -> ApiResult<StatementDescription> {
        let output = self
            .inner
            .describe_statement()
            .id(statement_id)
            .send()
            .await
            .map_err(|e| map_sdk_error("DescribeStatement", e, classify_describe))?;

        let status = output
            .status()
            .map(|s| s.as_str())
            .ok_or_else(|| ApiError::Other("DescribeStatement returned no status".to_string()))?;
        Ok(StatementDescription {
            status: map_status(status)?,
            error: output.error().filter(|e| !e.is_empty()).map(str::to_string),
            has_result_set: present::<bool>(output.has_result_set()).unwrap_or(false),
        })
    }

    async fn get_statement_result(
        &self,
        statement_id: &str,
        next_token: Option<&str>,
    ) -> ApiResult<ResultPage> {
        let output = self
            .inner
            .get_statement_result()
            .id(statement_id)
            .set_next_token(next_token.map(str::to_string))
            .send()
            .await
            .map_err(|e| map_sdk_error("GetStatementResult", e, classify_result))?;

        Ok(ResultPage {
            statement_id: statement_id.to_string(),
            columns: output
                .column_metadata
                .unwrap_or_default()
                .into_iter()
                .map(column)
                .collect(),
            records: output
                .records
                .into_iter()
                .map(|row| row.into_iter().map(cell_value).collect())
                .collect(),
            next_token: output.next_token.filter(|t| !t.is_empty()),
        })
    }

    async fn cancel_statement(&self, statement_id: &str) -> ApiResult<bool> {
        let output = self
            .inner
            .cancel_statement()
            .id(statement_id)
            .send()
            .await
            .map_err(|e| map_sdk_error("CancelStatement", e, classify_cancel))?;
        Ok(present::<bool>(output.status()).unwrap_or(false))
    }
}

/// 创建 Redshift Data API 客户端的工厂
#[derive(Debug, Clone)]
pub struct RedshiftClientFactory {
    request_timeout: Duration,
}

impl RedshiftClientFactory {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }

    async fn load_config(
        &self,
        scope: &ClientScope,
        settings: &DataSourceSettings,
        credentials: CredentialSource,
    ) -> aws_config::SdkConfig {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(scope.region.clone()))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(self.request_timeout)
                    .build(),
            )
            .retry_config(RetryConfig::disabled());
        if let Some(endpoint) = settings.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            loader = loader.endpoint_url(endpoint);
        }
        if let CredentialSource::Static(credentials) = credentials {
            loader = loader.credentials_provider(credentials);
        }
        loader.load().await
    }
}

#[async_trait]
impl ClientFactory for RedshiftClientFactory {
    async fn create(
        &self,
        scope: &ClientScope,
        settings: &DataSourceSettings,
        credentials: CredentialSource,
    ) -> DataSourceResult<Arc<dyn WarehouseApi>> {
        let sdk_config = self.load_config(scope, settings, credentials).await;

        // 凭证在创建时解析一次，凭证链不可用时立即失败而不是等到第一次调用
        let provider = sdk_config.credentials_provider().ok_or_else(|| {
            DataSourceError::Auth("no AWS credentials provider is available".to_string())
        })?;
        provider.provide_credentials().await.map_err(|e| {
            DataSourceError::Auth(format!(
                "failed to load AWS credentials: {}",
                DisplayErrorContext(&e)
            ))
        })?;

        debug!("已为 {} 创建 Redshift Data API 客户端", scope.region);
        Ok(Arc::new(RedshiftDataClient::new(
            aws_sdk_redshiftdata::Client::new(&sdk_config),
        )))
    }
}
