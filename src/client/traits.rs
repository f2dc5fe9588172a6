//! 数仓 API 抽象
//!
//! 三类调用：提交语句、查询语句状态、分页获取结果；另有取消语句。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::client::cache::ClientScope;
use crate::client::error::ApiResult;
use crate::config::{CredentialSource, DataSourceSettings, DatabaseContext, ExecutionTarget};
use crate::core::error::DataSourceResult;
use crate::core::types::{ResultPage, StatementDescription};

/// ExecuteStatement 请求参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteStatementRequest {
    pub sql: String,
    pub database: String,
    pub cluster_identifier: Option<String>,
    pub workgroup_name: Option<String>,
    pub db_user: Option<String>,
    pub secret_arn: Option<String>,
    pub statement_name: Option<String>,
}

impl ExecuteStatementRequest {
    pub fn new(sql: &str, context: &DatabaseContext) -> Self {
        let (cluster_identifier, workgroup_name, db_user) = match &context.target {
            ExecutionTarget::Cluster {
                cluster_identifier,
                db_user,
            } => (Some(cluster_identifier.clone()), None, db_user.clone()),
            ExecutionTarget::Workgroup { workgroup_name } => {
                (None, Some(workgroup_name.clone()), None)
            }
        };
        Self {
            sql: sql.to_string(),
            database: context.database.clone(),
            cluster_identifier,
            workgroup_name,
            db_user,
            secret_arn: context.secret_arn.clone(),
            statement_name: None,
        }
    }

    pub fn with_statement_name(mut self, name: impl Into<String>) -> Self {
        self.statement_name = Some(name.into());
        self
    }
}

/// ExecuteStatement 的返回
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteStatementOutput {
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// 数仓查询 API
///
/// 实现必须是无状态或内部只读的，同一个实例会被多个并发查询共享。
#[async_trait]
pub trait WarehouseApi: Send + Sync + std::fmt::Debug {
    async fn execute_statement(
        &self,
        request: &ExecuteStatementRequest,
    ) -> ApiResult<ExecuteStatementOutput>;

    async fn describe_statement(&self, statement_id: &str) -> ApiResult<StatementDescription>;

    async fn get_statement_result(
        &self,
        statement_id: &str,
        next_token: Option<&str>,
    ) -> ApiResult<ResultPage>;

    /// 请求取消仍在执行的语句，返回服务端是否接受
    async fn cancel_statement(&self, statement_id: &str) -> ApiResult<bool>;
}

/// 按作用域创建 API 客户端
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn create(
        &self,
        scope: &ClientScope,
        settings: &DataSourceSettings,
        credentials: CredentialSource,
    ) -> DataSourceResult<Arc<dyn WarehouseApi>>;
}
