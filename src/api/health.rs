//! 健康检查：通过同一条执行管线运行金丝雀语句

use std::fmt;
use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::api::instance::{InstanceManager, PluginContext};
use crate::api::pipeline::StatementPipeline;
use crate::core::error::DataSourceResult;
use crate::core::frame::Frame;

const HEALTH_REF_ID: &str = "health-check";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Error,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Ok => f.write_str("ok"),
            HealthStatus::Degraded => f.write_str("degraded"),
            HealthStatus::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheckResult {
    pub status: HealthStatus,
    pub message: String,
}

impl HealthCheckResult {
    fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HealthChecker {
    instances: Arc<InstanceManager>,
    pipeline: Arc<StatementPipeline>,
    canary_sql: String,
}

impl HealthChecker {
    pub fn new(
        instances: Arc<InstanceManager>,
        pipeline: Arc<StatementPipeline>,
        canary_sql: String,
    ) -> Self {
        Self {
            instances,
            pipeline,
            canary_sql,
        }
    }

    /// 任何失败都报告为 `Error`；成功但没有返回行报告为 `Degraded`
    pub async fn check(&self, context: &PluginContext, cancel: &CancellationToken) -> HealthCheckResult {
        let result = match self.run_canary(context, cancel).await {
            Ok(frames) if frames.iter().any(|frame| frame.row_count() > 0) => {
                HealthCheckResult::new(HealthStatus::Ok, "Data source is working")
            }
            Ok(_) => HealthCheckResult::new(
                HealthStatus::Degraded,
                "Connected, but the health check statement returned no rows",
            ),
            Err(e) => HealthCheckResult::new(HealthStatus::Error, e.to_string()),
        };

        match result.status {
            HealthStatus::Ok => info!("数据源 {} 健康检查: {}", context.datasource_uid, result.status),
            _ => warn!(
                "数据源 {} 健康检查: {} ({})",
                context.datasource_uid, result.status, result.message
            ),
        }
        result
    }

    async fn run_canary(
        &self,
        context: &PluginContext,
        cancel: &CancellationToken,
    ) -> DataSourceResult<Vec<Frame>> {
        let instance = self.instances.get(context)?;
        self.pipeline
            .execute(&instance, &self.canary_sql, HEALTH_REF_ID, cancel)
            .await
    }
}
