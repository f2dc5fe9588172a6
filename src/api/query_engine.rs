//! 批量查询编排
//!
//! 每个查询在独立的 tokio 任务中执行，并发数受信号量限制。单个查询的失败只写入
//! 它自己的响应槽位；每个输入 ref id 恰好对应一个响应。

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::health::HealthChecker;
use crate::api::instance::{InstanceManager, PluginContext};
use crate::api::pipeline::StatementPipeline;
use crate::client::ClientFactory;
use crate::config::EngineConfig;
use crate::core::error::{DataSourceError, DataSourceResult};
use crate::core::frame::{Frame, FrameMeta};
use crate::core::types::{DataQuery, Query, QueryDataResponse, QueryResponse};
use crate::result::FRAME_NAME;

/// 宿主发来的批量查询请求
#[derive(Debug, Clone)]
pub struct QueryDataRequest {
    pub plugin_context: PluginContext,
    pub queries: Vec<DataQuery>,
}

#[derive(Debug, Clone)]
pub struct QueryEngine {
    instances: Arc<InstanceManager>,
    pipeline: Arc<StatementPipeline>,
    limiter: Arc<Semaphore>,
    health_check_sql: Arc<str>,
}

impl QueryEngine {
    pub fn new(config: &EngineConfig, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            instances: Arc::new(InstanceManager::new(factory)),
            pipeline: Arc::new(StatementPipeline::new(config)),
            limiter: Arc::new(Semaphore::new(config.max_concurrent_queries.max(1))),
            health_check_sql: Arc::from(config.health_check_sql.as_str()),
        }
    }

    pub fn instances(&self) -> &InstanceManager {
        &self.instances
    }

    pub async fn query_data(
        &self,
        request: QueryDataRequest,
        cancel: &CancellationToken,
    ) -> QueryDataResponse {
        self.run(request.queries, &request.plugin_context, cancel).await
    }

    /// 并发执行一个批次
    ///
    /// 取消后尚未完成的查询返回 `Cancelled`，已完成的保留结果。
    pub async fn run(
        &self,
        queries: Vec<DataQuery>,
        context: &PluginContext,
        cancel: &CancellationToken,
    ) -> QueryDataResponse {
        let batch_id = Uuid::new_v4();
        info!(
            "批次 {}: 为数据源 {} 执行 {} 个查询",
            batch_id,
            context.datasource_uid,
            queries.len()
        );

        let tasks = queries.into_iter().map(|query| {
            let engine = self.clone();
            let context = context.clone();
            let cancel = cancel.clone();
            let ref_id = query.ref_id.clone();
            let handle =
                tokio::spawn(async move { engine.run_query(query, &context, &cancel).await });
            async move { (ref_id, handle.await) }
        });

        let mut responses = HashMap::new();
        for (ref_id, joined) in futures::future::join_all(tasks).await {
            let response = match joined {
                Ok(response) => response,
                Err(e) => {
                    error!("批次 {}: 查询 {} 的任务异常退出: {}", batch_id, ref_id, e);
                    QueryResponse::with_error(DataSourceError::Internal(format!(
                        "query task failed: {}",
                        e
                    )))
                }
            };
            responses.insert(ref_id, response);
        }

        info!("批次 {} 完成", batch_id);
        QueryDataResponse { responses }
    }

    pub fn health_checker(&self) -> HealthChecker {
        HealthChecker::new(
            Arc::clone(&self.instances),
            Arc::clone(&self.pipeline),
            self.health_check_sql.to_string(),
        )
    }

    async fn run_query(
        &self,
        query: DataQuery,
        context: &PluginContext,
        cancel: &CancellationToken,
    ) -> QueryResponse {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return QueryResponse::with_error(DataSourceError::Cancelled),
            permit = Arc::clone(&self.limiter).acquire_owned() => permit,
        };
        let _permit = match permit {
            Ok(permit) => permit,
            Err(_) => {
                return QueryResponse::with_error(DataSourceError::Internal(
                    "query limiter closed".to_string(),
                ))
            }
        };

        let result = self.execute(&query, context, cancel).await;
        match &result {
            Ok(frames) => debug!("查询 {} 返回 {} 个帧", query.ref_id, frames.len()),
            Err(e) if e.is_cancelled() => debug!("查询 {} 已取消", query.ref_id),
            Err(e) => warn!("查询 {} 失败: {}", query.ref_id, e),
        }
        QueryResponse::from(result)
    }

    async fn execute(
        &self,
        query: &DataQuery,
        context: &PluginContext,
        cancel: &CancellationToken,
    ) -> DataSourceResult<Vec<Frame>> {
        let query = Query::parse(query)?;
        let instance = self.instances.get(context)?;
        let frames = self
            .pipeline
            .execute(&instance, &query.raw_sql, &query.ref_id, cancel)
            .await?;

        let frames = if frames.iter().all(|frame| frame.row_count() == 0) {
            vec![Frame::time_range_frame(FRAME_NAME, &query.time_range)]
        } else {
            frames
        };

        let meta = FrameMeta {
            executed_query_string: Some(query.raw_sql.clone()),
            preferred_visualisation: Some(query.format.preferred_visualisation().to_string()),
        };
        Ok(frames
            .into_iter()
            .map(|frame| frame.with_meta(meta.clone()))
            .collect())
    }
}
