//! 单条语句的执行管线：提交 → 轮询 → 物化
//!
//! 查询与健康检查共用这条管线，因此两者遵守相同的超时与取消约束。

use tokio_util::sync::CancellationToken;

use crate::api::instance::DataSourceInstance;
use crate::config::EngineConfig;
use crate::core::error::DataSourceResult;
use crate::core::frame::Frame;
use crate::result::ResultMaterializer;
use crate::statement::{StatementExecutor, StatementPoller};

#[derive(Debug, Clone)]
pub struct StatementPipeline {
    executor: StatementExecutor,
    poller: StatementPoller,
    materializer: ResultMaterializer,
}

impl StatementPipeline {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            executor: StatementExecutor::new(config),
            poller: StatementPoller::new(config),
            materializer: ResultMaterializer::new(config),
        }
    }

    pub async fn execute(
        &self,
        instance: &DataSourceInstance,
        sql: &str,
        query_ref_id: &str,
        cancel: &CancellationToken,
    ) -> DataSourceResult<Vec<Frame>> {
        let client = instance.client().await?;
        let statement = self
            .executor
            .submit(&client, sql, instance.database_context(), query_ref_id, cancel)
            .await?;
        let statement = self.poller.wait(&client, statement, cancel).await?;
        self.materializer.fetch(&client, &statement, cancel).await
    }
}
