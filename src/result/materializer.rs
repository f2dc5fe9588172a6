//! 结果物化：按游标分页拉取并构造列式帧

use std::time::Duration;

use log::debug;
use tokio_util::sync::CancellationToken;

use crate::client::error::ApiError;
use crate::client::ClientHandle;
use crate::config::EngineConfig;
use crate::core::error::{DataSourceError, DataSourceResult};
use crate::core::frame::Frame;
use crate::core::types::{CellValue, ColumnDescriptor, ResultPage, Statement, StatementStatus};
use crate::result::type_mapping::ColumnBuilder;
use crate::utils::{guarded_call, CallError};

/// 结果帧名称
pub const FRAME_NAME: &str = "response";

/// 跨页累积行的表构造器
///
/// 列类型在第一页时确定；后续页的列描述必须一致。
#[derive(Debug)]
pub struct TableBuilder {
    columns: Vec<ColumnDescriptor>,
    builders: Vec<ColumnBuilder>,
    rows: usize,
}

impl TableBuilder {
    pub fn new(columns: &[ColumnDescriptor]) -> DataSourceResult<Self> {
        let builders = columns
            .iter()
            .map(ColumnBuilder::new)
            .collect::<DataSourceResult<Vec<_>>>()?;
        Ok(Self {
            columns: columns.to_vec(),
            builders,
            rows: 0,
        })
    }

    /// 追加一页；空的列描述视为沿用首页
    pub fn append(&mut self, columns: &[ColumnDescriptor], records: Vec<Vec<CellValue>>) -> DataSourceResult<()> {
        if !columns.is_empty() && columns != self.columns.as_slice() {
            return Err(DataSourceError::Materialization(
                "column descriptors changed between result pages".to_string(),
            ));
        }
        for record in records {
            if record.len() != self.builders.len() {
                return Err(DataSourceError::Materialization(format!(
                    "row {} has {} values, expected {}",
                    self.rows,
                    record.len(),
                    self.builders.len()
                )));
            }
            for (builder, cell) in self.builders.iter_mut().zip(record) {
                builder.push(cell)?;
            }
            self.rows += 1;
        }
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn finish(self, name: &str) -> DataSourceResult<Frame> {
        Frame::try_new(name, self.builders.into_iter().map(ColumnBuilder::finish).collect())
    }
}

#[derive(Debug, Clone)]
pub struct ResultMaterializer {
    request_timeout: Duration,
}

impl ResultMaterializer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            request_timeout: config.request_timeout(),
        }
    }

    /// 拉取已完成语句的全部结果页
    ///
    /// 输出与分页方式无关；没有结果集的语句不调用结果接口，返回空列表。
    pub async fn fetch(
        &self,
        client: &ClientHandle,
        statement: &Statement,
        cancel: &CancellationToken,
    ) -> DataSourceResult<Vec<Frame>> {
        if statement.status != StatementStatus::Finished {
            return Err(DataSourceError::Internal(format!(
                "statement {} is {}, results are only available once finished",
                statement.id, statement.status
            )));
        }
        if !statement.has_result_set {
            debug!("语句 {} 没有结果集", statement.id);
            return Ok(Vec::new());
        }

        let mut page = self.fetch_page(client, &statement.id, None, cancel).await?;
        let mut table = TableBuilder::new(&page.columns)?;
        let mut pages = 1;
        loop {
            table.append(&page.columns, std::mem::take(&mut page.records))?;
            let Some(token) = page.next_token.take() else {
                break;
            };
            page = self.fetch_page(client, &statement.id, Some(&token), cancel).await?;
            pages += 1;
        }

        debug!(
            "查询 {} 的语句 {}: 共 {} 行, {} 页",
            statement.query_ref_id,
            statement.id,
            table.rows(),
            pages
        );
        Ok(vec![table.finish(FRAME_NAME)?])
    }

    async fn fetch_page(
        &self,
        client: &ClientHandle,
        statement_id: &str,
        next_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> DataSourceResult<ResultPage> {
        guarded_call(
            cancel,
            self.request_timeout,
            client.api().get_statement_result(statement_id, next_token),
        )
        .await
        .map_err(|e| match e {
            CallError::Cancelled => DataSourceError::Cancelled,
            CallError::Api(ApiError::Auth(message)) => DataSourceError::Auth(message),
            CallError::Api(error) => {
                DataSourceError::Fetch(format!("statement {}: {}", statement_id, error))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{MockPage, MockStatement, MockWarehouse};
    use crate::client::{ClientScope, ExecuteStatementRequest, WarehouseApi};
    use crate::config::{DatabaseContext, ExecutionTarget};
    use crate::core::frame::FieldValues;
    use chrono::Utc;
    use std::sync::Arc;

    /// 提交并描述一次，得到与轮询结束时相同的语句状态
    async fn finished(mock: &Arc<MockWarehouse>, sql: &str, script: MockStatement) -> (ClientHandle, Statement) {
        mock.register(sql, script);
        let context = DatabaseContext {
            database: "dev".to_string(),
            target: ExecutionTarget::Workgroup {
                workgroup_name: "wg".to_string(),
            },
            secret_arn: None,
        };
        let output = mock
            .execute_statement(&ExecuteStatementRequest::new(sql, &context))
            .await
            .expect("submit");
        let description = mock.describe_statement(&output.id).await.expect("describe");
        let mut statement = Statement::submitted(output.id, "A", Utc::now());
        statement.status = description.status;
        statement.has_result_set = description.has_result_set;
        let client = ClientHandle::new(ClientScope::new("us-east-2", "keys:AKID"), mock.clone());
        (client, statement)
    }

    fn columns() -> Vec<ColumnDescriptor> {
        vec![
            ColumnDescriptor::new("time", "timestamp"),
            ColumnDescriptor::new("value", "float8"),
        ]
    }

    fn row(ts: &str, value: Option<f64>) -> Vec<CellValue> {
        vec![
            CellValue::String(ts.to_string()),
            value.map(CellValue::Double).unwrap_or(CellValue::Null),
        ]
    }

    fn materializer() -> ResultMaterializer {
        ResultMaterializer::new(&EngineConfig::default())
    }

    #[tokio::test]
    async fn test_pages_are_concatenated_in_order() {
        let mock = Arc::new(MockWarehouse::new());
        let (client, statement) = finished(
            &mock,
            "select time, value from metrics",
            MockStatement::finished(vec![
                MockPage::new(columns(), vec![row("2021-06-01 00:00:00", Some(1.0))]),
                MockPage::new(columns(), vec![row("2021-06-01 00:01:00", None)]),
                MockPage::new(columns(), vec![row("2021-06-01 00:02:00", Some(3.0))]),
            ]),
        )
        .await;

        let frames = materializer()
            .fetch(&client, &statement, &CancellationToken::new())
            .await
            .expect("fetch");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].name, FRAME_NAME);
        assert_eq!(frames[0].row_count(), 3);
        assert_eq!(
            frames[0].field("value").map(|f| f.values.clone()),
            Some(FieldValues::Float(vec![Some(1.0), None, Some(3.0)]))
        );
        assert_eq!(mock.fetch_calls(), 3);
    }

    #[tokio::test]
    async fn test_unsupported_type_fails_before_rows() {
        let mock = Arc::new(MockWarehouse::new());
        let (client, statement) = finished(
            &mock,
            "select shape from parcels",
            MockStatement::finished(vec![MockPage::new(
                vec![ColumnDescriptor::new("shape", "geometry")],
                vec![vec![CellValue::String("POINT(1 2)".to_string())]],
            )]),
        )
        .await;

        let err = materializer()
            .fetch(&client, &statement, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, DataSourceError::UnsupportedType("geometry".to_string()));
    }

    #[tokio::test]
    async fn test_no_result_set_skips_fetch() {
        let mock = Arc::new(MockWarehouse::new());
        let (client, statement) = finished(
            &mock,
            "create temp table t (a int)",
            MockStatement::default().without_result_set(),
        )
        .await;

        let frames = materializer()
            .fetch(&client, &statement, &CancellationToken::new())
            .await
            .expect("fetch");
        assert!(frames.is_empty());
        assert_eq!(mock.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_fetch_error() {
        let mock = Arc::new(MockWarehouse::new());
        let (client, statement) = finished(
            &mock,
            "select 1",
            MockStatement::default().with_fetch_error(ApiError::Unavailable("reset".to_string())),
        )
        .await;

        let err = materializer()
            .fetch(&client, &statement, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DataSourceError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_refuses_unfinished_statement() {
        let mock = Arc::new(MockWarehouse::new());
        let client = ClientHandle::new(ClientScope::new("us-east-2", "keys:AKID"), mock.clone());
        let statement = Statement::submitted("mock-1".to_string(), "A", Utc::now());

        let err = materializer()
            .fetch(&client, &statement, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DataSourceError::Internal(_)));
        assert_eq!(mock.fetch_calls(), 0);
    }

    #[test]
    fn test_row_arity_is_checked() {
        let mut table = TableBuilder::new(&columns()).expect("table");
        let err = table
            .append(&[], vec![vec![CellValue::String("2021-06-01".to_string())]])
            .unwrap_err();
        assert!(matches!(err, DataSourceError::Materialization(_)));
    }

    #[test]
    fn test_changed_columns_are_rejected() {
        let mut table = TableBuilder::new(&columns()).expect("table");
        let err = table
            .append(&[ColumnDescriptor::new("other", "int4")], Vec::new())
            .unwrap_err();
        assert!(matches!(err, DataSourceError::Materialization(_)));
    }
}
