//! 脚本化的内存数仓实现
//!
//! 按 SQL 文本注册语句脚本：提交阶段的错误序列、轮询状态序列、结果分页。
//! 所有出站调用都会被记录，便于测试断言调用次数与顺序。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

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

/// 一次 describe 调用的脚本化结果
#[derive(Debug, Clone)]
pub enum PollStep {
    Status(StatementStatus),
    Failed(String),
    Aborted(String),
    Error(ApiError),
}

/// 一页结果
#[derive(Debug, Clone, Default)]
pub struct MockPage {
    pub columns: Vec<ColumnDescriptor>,
    pub records: Vec<Vec<CellValue>>,
}

impl MockPage {
    pub fn new(columns: Vec<ColumnDescriptor>, records: Vec<Vec<CellValue>>) -> Self {
        Self { columns, records }
    }
}

/// 单条语句的脚本
#[derive(Debug, Clone)]
pub struct MockStatement {
    submit_errors: Vec<ApiError>,
    poll_steps: Vec<PollStep>,
    pages: Vec<MockPage>,
    has_result_set: bool,
    fetch_error: Option<ApiError>,
}

impl Default for MockStatement {
    fn default() -> Self {
        Self {
            submit_errors: Vec::new(),
            poll_steps: vec![PollStep::Status(StatementStatus::Finished)],
            pages: Vec::new(),
            has_result_set: true,
            fetch_error: None,
        }
    }
}

impl MockStatement {
    /// 立即完成并返回给定分页的语句
    pub fn finished(pages: Vec<MockPage>) -> Self {
        Self {
            pages,
            ..Default::default()
        }
    }

    /// 单列单行结果
    pub fn single_value(column: &str, type_name: &str, value: CellValue) -> Self {
        Self::finished(vec![MockPage::new(
            vec![ColumnDescriptor::new(column, type_name)],
            vec![vec![value]],
        )])
    }

    /// 状态序列用尽后重复最后一步
    pub fn with_poll_steps(mut self, steps: Vec<PollStep>) -> Self {
        self.poll_steps = steps;
        self
    }

    /// 前若干次提交依次返回这些错误
    pub fn with_submit_errors(mut self, errors: Vec<ApiError>) -> Self {
        self.submit_errors = errors;
        self
    }

    pub fn with_fetch_error(mut self, error: ApiError) -> Self {
        self.fetch_error = Some(error);
        self
    }

    pub fn without_result_set(mut self) -> Self {
        self.has_result_set = false;
        self.pages.clear();
        self
    }
}

/// 被记录的出站调用
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Execute { sql: String },
    Describe { statement_id: String },
    GetResult { statement_id: String, next_token: Option<String> },
    Cancel { statement_id: String },
}

#[derive(Debug)]
struct RunningStatement {
    script: MockStatement,
    poll_index: usize,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    submit_attempts: HashMap<String, usize>,
    statements: HashMap<String, RunningStatement>,
}

#[derive(Debug, Default)]
pub struct MockWarehouse {
    scripts: Mutex<HashMap<String, MockStatement>>,
    state: Mutex<MockState>,
    calls: Mutex<Vec<(Instant, MockCall)>>,
    latency: Mutex<Duration>,
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册 SQL 对应的脚本，未注册的 SQL 在提交时被当作非法 SQL 拒绝
    pub fn register(&self, sql: impl Into<String>, statement: MockStatement) -> &Self {
        self.scripts.lock().insert(sql.into(), statement);
        self
    }

    /// 每次调用前的模拟网络延迟
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    /// 指定时刻之后发生的调用数
    pub fn calls_since(&self, instant: Instant) -> usize {
        self.calls.lock().iter().filter(|(at, _)| *at > instant).count()
    }

    pub fn execute_calls(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Execute { .. }))
    }

    pub fn describe_calls(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Describe { .. }))
    }

    pub fn fetch_calls(&self) -> usize {
        self.count(|c| matches!(c, MockCall::GetResult { .. }))
    }

    pub fn cancel_calls(&self) -> usize {
        self.count(|c| matches!(c, MockCall::Cancel { .. }))
    }

    fn count(&self, predicate: impl Fn(&MockCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|(_, c)| predicate(c)).count()
    }

    async fn record(&self, call: MockCall) {
        self.calls.lock().push((Instant::now(), call));
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl WarehouseApi for MockWarehouse {
    async fn execute_statement(
        &self,
        request: &ExecuteStatementRequest,
    ) -> ApiResult<ExecuteStatementOutput> {
        self.record(MockCall::Execute {
            sql: request.sql.clone(),
        })
        .await;

        let script = self.scripts.lock().get(&request.sql).cloned().ok_or_else(|| {
            ApiError::Validation(format!("syntax error in statement '{}'", request.sql))
        })?;

        let mut state = self.state.lock();
        let attempts = state.submit_attempts.entry(request.sql.clone()).or_insert(0);
        let attempt = *attempts;
        *attempts += 1;
        if let Some(error) = script.submit_errors.get(attempt) {
            return Err(error.clone());
        }

        state.next_id += 1;
        let id = format!("mock-{}", state.next_id);
        state.statements.insert(
            id.clone(),
            RunningStatement {
                script,
                poll_index: 0,
            },
        );
        Ok(ExecuteStatementOutput {
            id,
            created_at: Some(Utc::now()),
        })
    }

    async fn describe_statement(&self, statement_id: &str) -> ApiResult<StatementDescription> {
        self.record(MockCall::Describe {
            statement_id: statement_id.to_string(),
        })
        .await;

        let mut state = self.state.lock();
        let running = state
            .statements
            .get_mut(statement_id)
            .ok_or_else(|| ApiError::NotFound(format!("statement {} not found", statement_id)))?;

        let steps = &running.script.poll_steps;
        let step = steps
            .get(running.poll_index)
            .or_else(|| steps.last())
            .cloned()
            .unwrap_or(PollStep::Status(StatementStatus::Finished));
        running.poll_index += 1;

        let has_result_set = running.script.has_result_set;
        let description = |status, error| StatementDescription {
            status,
            error,
            has_result_set,
        };
        match step {
            PollStep::Status(status) => Ok(description(status, None)),
            PollStep::Failed(reason) => Ok(description(StatementStatus::Failed, Some(reason))),
            PollStep::Aborted(reason) => Ok(description(StatementStatus::Aborted, Some(reason))),
            PollStep::Error(error) => Err(error),
        }
    }

    async fn get_statement_result(
        &self,
        statement_id: &str,
        next_token: Option<&str>,
    ) -> ApiResult<ResultPage> {
        self.record(MockCall::GetResult {
            statement_id: statement_id.to_string(),
            next_token: next_token.map(str::to_string),
        })
        .await;

        let state = self.state.lock();
        let running = state
            .statements
            .get(statement_id)
            .ok_or_else(|| ApiError::NotFound(format!("statement {} not found", statement_id)))?;
        if let Some(error) = &running.script.fetch_error {
            return Err(error.clone());
        }

        let index = match next_token {
            None => 0,
            Some(token) => token
                .strip_prefix("page-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| ApiError::Validation(format!("invalid next token '{}'", token)))?,
        };
        let pages = &running.script.pages;
        let page = match pages.get(index) {
            Some(page) => page.clone(),
            None if index == 0 => MockPage::default(),
            None => return Err(ApiError::Validation(format!("page {} out of range", index))),
        };
        Ok(ResultPage {
            statement_id: statement_id.to_string(),
            columns: page.columns,
            records: page.records,
            next_token: (index + 1 < pages.len()).then(|| format!("page-{}", index + 1)),
        })
    }

    async fn cancel_statement(&self, statement_id: &str) -> ApiResult<bool> {
        self.record(MockCall::Cancel {
            statement_id: statement_id.to_string(),
        })
        .await;
        Ok(true)
    }
}

/// 总是返回同一个模拟数仓的客户端工厂
#[derive(Debug)]
pub struct MockClientFactory {
    api: Arc<MockWarehouse>,
    created: AtomicUsize,
    failure: Mutex<Option<DataSourceError>>,
    last_source: Mutex<Option<CredentialSource>>,
}

impl MockClientFactory {
    pub fn new(api: Arc<MockWarehouse>) -> Self {
        Self {
            api,
            created: AtomicUsize::new(0),
            failure: Mutex::new(None),
            last_source: Mutex::new(None),
        }
    }

    /// 让后续的创建失败，传入 `None` 恢复
    pub fn fail_with(&self, error: Option<DataSourceError>) {
        *self.failure.lock() = error;
    }

    /// 成功创建的客户端数量
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// 最近一次创建请求携带的凭证来源
    pub fn last_source(&self) -> Option<CredentialSource> {
        self.last_source.lock().clone()
    }
}

#[async_trait]
impl ClientFactory for MockClientFactory {
    async fn create(
        &self,
        _scope: &ClientScope,
        _settings: &DataSourceSettings,
        credentials: CredentialSource,
    ) -> DataSourceResult<Arc<dyn WarehouseApi>> {
        *self.last_source.lock() = Some(credentials);
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.api.clone() as Arc<dyn WarehouseApi>)
    }
}
