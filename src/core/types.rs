//! 查询、语句与结果页的基础类型

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};

use crate::core::error::{DataSourceError, DataSourceResult, PublicError, ToPublicError};
use crate::core::frame::Frame;

/// 查询时间范围 [from, to)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }
}

/// 查询编辑器中的结果格式，JSON 中以整数表示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QueryFormat {
    #[default]
    TimeSeries,
    Table,
}

impl QueryFormat {
    /// 对应的前端首选可视化
    pub fn preferred_visualisation(&self) -> &'static str {
        match self {
            QueryFormat::TimeSeries => "graph",
            QueryFormat::Table => "table",
        }
    }
}

impl TryFrom<u8> for QueryFormat {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QueryFormat::TimeSeries),
            1 => Ok(QueryFormat::Table),
            other => Err(format!("unknown format {}", other)),
        }
    }
}

impl From<QueryFormat> for u8 {
    fn from(format: QueryFormat) -> Self {
        match format {
            QueryFormat::TimeSeries => 0,
            QueryFormat::Table => 1,
        }
    }
}

/// 宿主传入的原始查询
#[derive(Debug, Clone)]
pub struct DataQuery {
    pub ref_id: String,
    pub json: serde_json::Value,
    pub time_range: TimeRange,
    pub interval: Duration,
    pub max_data_points: i64,
}

/// 查询负载中由前端编辑器填写的部分
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryModel {
    #[serde(default)]
    raw_sql: String,
    #[serde(default)]
    format: QueryFormat,
}

/// 解析后的查询，创建后不可变
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub ref_id: String,
    pub raw_sql: String,
    pub format: QueryFormat,
    pub time_range: TimeRange,
    pub interval: Duration,
    pub max_data_points: i64,
}

impl Query {
    /// 解析查询负载，错误只影响当前查询
    pub fn parse(query: &DataQuery) -> DataSourceResult<Self> {
        let model: QueryModel = serde_json::from_value(query.json.clone())
            .map_err(|e| DataSourceError::MalformedQuery(e.to_string()))?;

        if model.raw_sql.trim().is_empty() {
            return Err(DataSourceError::MalformedQuery("rawSql is empty".to_string()));
        }

        Ok(Self {
            ref_id: query.ref_id.clone(),
            raw_sql: model.raw_sql,
            format: model.format,
            time_range: query.time_range,
            interval: query.interval,
            max_data_points: query.max_data_points,
        })
    }
}

/// 语句状态
///
/// Submitted → Running → {Finished | Failed | Aborted}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementStatus {
    Submitted,
    Running,
    Finished,
    Failed,
    Aborted,
}

impl StatementStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatementStatus::Finished | StatementStatus::Failed | StatementStatus::Aborted
        )
    }
}

impl fmt::Display for StatementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatementStatus::Submitted => "submitted",
            StatementStatus::Running => "running",
            StatementStatus::Finished => "finished",
            StatementStatus::Failed => "failed",
            StatementStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// 一次已提交的语句执行
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub id: String,
    pub query_ref_id: String,
    pub status: StatementStatus,
    pub submitted_at: DateTime<Utc>,
    pub has_result_set: bool,
}

impl Statement {
    pub fn submitted(id: String, query_ref_id: &str, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id,
            query_ref_id: query_ref_id.to_string(),
            status: StatementStatus::Submitted,
            submitted_at,
            has_result_set: false,
        }
    }
}

/// describe-statement 的返回
#[derive(Debug, Clone, PartialEq)]
pub struct StatementDescription {
    pub status: StatementStatus,
    pub error: Option<String>,
    pub has_result_set: bool,
}

impl StatementDescription {
    pub fn with_status(status: StatementStatus) -> Self {
        Self {
            status,
            error: None,
            has_result_set: true,
        }
    }
}

/// 列描述：名称与数仓声明的类型名
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub type_name: String,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// 数仓返回的单元格值
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Long(i64),
    Double(f64),
    String(String),
    Boolean(bool),
}

/// 一页结果
#[derive(Debug, Clone, PartialEq)]
pub struct ResultPage {
    pub statement_id: String,
    pub columns: Vec<ColumnDescriptor>,
    pub records: Vec<Vec<CellValue>>,
    /// 仅当还有后续页时存在
    pub next_token: Option<String>,
}

/// 单个查询的响应
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResponse {
    pub frames: Vec<Frame>,
    #[serde(serialize_with = "serialize_error", skip_serializing_if = "Option::is_none")]
    pub error: Option<DataSourceError>,
}

impl QueryResponse {
    pub fn with_frames(frames: Vec<Frame>) -> Self {
        Self { frames, error: None }
    }

    pub fn with_error(error: DataSourceError) -> Self {
        Self {
            frames: Vec::new(),
            error: Some(error),
        }
    }

    pub fn public_error(&self) -> Option<PublicError> {
        self.error.as_ref().map(|e| e.to_public_error())
    }
}

impl From<DataSourceResult<Vec<Frame>>> for QueryResponse {
    fn from(result: DataSourceResult<Vec<Frame>>) -> Self {
        match result {
            Ok(frames) => QueryResponse::with_frames(frames),
            Err(e) => QueryResponse::with_error(e),
        }
    }
}

fn serialize_error<S: Serializer>(
    error: &Option<DataSourceError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    error
        .as_ref()
        .map(|e| e.to_public_error())
        .serialize(serializer)
}

/// 批量查询的响应：ref id → 响应
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryDataResponse {
    pub responses: HashMap<String, QueryResponse>,
}

impl QueryDataResponse {
    pub fn get(&self, ref_id: &str) -> Option<&QueryResponse> {
        self.responses.get(ref_id)
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}
