//! 列式结果表示
//!
//! `Frame` 由若干等长的 `Field` 组成，每个 `Field` 具有单一语义类型，
//! 任意行都可以为空值。

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::error::{DataSourceError, DataSourceResult};
use crate::core::types::TimeRange;

/// 字段的语义类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Time,
    Integer,
    Float,
    String,
    Boolean,
    Null,
}

/// 字段值，按语义类型存储
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum FieldValues {
    Time(Vec<Option<DateTime<Utc>>>),
    Integer(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    String(Vec<Option<String>>),
    Boolean(Vec<Option<bool>>),
    /// 全空列只记录行数
    Null(usize),
}

impl FieldValues {
    pub fn empty(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Time => FieldValues::Time(Vec::new()),
            FieldType::Integer => FieldValues::Integer(Vec::new()),
            FieldType::Float => FieldValues::Float(Vec::new()),
            FieldType::String => FieldValues::String(Vec::new()),
            FieldType::Boolean => FieldValues::Boolean(Vec::new()),
            FieldType::Null => FieldValues::Null(0),
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            FieldValues::Time(_) => FieldType::Time,
            FieldValues::Integer(_) => FieldType::Integer,
            FieldValues::Float(_) => FieldType::Float,
            FieldValues::String(_) => FieldType::String,
            FieldValues::Boolean(_) => FieldType::Boolean,
            FieldValues::Null(_) => FieldType::Null,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            FieldValues::Time(v) => v.len(),
            FieldValues::Integer(v) => v.len(),
            FieldValues::Float(v) => v.len(),
            FieldValues::String(v) => v.len(),
            FieldValues::Boolean(v) => v.len(),
            FieldValues::Null(n) => *n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 在末尾追加一个空值
    pub fn push_null(&mut self) {
        match self {
            FieldValues::Time(v) => v.push(None),
            FieldValues::Integer(v) => v.push(None),
            FieldValues::Float(v) => v.push(None),
            FieldValues::String(v) => v.push(None),
            FieldValues::Boolean(v) => v.push(None),
            FieldValues::Null(n) => *n += 1,
        }
    }

    /// 判断指定行是否为空值
    pub fn is_null(&self, row: usize) -> bool {
        match self {
            FieldValues::Time(v) => matches!(v.get(row), Some(None)),
            FieldValues::Integer(v) => matches!(v.get(row), Some(None)),
            FieldValues::Float(v) => matches!(v.get(row), Some(None)),
            FieldValues::String(v) => matches!(v.get(row), Some(None)),
            FieldValues::Boolean(v) => matches!(v.get(row), Some(None)),
            FieldValues::Null(n) => row < *n,
        }
    }
}

/// 一个具名列
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    #[serde(flatten)]
    pub values: FieldValues,
}

impl Field {
    pub fn new(name: impl Into<String>, values: FieldValues) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn field_type(&self) -> FieldType {
        self.values.field_type()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// 帧元数据
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executed_query_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_visualisation: Option<String>,
}

/// 列式结果帧
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub name: String,
    pub fields: Vec<Field>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<FrameMeta>,
}

impl Frame {
    /// 创建帧并检查所有字段等长
    pub fn try_new(name: impl Into<String>, fields: Vec<Field>) -> DataSourceResult<Self> {
        let frame = Self {
            name: name.into(),
            fields,
            meta: None,
        };
        if let Some(field) = frame.mismatched_field() {
            return Err(DataSourceError::Internal(format!(
                "field '{}' has {} rows, expected {}",
                field.name,
                field.len(),
                frame.row_count()
            )));
        }
        Ok(frame)
    }

    /// 由查询时间范围构造仅含时间字段的帧
    pub fn time_range_frame(name: impl Into<String>, range: &TimeRange) -> Self {
        Self {
            name: name.into(),
            fields: vec![Field::new(
                "time",
                FieldValues::Time(vec![Some(range.from), Some(range.to)]),
            )],
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: FrameMeta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// 行数，以第一个字段为准
    pub fn row_count(&self) -> usize {
        self.fields.first().map(Field::len).unwrap_or(0)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn mismatched_field(&self) -> Option<&Field> {
        let rows = self.row_count();
        self.fields.iter().find(|f| f.len() != rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_frame_rejects_uneven_fields() {
        let fields = vec![
            Field::new("a", FieldValues::Integer(vec![Some(1), Some(2)])),
            Field::new("b", FieldValues::String(vec![Some("x".to_string())])),
        ];
        let err = Frame::try_new("response", fields).unwrap_err();
        assert!(matches!(err, DataSourceError::Internal(_)));
    }

    #[test]
    fn test_time_range_frame() {
        let range = TimeRange::new(
            Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 6, 2, 0, 0, 0).unwrap(),
        );
        let frame = Frame::time_range_frame("response", &range);
        assert_eq!(frame.row_count(), 2);
        let time = frame.field("time").expect("time field");
        assert_eq!(time.field_type(), FieldType::Time);
        assert_eq!(time.values, FieldValues::Time(vec![Some(range.from), Some(range.to)]));
    }

    #[test]
    fn test_nulls_at_any_position() {
        let mut values = FieldValues::Float(vec![Some(1.5)]);
        values.push_null();
        assert_eq!(values.len(), 2);
        assert!(values.is_null(1));
        assert!(!values.is_null(0));

        let mut nulls = FieldValues::empty(FieldType::Null);
        nulls.push_null();
        nulls.push_null();
        assert_eq!(nulls.len(), 2);
        assert!(nulls.is_null(1));
    }

    #[test]
    fn test_field_serialization() {
        let field = Field::new("n", FieldValues::Integer(vec![Some(1), None]));
        let value = serde_json::to_value(&field).expect("serialize");
        assert_eq!(value["name"], "n");
        assert_eq!(value["type"], "integer");
        assert_eq!(value["values"], serde_json::json!([1, null]));
    }
}
