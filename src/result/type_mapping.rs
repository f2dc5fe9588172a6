//! 数仓列类型到字段语义类型的映射，以及单元格转换
//!
//! 映射表是显式且完整的：表中没有的类型名一律报 `UnsupportedType`，
//! 不会退化成字符串。

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::core::error::{DataSourceError, DataSourceResult};
use crate::core::frame::{Field, FieldType, FieldValues};
use crate::core::types::{CellValue, ColumnDescriptor};

const TYPE_TABLE: &[(&str, FieldType)] = &[
    ("int2", FieldType::Integer),
    ("int4", FieldType::Integer),
    ("int8", FieldType::Integer),
    ("smallint", FieldType::Integer),
    ("integer", FieldType::Integer),
    ("int", FieldType::Integer),
    ("bigint", FieldType::Integer),
    ("oid", FieldType::Integer),
    ("float4", FieldType::Float),
    ("float8", FieldType::Float),
    ("float", FieldType::Float),
    ("real", FieldType::Float),
    ("double precision", FieldType::Float),
    ("numeric", FieldType::Float),
    ("decimal", FieldType::Float),
    ("bool", FieldType::Boolean),
    ("boolean", FieldType::Boolean),
    ("date", FieldType::Time),
    ("time", FieldType::Time),
    ("timetz", FieldType::Time),
    ("time without time zone", FieldType::Time),
    ("time with time zone", FieldType::Time),
    ("timestamp", FieldType::Time),
    ("timestamptz", FieldType::Time),
    ("timestamp without time zone", FieldType::Time),
    ("timestamp with time zone", FieldType::Time),
    ("varchar", FieldType::String),
    ("bpchar", FieldType::String),
    ("char", FieldType::String),
    ("character", FieldType::String),
    ("character varying", FieldType::String),
    ("nchar", FieldType::String),
    ("nvarchar", FieldType::String),
    ("text", FieldType::String),
    ("name", FieldType::String),
    ("super", FieldType::String),
    ("void", FieldType::Null),
    ("null", FieldType::Null),
];

/// 小写、去掉 `(p,s)` 之类的参数并折叠空白
fn normalize(type_name: &str) -> String {
    let mut stripped = String::with_capacity(type_name.len());
    let mut depth = 0usize;
    for c in type_name.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
    }
    stripped
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// 查表得到字段类型
pub fn map_column_type(type_name: &str) -> DataSourceResult<FieldType> {
    let normalized = normalize(type_name);
    TYPE_TABLE
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, field_type)| *field_type)
        .ok_or_else(|| DataSourceError::UnsupportedType(type_name.to_string()))
}

/// 单列的值累加器
#[derive(Debug)]
pub struct ColumnBuilder {
    name: String,
    type_name: String,
    values: FieldValues,
}

impl ColumnBuilder {
    pub fn new(column: &ColumnDescriptor) -> DataSourceResult<Self> {
        let field_type = map_column_type(&column.type_name)?;
        Ok(Self {
            name: column.name.clone(),
            type_name: column.type_name.clone(),
            values: FieldValues::empty(field_type),
        })
    }

    pub fn field_type(&self) -> FieldType {
        self.values.field_type()
    }

    /// 追加一个单元格；NULL 在任何类型下都记为该位置的空值
    pub fn push(&mut self, cell: CellValue) -> DataSourceResult<()> {
        match (&mut self.values, cell) {
            (values, CellValue::Null) => values.push_null(),
            (FieldValues::Null(rows), _) => *rows += 1,

            (FieldValues::Integer(v), CellValue::Long(n)) => v.push(Some(n)),
            (FieldValues::Integer(v), CellValue::String(s)) => match s.trim().parse::<i64>() {
                Ok(n) => v.push(Some(n)),
                Err(_) => return Err(self.unparsable(&s)),
            },

            (FieldValues::Float(v), CellValue::Double(d)) => v.push(Some(d)),
            (FieldValues::Float(v), CellValue::Long(n)) => v.push(Some(n as f64)),
            (FieldValues::Float(v), CellValue::String(s)) => match s.trim().parse::<f64>() {
                Ok(d) => v.push(Some(d)),
                Err(_) => return Err(self.unparsable(&s)),
            },

            (FieldValues::Boolean(v), CellValue::Boolean(b)) => v.push(Some(b)),
            (FieldValues::Boolean(v), CellValue::String(s)) => match parse_bool(&s) {
                Some(b) => v.push(Some(b)),
                None => return Err(self.unparsable(&s)),
            },

            (FieldValues::String(v), CellValue::String(s)) => v.push(Some(s)),
            (FieldValues::String(v), CellValue::Long(n)) => v.push(Some(n.to_string())),
            (FieldValues::String(v), CellValue::Double(d)) => v.push(Some(d.to_string())),
            (FieldValues::String(v), CellValue::Boolean(b)) => v.push(Some(b.to_string())),

            (FieldValues::Time(v), CellValue::String(s)) => match parse_time(&s) {
                Some(t) => v.push(Some(t)),
                None => return Err(self.unparsable(&s)),
            },

            (values, cell) => {
                return Err(DataSourceError::Materialization(format!(
                    "column '{}' ({}): cannot store {:?} in a {:?} field",
                    self.name,
                    self.type_name,
                    cell,
                    values.field_type()
                )));
            }
        }
        Ok(())
    }

    pub fn finish(self) -> Field {
        Field::new(self.name, self.values)
    }

    fn unparsable(&self, raw: &str) -> DataSourceError {
        DataSourceError::Materialization(format!(
            "column '{}' ({}): cannot parse '{}'",
            self.name, self.type_name, raw
        ))
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "t" | "true" => Some(true),
        "f" | "false" => Some(false),
        _ => None,
    }
}

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
const DATETIME_TZ_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

/// 解析时间单元格
///
/// 依次尝试 RFC 3339、带时区与不带时区的 `YYYY-MM-DD HH:MM:SS[.f]`、
/// `YYYY-MM-DD`，以及以纪元日为日期的 `HH:MM:SS[.f][±hh[:mm]]`。
pub fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();

    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    for format in DATETIME_TZ_FORMATS {
        if let Ok(t) = DateTime::parse_from_str(s, format) {
            return Some(t.with_timezone(&Utc));
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
            return Some(t.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
    }
    parse_time_of_day(s)
}

fn parse_time_of_day(s: &str) -> Option<DateTime<Utc>> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    if let Ok(t) = NaiveTime::parse_from_str(s, "%H:%M:%S%.f") {
        return Some(epoch.and_time(t).and_utc());
    }

    // timetz：末尾带 ±hh[:mm] 偏移
    let split = s.rfind(['+', '-'])?;
    let (time, offset) = s.split_at(split);
    let t = NaiveTime::parse_from_str(time, "%H:%M:%S%.f").ok()?;
    let offset_secs = parse_offset(offset)?;
    let local = epoch.and_time(t).and_utc();
    Some(local - chrono::Duration::seconds(offset_secs))
}

fn parse_offset(offset: &str) -> Option<i64> {
    let (sign, digits) = match offset.split_at(1) {
        ("+", rest) => (1, rest),
        ("-", rest) => (-1, rest),
        _ => return None,
    };
    let digits: String = digits.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i64>().ok()?, 0),
        4 => (digits[..2].parse::<i64>().ok()?, digits[2..].parse::<i64>().ok()?),
        _ => return None,
    };
    Some(sign * (hours * 3600 + minutes * 60))
}
