pub mod error;
pub mod frame;
pub mod types;

// 错误和结果类型
pub use error::{DataSourceError, DataSourceResult, SubmissionError};

// 核心数据类型
pub use frame::{Field, FieldType, FieldValues, Frame, FrameMeta};
pub use types::{
    CellValue, ColumnDescriptor, DataQuery, Query, QueryDataResponse, QueryFormat,
    QueryResponse, ResultPage, Statement, StatementDescription, StatementStatus, TimeRange,
};
