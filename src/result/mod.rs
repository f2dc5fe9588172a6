//! 结果物化与类型映射

pub mod materializer;
pub mod type_mapping;

pub use materializer::{ResultMaterializer, TableBuilder, FRAME_NAME};
pub use type_mapping::{map_column_type, parse_time, ColumnBuilder};
