//! 数仓客户端层
//!
//! - `traits`: 出站 API 抽象
//! - `cache`: 按作用域缓存的客户端
//! - `redshift`: 基于 AWS SDK 的 Redshift Data API 实现
//! - `mock`: 脚本化的内存实现，供测试与本地调试使用

pub mod cache;
pub mod error;
pub mod mock;
pub mod redshift;
pub mod traits;

pub use cache::{ClientCache, ClientHandle, ClientScope};
pub use error::{ApiError, ApiResult};
pub use redshift::{RedshiftClientFactory, RedshiftDataClient};
pub use traits::{ClientFactory, ExecuteStatementOutput, ExecuteStatementRequest, WarehouseApi};
