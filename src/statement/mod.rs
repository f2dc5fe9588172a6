//! 异步语句执行：提交与轮询

pub mod executor;
pub mod poller;

pub use executor::StatementExecutor;
pub use poller::StatementPoller;
