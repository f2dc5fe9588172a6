// 工具模块 - 仅用于导出各个子模块，不包含具体实现

// 取消与超时
pub mod cancel;
pub use cancel::{guarded_call, sleep_or_cancel, CallError};

// 日志模块
pub mod logging;

// 重试与退避
pub mod retry;
pub use retry::{retry_with_backoff, Backoff, RetryConfig};
