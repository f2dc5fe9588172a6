use log::info;
use tokio::signal;

pub mod health;
pub mod instance;
pub mod pipeline;
pub mod query_engine;

pub use health::{HealthCheckResult, HealthChecker, HealthStatus};
pub use instance::{DataSourceInstance, InstanceManager, PluginContext};
pub use pipeline::StatementPipeline;
pub use query_engine::{QueryDataRequest, QueryEngine};

/// 等待 Ctrl+C 或 SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("安装 Ctrl+C 处理器失败: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                log::error!("安装信号处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("收到关闭信号");
}
