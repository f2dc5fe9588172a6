use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub mod datasource;

pub use datasource::{
    AuthType, AwsCredentials, CredentialSource, DataSourceSettings, DatabaseContext, ExecutionTarget,
};

/// 进程级配置
///
/// 每个数据源实例的设置（区域、集群、数据库等）只来自宿主传入的插件上下文，
/// `datasource` 段仅供命令行工具本地调试使用。
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datasource: Option<DataSourceSettings>,
}

/// 日志配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub dir: String,
    pub file: String,
    pub max_file_size: u64,
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: "logs".to_string(),
            file: "redshift-datasource".to_string(),
            max_file_size: 100 * 1024 * 1024, // 100MB
            max_files: 5,
        }
    }
}

/// 语句执行引擎配置
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    /// 首次轮询间隔
    pub initial_poll_interval_ms: u64,
    /// 轮询间隔上限
    pub max_poll_interval_ms: u64,
    pub backoff_multiplier: f64,
    /// 单个语句最多发出的 describe 调用次数
    pub max_poll_attempts: u32,
    /// 单个语句的轮询总时长预算
    pub max_wait_ms: u64,
    /// 连续瞬时轮询错误的容忍次数
    pub max_poll_errors: u32,
    /// 服务不可用时提交的额外重试次数
    pub submit_retries: u32,
    /// 单次出站调用超时
    pub request_timeout_ms: u64,
    /// 一个批次内并发执行的查询上限
    pub max_concurrent_queries: usize,
    /// 健康检查使用的金丝雀语句
    pub health_check_sql: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_poll_interval_ms: 200,
            max_poll_interval_ms: 5_000,
            backoff_multiplier: 2.0,
            max_poll_attempts: 120,
            max_wait_ms: 300_000,
            max_poll_errors: 3,
            submit_retries: 2,
            request_timeout_ms: 30_000,
            max_concurrent_queries: num_cpus::get() * 2,
            health_check_sql: "SELECT 1".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn initial_poll_interval(&self) -> Duration {
        Duration::from_millis(self.initial_poll_interval_ms)
    }

    pub fn max_poll_interval(&self) -> Duration {
        Duration::from_millis(self.max_poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// 验证配置
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_poll_interval_ms == 0 {
            return Err("initial_poll_interval_ms must be greater than 0".to_string());
        }
        if self.max_poll_interval_ms < self.initial_poll_interval_ms {
            return Err("max_poll_interval_ms must not be less than initial_poll_interval_ms".to_string());
        }
        if !(self.backoff_multiplier >= 1.0) {
            return Err("backoff_multiplier must be at least 1.0".to_string());
        }
        if self.max_poll_attempts == 0 {
            return Err("max_poll_attempts must be greater than 0".to_string());
        }
        if self.max_wait_ms == 0 {
            return Err("max_wait_ms must be greater than 0".to_string());
        }
        if self.request_timeout_ms == 0 {
            return Err("request_timeout_ms must be greater than 0".to_string());
        }
        if self.max_concurrent_queries == 0 {
            return Err("max_concurrent_queries must be greater than 0".to_string());
        }
        if self.health_check_sql.trim().is_empty() {
            return Err("health_check_sql must not be empty".to_string());
        }
        Ok(())
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.engine.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
