//! 集成测试共享工具模块
//!
//! 基于脚本化的 `MockWarehouse` 搭建完整的查询引擎，供所有集成测试使用

#![allow(dead_code)]

pub mod assertions;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;

use redshift_datasource::api::{PluginContext, QueryEngine};
use redshift_datasource::client::mock::{MockClientFactory, MockWarehouse};
use redshift_datasource::config::{AwsCredentials, DataSourceSettings, EngineConfig};
use redshift_datasource::core::{DataQuery, TimeRange};

/// 测试环境：模拟数仓 + 引擎 + 插件上下文
pub struct TestHarness {
    pub warehouse: Arc<MockWarehouse>,
    pub factory: Arc<MockClientFactory>,
    pub engine: QueryEngine,
    pub context: PluginContext,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(engine_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let warehouse = Arc::new(MockWarehouse::new());
        let factory = Arc::new(MockClientFactory::new(Arc::clone(&warehouse)));
        let engine = QueryEngine::new(&config, factory.clone());
        Self {
            warehouse,
            factory,
            engine,
            context: plugin_context(settings()),
        }
    }
}

/// 轮询间隔缩短的引擎配置
pub fn engine_config() -> EngineConfig {
    EngineConfig {
        initial_poll_interval_ms: 10,
        max_poll_interval_ms: 40,
        max_poll_attempts: 50,
        max_wait_ms: 10_000,
        max_poll_errors: 2,
        submit_retries: 2,
        request_timeout_ms: 1_000,
        max_concurrent_queries: 4,
        ..EngineConfig::default()
    }
}

pub fn settings() -> DataSourceSettings {
    DataSourceSettings {
        region: "us-east-2".to_string(),
        database: "dev".to_string(),
        workgroup_name: Some("analytics".to_string()),
        credentials: AwsCredentials {
            access_key: Some("AKIDEXAMPLE".to_string()),
            secret_key: Some("SECRET".to_string()),
            session_token: None,
        },
        ..Default::default()
    }
}

pub fn plugin_context(settings: DataSourceSettings) -> PluginContext {
    PluginContext::new("redshift-1", Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap(), settings)
}

pub fn time_range() -> TimeRange {
    TimeRange::new(
        Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2021, 6, 1, 6, 0, 0).unwrap(),
    )
}

/// 表格格式的查询
pub fn table_query(ref_id: &str, sql: &str) -> DataQuery {
    data_query(ref_id, json!({ "rawSql": sql, "format": 1 }))
}

pub fn data_query(ref_id: &str, payload: serde_json::Value) -> DataQuery {
    DataQuery {
        ref_id: ref_id.to_string(),
        json: payload,
        time_range: time_range(),
        interval: Duration::from_secs(60),
        max_data_points: 1000,
    }
}
