//! 健康检查集成测试

mod common;

use chrono::{TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use common::{plugin_context, settings, table_query, TestHarness};
use redshift_datasource::api::{HealthStatus, PluginContext};
use redshift_datasource::client::mock::{MockPage, MockStatement, PollStep};
use redshift_datasource::client::ApiError;
use redshift_datasource::config::{AuthType, AwsCredentials};
use redshift_datasource::core::{CellValue, ColumnDescriptor, DataSourceError};

const CANARY: &str = "SELECT 1";

fn healthy() -> TestHarness {
    let harness = TestHarness::new();
    harness.warehouse.register(
        CANARY,
        MockStatement::single_value("?column?", "int4", CellValue::Long(1)),
    );
    harness
}

#[tokio::test(start_paused = true)]
async fn test_health_ok() {
    let harness = healthy();
    let checker = harness.engine.health_checker();

    let result = checker.check(&harness.context, &CancellationToken::new()).await;

    assert_eq!(result.status, HealthStatus::Ok);
    assert_eq!(result.message, "Data source is working");
}

#[tokio::test(start_paused = true)]
async fn test_health_is_idempotent() {
    let harness = healthy();
    let checker = harness.engine.health_checker();

    let first = checker.check(&harness.context, &CancellationToken::new()).await;
    let second = checker.check(&harness.context, &CancellationToken::new()).await;

    assert_eq!(first, second);
    assert_eq!(harness.factory.created(), 1);
    assert_eq!(harness.warehouse.execute_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_health_degraded_without_rows() {
    let harness = TestHarness::new();
    harness.warehouse.register(
        CANARY,
        MockStatement::finished(vec![MockPage::new(
            vec![ColumnDescriptor::new("?column?", "int4")],
            Vec::new(),
        )]),
    );

    let result = harness
        .engine
        .health_checker()
        .check(&harness.context, &CancellationToken::new())
        .await;

    assert_eq!(result.status, HealthStatus::Degraded);
}

#[tokio::test(start_paused = true)]
async fn test_health_error_carries_statement_reason() {
    let harness = TestHarness::new();
    harness.warehouse.register(
        CANARY,
        MockStatement::default().with_poll_steps(vec![PollStep::Failed(
            "permission denied for database dev".to_string(),
        )]),
    );

    let result = harness
        .engine
        .health_checker()
        .check(&harness.context, &CancellationToken::new())
        .await;

    assert_eq!(result.status, HealthStatus::Error);
    assert!(result.message.contains("permission denied for database dev"));
    assert_eq!(harness.warehouse.fetch_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_health_error_when_service_stays_unavailable() {
    let harness = TestHarness::new();
    harness.warehouse.register(
        CANARY,
        MockStatement::single_value("?column?", "int4", CellValue::Long(1)).with_submit_errors(
            vec![ApiError::Unavailable("service unavailable".to_string()); 3],
        ),
    );

    let result = harness
        .engine
        .health_checker()
        .check(&harness.context, &CancellationToken::new())
        .await;

    assert_eq!(result.status, HealthStatus::Error);
    // 一次提交加两次重试
    assert_eq!(harness.warehouse.execute_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_health_error_on_credentials() {
    let harness = healthy();
    harness
        .factory
        .fail_with(Some(DataSourceError::Auth("the security token is invalid".to_string())));

    let result = harness
        .engine
        .health_checker()
        .check(&harness.context, &CancellationToken::new())
        .await;

    assert_eq!(result.status, HealthStatus::Error);
    assert!(result.message.contains("the security token is invalid"));
    assert!(harness.warehouse.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_health_ok_with_default_credential_chain() {
    let harness = healthy();
    let mut chain = settings();
    chain.auth_type = AuthType::Default;
    chain.credentials = AwsCredentials::default();
    let context = plugin_context(chain);

    let result = harness
        .engine
        .health_checker()
        .check(&context, &CancellationToken::new())
        .await;

    assert_eq!(result.status, HealthStatus::Ok);
    assert_eq!(harness.factory.created(), 1);
    assert!(harness
        .factory
        .last_source()
        .map(|source| source.is_default_chain())
        .unwrap_or(false));
}

#[tokio::test(start_paused = true)]
async fn test_health_error_on_incomplete_settings() {
    let harness = healthy();
    let mut incomplete = settings();
    incomplete.workgroup_name = None;
    incomplete.cluster_identifier = None;
    let context = plugin_context(incomplete);

    let result = harness
        .engine
        .health_checker()
        .check(&context, &CancellationToken::new())
        .await;

    assert_eq!(result.status, HealthStatus::Error);
    assert!(harness.warehouse.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_settings_update_replaces_instance() {
    let harness = healthy();
    let checker = harness.engine.health_checker();
    checker.check(&harness.context, &CancellationToken::new()).await;

    let updated = PluginContext::new(
        harness.context.datasource_uid.clone(),
        Utc.with_ymd_and_hms(2021, 7, 1, 0, 0, 0).unwrap(),
        settings(),
    );
    checker.check(&updated, &CancellationToken::new()).await;

    // 查询复用最新的实例
    let batch = harness
        .engine
        .run(vec![table_query("A", CANARY)], &updated, &CancellationToken::new())
        .await;
    assert!(batch.get("A").map(|r| r.error.is_none()).unwrap_or(false));

    assert_eq!(harness.engine.instances().len(), 1);
    assert_eq!(harness.factory.created(), 2);
}
