//! 按作用域缓存的数仓客户端
//!
//! 缓存只会新增条目，不会原地修改已有的客户端；设置变化时由实例管理器整体丢弃
//! 并重建所属实例，正在使用旧句柄的查询不受影响。

use std::fmt;
use std::sync::{Arc, LazyLock};

use log::debug;
use moka::future::Cache;
use regex::Regex;

use crate::client::traits::{ClientFactory, WarehouseApi};
use crate::config::DataSourceSettings;
use crate::core::error::{DataSourceError, DataSourceResult};

const MAX_CACHED_CLIENTS: u64 = 64;

static REGION_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2}(-[a-z]+)+-\d+$"));

/// 客户端作用域：区域 + 凭证上下文
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientScope {
    pub region: String,
    pub credential_scope: String,
}

impl ClientScope {
    pub fn new(region: impl Into<String>, credential_scope: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            credential_scope: credential_scope.into(),
        }
    }

    /// 检查作用域键格式
    pub fn validate(&self) -> DataSourceResult<()> {
        if self.region.is_empty() {
            return Err(DataSourceError::Config("region is empty".to_string()));
        }
        let pattern = REGION_PATTERN
            .as_ref()
            .map_err(|e| DataSourceError::Internal(format!("invalid region pattern: {}", e)))?;
        if !pattern.is_match(&self.region) {
            return Err(DataSourceError::Config(format!(
                "'{}' is not a valid region",
                self.region
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ClientScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.credential_scope)
    }
}

/// 构造完成后只读的客户端句柄
#[derive(Debug)]
pub struct ClientHandle {
    scope: ClientScope,
    api: Arc<dyn WarehouseApi>,
}

impl ClientHandle {
    pub fn new(scope: ClientScope, api: Arc<dyn WarehouseApi>) -> Self {
        Self { scope, api }
    }

    pub fn scope(&self) -> &ClientScope {
        &self.scope
    }

    pub fn api(&self) -> &dyn WarehouseApi {
        self.api.as_ref()
    }
}

/// 客户端缓存
pub struct ClientCache {
    factory: Arc<dyn ClientFactory>,
    settings: Arc<DataSourceSettings>,
    clients: Cache<ClientScope, Arc<ClientHandle>>,
}

impl ClientCache {
    pub fn new(factory: Arc<dyn ClientFactory>, settings: Arc<DataSourceSettings>) -> Self {
        Self {
            factory,
            settings,
            clients: Cache::builder().max_capacity(MAX_CACHED_CLIENTS).build(),
        }
    }

    /// 获取作用域对应的客户端，首次访问时创建
    ///
    /// 同一作用域的并发首次访问只会创建一次客户端。
    pub async fn get(&self, scope: &ClientScope) -> DataSourceResult<Arc<ClientHandle>> {
        scope.validate()?;

        self.clients
            .try_get_with(scope.clone(), async {
                debug!("为作用域 {} 创建数仓客户端", scope);
                let credentials = self.settings.resolve_credentials()?;
                let api = self
                    .factory
                    .create(scope, &self.settings, credentials)
                    .await?;
                Ok::<_, DataSourceError>(Arc::new(ClientHandle::new(scope.clone(), api)))
            })
            .await
            .map_err(|e| (*e).clone())
    }
}

impl fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCache")
            .field("region", &self.settings.region)
            .field("cached_clients", &self.clients.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{MockClientFactory, MockWarehouse};
    use crate::config::AwsCredentials;

    fn settings() -> Arc<DataSourceSettings> {
        Arc::new(DataSourceSettings {
            region: "us-east-2".to_string(),
            database: "dev".to_string(),
            cluster_identifier: Some("cluster".to_string()),
            db_user: Some("grafana".to_string()),
            credentials: AwsCredentials {
                access_key: Some("AKID".to_string()),
                secret_key: Some("SECRET".to_string()),
                session_token: None,
            },
            ..Default::default()
        })
    }

    #[test]
    fn test_scope_validation() {
        assert!(ClientScope::new("us-east-2", "keys:A").validate().is_ok());
        assert!(ClientScope::new("us-gov-west-1", "keys:A").validate().is_ok());
        assert!(matches!(
            ClientScope::new("", "keys:A").validate(),
            Err(DataSourceError::Config(_))
        ));
        assert!(matches!(
            ClientScope::new("US East", "keys:A").validate(),
            Err(DataSourceError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_get_is_idempotent() {
        let factory = Arc::new(MockClientFactory::new(Arc::new(MockWarehouse::new())));
        let cache = ClientCache::new(factory.clone(), settings());
        let scope = ClientScope::new("us-east-2", "keys:AKID");

        let first = cache.get(&scope).await.expect("first get");
        let second = cache.get(&scope).await.expect("second get");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.created(), 1);
        assert_eq!(first.scope(), &scope);
    }

    #[tokio::test]
    async fn test_concurrent_first_access_creates_once() {
        let factory = Arc::new(MockClientFactory::new(Arc::new(MockWarehouse::new())));
        let cache = Arc::new(ClientCache::new(factory.clone(), settings()));
        let scope = ClientScope::new("us-east-2", "keys:AKID");

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let scope = scope.clone();
                tokio::spawn(async move { cache.get(&scope).await })
            })
            .collect();
        for task in tasks {
            task.await.expect("join").expect("get");
        }
        assert_eq!(factory.created(), 1);
    }

    #[tokio::test]
    async fn test_distinct_scopes_get_distinct_clients() {
        let factory = Arc::new(MockClientFactory::new(Arc::new(MockWarehouse::new())));
        let cache = ClientCache::new(factory.clone(), settings());

        cache.get(&ClientScope::new("us-east-2", "keys:AKID")).await.expect("get");
        cache.get(&ClientScope::new("eu-west-1", "keys:AKID")).await.expect("get");
        assert_eq!(factory.created(), 2);
    }

    #[tokio::test]
    async fn test_malformed_scope_is_config_error() {
        let factory = Arc::new(MockClientFactory::new(Arc::new(MockWarehouse::new())));
        let cache = ClientCache::new(factory.clone(), settings());

        let err = cache.get(&ClientScope::new("nowhere", "keys:AKID")).await.unwrap_err();
        assert!(matches!(err, DataSourceError::Config(_)));
        assert_eq!(factory.created(), 0);
    }

    #[tokio::test]
    async fn test_missing_credentials_is_auth_error() {
        let factory = Arc::new(MockClientFactory::new(Arc::new(MockWarehouse::new())));
        let mut settings = (*settings()).clone();
        settings.credentials = AwsCredentials::default();
        let cache = ClientCache::new(factory.clone(), Arc::new(settings));

        let err = cache.get(&ClientScope::new("us-east-2", "keys:")).await.unwrap_err();
        assert!(matches!(err, DataSourceError::Auth(_)));
        assert_eq!(factory.created(), 0);
    }

    #[tokio::test]
    async fn test_failed_creation_is_not_cached() {
        let factory = Arc::new(MockClientFactory::new(Arc::new(MockWarehouse::new())));
        factory.fail_with(Some(DataSourceError::Auth("expired token".to_string())));
        let cache = ClientCache::new(factory.clone(), settings());
        let scope = ClientScope::new("us-east-2", "keys:AKID");

        assert!(matches!(cache.get(&scope).await, Err(DataSourceError::Auth(_))));

        factory.fail_with(None);
        assert!(cache.get(&scope).await.is_ok());
        assert_eq!(factory.created(), 1);
    }
}
