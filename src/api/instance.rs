//! 数据源实例与实例管理
//!
//! 每个数据源 uid 对应一个实例，实例拥有自己的客户端缓存。宿主在设置变化时
//! 会推进 `updated` 时间戳，管理器据此整体替换实例；旧实例在最后一个
//! 使用者结束后被释放。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::info;

use crate::client::{ClientCache, ClientFactory, ClientHandle, ClientScope};
use crate::config::{DataSourceSettings, DatabaseContext};
use crate::core::error::DataSourceResult;

/// 宿主随每个请求传入的数据源上下文
#[derive(Debug, Clone)]
pub struct PluginContext {
    pub datasource_uid: String,
    pub updated: DateTime<Utc>,
    pub settings: Arc<DataSourceSettings>,
}

impl PluginContext {
    pub fn new(
        datasource_uid: impl Into<String>,
        updated: DateTime<Utc>,
        settings: DataSourceSettings,
    ) -> Self {
        Self {
            datasource_uid: datasource_uid.into(),
            updated,
            settings: Arc::new(settings),
        }
    }
}

#[derive(Debug)]
pub struct DataSourceInstance {
    uid: String,
    updated: DateTime<Utc>,
    database: DatabaseContext,
    scope: ClientScope,
    clients: ClientCache,
}

impl DataSourceInstance {
    /// 由上下文创建实例；设置不完整时返回 `Config` 错误
    pub fn create(context: &PluginContext, factory: Arc<dyn ClientFactory>) -> DataSourceResult<Self> {
        let database = context.settings.database_context()?;
        let scope = context.settings.scope();
        scope.validate()?;

        info!(
            "创建数据源实例 {} (区域 {}, 数据库 {})",
            context.datasource_uid, scope.region, database.database
        );
        Ok(Self {
            uid: context.datasource_uid.clone(),
            updated: context.updated,
            database,
            scope,
            clients: ClientCache::new(factory, Arc::clone(&context.settings)),
        })
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn updated(&self) -> DateTime<Utc> {
        self.updated
    }

    pub fn database_context(&self) -> &DatabaseContext {
        &self.database
    }

    /// 实例作用域对应的客户端
    pub async fn client(&self) -> DataSourceResult<Arc<ClientHandle>> {
        self.clients.get(&self.scope).await
    }
}

pub struct InstanceManager {
    factory: Arc<dyn ClientFactory>,
    instances: DashMap<String, Arc<DataSourceInstance>>,
}

impl InstanceManager {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            instances: DashMap::new(),
        }
    }

    /// 获取上下文对应的实例，`updated` 变化时重建
    pub fn get(&self, context: &PluginContext) -> DataSourceResult<Arc<DataSourceInstance>> {
        match self.instances.entry(context.datasource_uid.clone()) {
            Entry::Occupied(entry) if entry.get().updated() == context.updated => {
                Ok(Arc::clone(entry.get()))
            }
            Entry::Occupied(mut entry) => {
                info!(
                    "数据源 {} 的设置已变更，替换实例",
                    context.datasource_uid
                );
                let instance = Arc::new(DataSourceInstance::create(context, Arc::clone(&self.factory))?);
                entry.insert(Arc::clone(&instance));
                Ok(instance)
            }
            Entry::Vacant(entry) => {
                let instance = Arc::new(DataSourceInstance::create(context, Arc::clone(&self.factory))?);
                entry.insert(Arc::clone(&instance));
                Ok(instance)
            }
        }
    }

    /// 丢弃指定数据源的实例
    pub fn invalidate(&self, datasource_uid: &str) -> bool {
        self.instances.remove(datasource_uid).is_some()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl std::fmt::Debug for InstanceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceManager")
            .field("instances", &self.instances.len())
            .finish()
    }
}
