//! 数据源实例设置
//!
//! 设置由宿主提供：`jsonData` 为普通字段，`secureJsonData` 为解密后的敏感字段。
//! 区域、数据库、集群/工作组与执行身份都是必填配置，不存在内置默认值。

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::client::ClientScope;
use crate::core::error::{DataSourceError, DataSourceResult};

const SETTINGS_PROVIDER: &str = "DataSourceSettings";

/// 凭证来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// 宿主环境的默认凭证链
    Default,
    /// 设置中显式提供的访问密钥
    #[default]
    Keys,
}

/// 设置中携带的原始凭证
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AwsCredentials {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// 凭证来源
///
/// 访问密钥在设置中给出；默认凭证链（环境变量、共享配置、Web Identity、实例角色）
/// 由 AWS SDK 在创建客户端时解析并负责刷新。
#[derive(Debug, Clone)]
pub enum CredentialSource {
    Static(aws_credential_types::Credentials),
    DefaultChain,
}

impl CredentialSource {
    pub fn is_default_chain(&self) -> bool {
        matches!(self, CredentialSource::DefaultChain)
    }
}

/// 语句的执行目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionTarget {
    /// 预置集群，以数据库用户身份执行
    Cluster {
        cluster_identifier: String,
        db_user: Option<String>,
    },
    /// Serverless 工作组
    Workgroup { workgroup_name: String },
}

/// 提交语句时的固定执行参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseContext {
    pub database: String,
    pub target: ExecutionTarget,
    pub secret_arn: Option<String>,
}

/// 数据源实例设置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataSourceSettings {
    pub auth_type: AuthType,
    #[serde(rename = "defaultRegion", alias = "region")]
    pub region: String,
    /// 自定义 Data API 端点
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workgroup_name: Option<String>,
    pub database: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_arn: Option<String>,
    #[serde(skip_serializing)]
    pub credentials: AwsCredentials,
}

impl DataSourceSettings {
    /// 从宿主传入的 `jsonData` 与解密后的 `secureJsonData` 加载设置
    pub fn load(
        json_data: &serde_json::Value,
        secure_json_data: &HashMap<String, String>,
    ) -> DataSourceResult<Self> {
        let mut settings: DataSourceSettings = serde_json::from_value(json_data.clone())
            .map_err(|e| DataSourceError::Config(format!("error reading settings: {}", e)))?;

        let secret = |key: &str| {
            secure_json_data
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
        };
        settings.credentials = AwsCredentials {
            access_key: secret("accessKey"),
            secret_key: secret("secretKey"),
            session_token: secret("sessionToken"),
        };
        Ok(settings)
    }

    /// 检查必填字段
    pub fn validate(&self) -> DataSourceResult<()> {
        if self.region.trim().is_empty() {
            return Err(DataSourceError::Config("region is required".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(DataSourceError::Config("database is required".to_string()));
        }
        match (non_empty(&self.cluster_identifier), non_empty(&self.workgroup_name)) {
            (Some(_), Some(_)) => Err(DataSourceError::Config(
                "cluster identifier and workgroup name are mutually exclusive".to_string(),
            )),
            (None, None) => Err(DataSourceError::Config(
                "either a cluster identifier or a workgroup name is required".to_string(),
            )),
            (Some(_), None)
                if non_empty(&self.db_user).is_none() && non_empty(&self.secret_arn).is_none() =>
            {
                Err(DataSourceError::Config(
                    "a database user or a secret ARN is required for provisioned clusters"
                        .to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    /// 构造提交语句所需的执行上下文
    pub fn database_context(&self) -> DataSourceResult<DatabaseContext> {
        self.validate()?;
        let target = match non_empty(&self.workgroup_name) {
            Some(workgroup_name) => ExecutionTarget::Workgroup {
                workgroup_name: workgroup_name.to_string(),
            },
            None => ExecutionTarget::Cluster {
                cluster_identifier: non_empty(&self.cluster_identifier)
                    .unwrap_or_default()
                    .to_string(),
                db_user: non_empty(&self.db_user).map(str::to_string),
            },
        };
        Ok(DatabaseContext {
            database: self.database.clone(),
            target,
            secret_arn: non_empty(&self.secret_arn).map(str::to_string),
        })
    }

    /// 客户端缓存使用的作用域键
    pub fn scope(&self) -> ClientScope {
        let credential_scope = match self.auth_type {
            AuthType::Default => "default".to_string(),
            AuthType::Keys => format!(
                "keys:{}",
                self.credentials.access_key.as_deref().unwrap_or_default()
            ),
        };
        ClientScope::new(self.region.trim(), credential_scope)
    }

    /// 确定凭证来源
    ///
    /// 访问密钥缺失时立即返回 `Auth`；默认凭证链的可用性由客户端工厂检查。
    pub fn resolve_credentials(&self) -> DataSourceResult<CredentialSource> {
        match self.auth_type {
            AuthType::Default => Ok(CredentialSource::DefaultChain),
            AuthType::Keys => {
                let access_key_id = non_empty(&self.credentials.access_key)
                    .ok_or_else(|| DataSourceError::Auth("access key is missing".to_string()))?;
                let secret_access_key = non_empty(&self.credentials.secret_key)
                    .ok_or_else(|| DataSourceError::Auth("secret key is missing".to_string()))?;
                Ok(CredentialSource::Static(aws_credential_types::Credentials::new(
                    access_key_id,
                    secret_access_key,
                    non_empty(&self.credentials.session_token).map(str::to_string),
                    None,
                    SETTINGS_PROVIDER,
                )))
            }
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
