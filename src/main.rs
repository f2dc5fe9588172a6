use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use log::info;
use tokio_util::sync::CancellationToken;

use redshift_datasource::api::{self, PluginContext, QueryDataRequest, QueryEngine};
use redshift_datasource::client::RedshiftClientFactory;
use redshift_datasource::config::{Config, DataSourceSettings};
use redshift_datasource::core::{DataQuery, TimeRange};
use redshift_datasource::utils::logging;

#[derive(Parser)]
#[clap(version = "0.1.0", author = "Redshift Datasource Contributors")]
struct Cli {
    #[clap(short, long, default_value = "config.toml")]
    config: String,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single SQL query and print the frames as JSON
    Query {
        #[clap(short, long)]
        sql: String,
        /// Start of the time range (RFC 3339), defaults to one hour ago
        #[clap(long)]
        from: Option<DateTime<Utc>>,
        /// End of the time range (RFC 3339), defaults to now
        #[clap(long)]
        to: Option<DateTime<Utc>>,
        #[clap(long, default_value = "A")]
        ref_id: String,
        /// 0 = time series, 1 = table
        #[clap(long, default_value_t = 1)]
        format: u8,
    },
    /// Run the health check statement
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Failed to load config from '{}': {}, using default config",
                cli.config, e
            );
            Config::default()
        }
    };
    logging::init(&config.log).map_err(|e| anyhow!("failed to initialize logging: {}", e))?;

    let result = run(cli.command, &config).await;
    logging::shutdown();
    result
}

async fn run(command: Command, config: &Config) -> Result<()> {
    let settings = datasource_settings(config)?;
    let context = PluginContext::new("local", Utc::now(), settings);
    let factory = Arc::new(RedshiftClientFactory::new(config.engine.request_timeout()));
    let engine = QueryEngine::new(&config.engine, factory);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        api::shutdown_signal().await;
        trigger.cancel();
    });

    match command {
        Command::Query {
            sql,
            from,
            to,
            ref_id,
            format,
        } => {
            let to = to.unwrap_or_else(Utc::now);
            let from = from.unwrap_or(to - chrono::Duration::hours(1));
            info!("在 {} 执行查询 {}", context.settings.region, ref_id);

            let request = QueryDataRequest {
                plugin_context: context,
                queries: vec![DataQuery {
                    ref_id: ref_id.clone(),
                    json: serde_json::json!({ "rawSql": sql, "format": format }),
                    time_range: TimeRange::new(from, to),
                    interval: Duration::from_secs(60),
                    max_data_points: 1000,
                }],
            };
            let response = engine.query_data(request, &cancel).await;
            println!("{}", serde_json::to_string_pretty(&response)?);

            match response.get(&ref_id).and_then(|r| r.public_error()) {
                Some(error) => Err(anyhow!("query {} failed: {}", ref_id, error)),
                None => Ok(()),
            }
        }
        Command::Health => {
            let result = engine.health_checker().check(&context, &cancel).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}

/// 本地运行时的数据源设置
///
/// 访问密钥取自配置文件中的 `credentials`；`authType = "default"` 时由 AWS 默认凭证链解析。
fn datasource_settings(config: &Config) -> Result<DataSourceSettings> {
    let settings = config
        .datasource
        .clone()
        .context("the config file has no [datasource] section")?;
    let json = serde_json::to_value(&settings)?;

    let configured = [
        ("accessKey", settings.credentials.access_key.clone()),
        ("secretKey", settings.credentials.secret_key.clone()),
        ("sessionToken", settings.credentials.session_token.clone()),
    ];
    let secure: HashMap<String, String> = configured
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key.to_string(), value)))
        .collect();

    let settings = DataSourceSettings::load(&json, &secure)?;
    settings.validate()?;
    Ok(settings)
}
