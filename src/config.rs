use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::models::TotalCaching;
use crate::service::matcher::{MatchOptions, DEFAULT_RECURSION_LIMIT};

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub matcher: MatcherConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 未配置时不挂载按客户对账接口
    pub url: Option<String>,
    pub max_connections: u32,
    pub slow_statement_secs: u64,
}

/// 匹配引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    pub recursion_limit: usize,
    pub max_hits: Option<usize>,
    pub total_caching: TotalCaching,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL").ok(),
                max_connections: 20,
                slow_statement_secs: 5,
            },
            matcher: MatcherConfig::default(),
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            max_hits: None,
            total_caching: TotalCaching::default(),
        }
    }
}

impl MatcherConfig {
    pub fn options(&self) -> MatchOptions {
        MatchOptions {
            recursion_limit: self.recursion_limit,
            max_hits: self.max_hits,
            total_caching: self.total_caching,
        }
    }
}

impl AppConfig {
    /// 加载配置: 默认值 -> matcher.toml (可选) -> MATCHER__* 环境变量
    ///
    /// 例如 `MATCHER__SERVER__PORT=9000`、`MATCHER__MATCHER__TOTAL_CACHING=sticky`。
    /// `DATABASE_URL` 仍然有效。
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("matcher")
    }

    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        let defaults = AppConfig::default();
        let mut builder = Config::builder()
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", i64::from(defaults.server.port))?
            .set_default("database.max_connections", i64::from(defaults.database.max_connections))?
            .set_default("database.slow_statement_secs", defaults.database.slow_statement_secs as i64)?
            .set_default("matcher.recursion_limit", defaults.matcher.recursion_limit as i64)?
            .set_default("matcher.total_caching", "invalidate")?;
        if let Some(url) = defaults.database.url {
            builder = builder.set_default("database.url", url)?;
        }

        builder
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix("MATCHER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
