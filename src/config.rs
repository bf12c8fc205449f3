use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_QUEUE_CAPACITY: usize = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Missing required configuration: {0}")]
    MissingError(String),
}

/// Application configuration.
///
/// Loaded from layered sources: `config/default.toml`, then
/// `config/<environment>.toml`, then `APP__`-prefixed environment
/// variables (e.g. `APP__DATABASE_URL`).
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL.
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of pooled connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Application environment.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging).
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup.
    #[serde(default)]
    pub auto_migrate: bool,

    /// Capacity of the in-memory report generation queue.
    #[serde(default = "default_queue_capacity")]
    pub report_queue_capacity: usize,
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_min_connections() -> u32 {
    DEFAULT_MIN_CONNECTIONS
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// Loads and validates the application configuration.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder();

    let default_path = Path::new(CONFIG_DIR).join("default.toml");
    if default_path.exists() {
        builder = builder.add_source(File::from(default_path));
    }

    let env_path = Path::new(CONFIG_DIR).join(format!("{}.toml", environment));
    if env_path.exists() {
        builder = builder.add_source(File::from(env_path));
    }

    let settings = builder
        .add_source(Environment::with_prefix("APP").separator("__"))
        .set_default("environment", environment.clone())?
        .build()?;

    let app_config: AppConfig = settings.try_deserialize()?;
    app_config.validate()?;

    info!(
        environment = %app_config.environment,
        auto_migrate = app_config.auto_migrate,
        "configuration loaded"
    );

    Ok(app_config)
}
