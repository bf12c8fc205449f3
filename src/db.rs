use crate::config::AppConfig;
use crate::errors::ServiceError;
use anyhow::Context;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::{debug, info};

/// Type alias for a database connection pool.
pub type DbPool = DatabaseConnection;

/// Configuration for database connection.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections.
    pub max_connections: u32,
    /// Minimum number of connections.
    pub min_connections: u32,
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Idle timeout duration.
    pub idle_timeout: Duration,
    /// Acquire connection timeout.
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            url: config.database_url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            ..Default::default()
        }
    }
}

/// Establishes a connection pool to the database.
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };

    establish_connection_with_config(&config).await
}

/// Establishes a connection pool with custom configuration.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!("configuring database connection: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    info!(
        max_connections = config.max_connections,
        "connecting to database"
    );

    Database::connect(opt).await.map_err(ServiceError::from)
}

/// Creates a database pool from `APP__DATABASE_URL` (or the loaded
/// configuration when the variable is absent). Used by tests and the
/// worker binary.
pub async fn create_db_pool() -> Result<DbPool, anyhow::Error> {
    let url = match std::env::var("APP__DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            crate::config::load_config()
                .context("no APP__DATABASE_URL and configuration loading failed")?
                .database_url
        }
    };
    establish_connection(&url)
        .await
        .context("failed to establish database connection")
}

/// Applies all pending migrations.
pub async fn run_migrations(db: &DbPool) -> Result<(), ServiceError> {
    info!("running database migrations");
    crate::migrator::Migrator::up(db, None)
        .await
        .map_err(ServiceError::from)
}
