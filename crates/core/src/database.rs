use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use waypoint_common::{Result, WaypointError};

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL or file path
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    pub min_connections: u32,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Maximum lifetime of a connection
    pub max_lifetime: Option<Duration>,
    /// Idle timeout for connections
    pub idle_timeout: Option<Duration>,
    /// Enable WAL mode for better concurrency
    pub enable_wal_mode: bool,
    /// Enable foreign key constraints
    pub enable_foreign_keys: bool,
    /// SQLite synchronous mode
    pub synchronous_mode: SqliteSynchronous,
    /// Run migrations on startup
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:./data/waypoint.db".to_string(),
            max_connections: 20,
            min_connections: 2,
            connect_timeout: Duration::from_secs(30),
            max_lifetime: Some(Duration::from_secs(3600)), // 1 hour
            idle_timeout: Some(Duration::from_secs(600)),  // 10 minutes
            enable_wal_mode: true,
            enable_foreign_keys: true,
            synchronous_mode: SqliteSynchronous::Normal,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    pub fn with_url(mut self, database_url: impl Into<String>) -> Self {
        self.database_url = database_url.into();
        self
    }

    /// Single-connection in-memory database. Every pooled connection to
    /// `:memory:` would otherwise see its own empty database.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            max_lifetime: None,
            idle_timeout: None,
            enable_wal_mode: false,
            ..Self::default()
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:")
    }
}

pub(crate) fn db_error(context: &str, err: sqlx::Error) -> WaypointError {
    WaypointError::Database(format!("{}: {}", context, err))
}

/// Database connection pool manager
pub struct DatabaseManager {
    pool: SqlitePool,
    config: DatabaseConfig,
}

impl DatabaseManager {
    /// Create a new database manager with configuration
    #[instrument(skip(config))]
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        info!("Initializing database connection pool");

        if !config.is_in_memory() {
            let file_path = config
                .database_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(file_path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        WaypointError::Database(format!(
                            "Failed to create database directory: {}",
                            e
                        ))
                    })?;
                }
            }
        }

        let mut connect_options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| db_error("Invalid database URL", e))?
            .create_if_missing(true)
            .foreign_keys(config.enable_foreign_keys)
            .synchronous(config.synchronous_mode);

        if config.enable_wal_mode {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .max_lifetime(config.max_lifetime)
            .idle_timeout(config.idle_timeout);

        if config.is_in_memory() {
            pool_options = pool_options.test_before_acquire(false);
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| db_error("Failed to create connection pool", e))?;

        let manager = Self { pool, config };

        if manager.config.auto_migrate {
            manager.run_migrations().await?;
        }

        let health = manager.health_check().await?;
        if !health.is_healthy {
            warn!("Database reachable but reporting degraded health: {:?}", health);
        }

        info!("Database connection pool initialized successfully");
        Ok(manager)
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| WaypointError::Database(format!("Migration failed: {}", e)))?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Perform health check on the database connection
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<DatabaseHealth> {
        debug!("Performing database health check");

        let start_time = std::time::Instant::now();
        let connectivity_result = sqlx::query("SELECT 1").fetch_one(&self.pool).await;
        let connectivity_time = start_time.elapsed();

        if let Err(e) = connectivity_result {
            error!("Database connectivity check failed: {}", e);
            return Ok(DatabaseHealth {
                is_healthy: false,
                connectivity_ms: connectivity_time.as_millis() as u64,
                pool_stats: self.get_pool_stats(),
                error_message: Some("Connectivity check failed".to_string()),
            });
        }

        let pool_stats = self.get_pool_stats();
        let is_healthy = connectivity_time < Duration::from_millis(1000);

        let health = DatabaseHealth {
            is_healthy,
            connectivity_ms: connectivity_time.as_millis() as u64,
            pool_stats,
            error_message: None,
        };

        if health.is_healthy {
            debug!("Database health check passed");
        } else {
            warn!("Database health check indicates degraded performance");
        }

        Ok(health)
    }

    pub fn get_pool_stats(&self) -> PoolStats {
        PoolStats {
            connections_total: self.pool.size(),
            connections_idle: self.pool.num_idle() as u32,
        }
    }

    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}

/// Database health information
#[derive(Debug, Clone, serde::Serialize)]
pub struct DatabaseHealth {
    pub is_healthy: bool,
    pub connectivity_ms: u64,
    pub pool_stats: PoolStats,
    pub error_message: Option<String>,
}

/// Connection pool statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    pub connections_total: u32,
    pub connections_idle: u32,
}

/// Database utility functions
pub struct DatabaseUtils;

impl DatabaseUtils {
    /// Escape SQL LIKE pattern
    pub fn escape_like_pattern(pattern: &str) -> String {
        pattern
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_")
    }

    /// `%term%` for a substring match, to be used with `ESCAPE '\'`.
    pub fn contains_pattern(term: &str) -> String {
        format!("%{}%", Self::escape_like_pattern(term.trim()))
    }
}
