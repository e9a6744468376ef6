//! Embedded SQLite storage bootstrap
//!
//! Owns the connection pool, pragma setup, and the embedded migration run.
//! Configuration validation and connection-string generation are pure; all
//! I/O is confined to `DatabaseConnection::initialize`.

use crate::domain_types::ConnectionPoolSize;
use nutype::nutype;
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Static migrator for the embedded `SQLite` migrations
static MIGRATOR: Migrator = sqlx::migrate!();

/// Database bootstrap error types
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error from `SQLx`
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// File system I/O error
    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("Configuration error: {field} - {reason}")]
    Configuration {
        /// Name of the invalid configuration field
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Migration failure
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Database result type
pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[nutype(
    validate(predicate = |path| !path.as_os_str().is_empty() && path.extension().is_some_and(|ext| ext == "db")),
    derive(Clone, Debug, Eq, PartialEq)
)]
pub struct DatabasePath(PathBuf);

impl DatabasePath {
    /// Creates a validated database path
    ///
    /// # Errors
    ///
    /// Returns an error if the path is empty or does not end in `.db`
    pub fn from_path<P: AsRef<Path>>(path: P) -> DatabaseResult<Self> {
        Self::try_new(path.as_ref().to_path_buf()).map_err(|_| DatabaseError::Configuration {
            field: "database_path",
            reason: "path is empty or has an invalid extension (must be .db)".to_string(),
        })
    }

    /// The path as a `PathBuf`
    #[must_use]
    pub fn as_path(&self) -> PathBuf {
        self.clone().into_inner()
    }

    /// Parent directory, created on initialization when missing
    #[must_use]
    pub fn parent_directory(&self) -> Option<PathBuf> {
        self.as_path().parent().map(Path::to_path_buf)
    }
}

impl std::fmt::Display for DatabasePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_path().display())
    }
}

/// Where the campaign store lives
#[derive(Clone, Debug, PartialEq, Eq)]
enum DatabaseLocation {
    File(DatabasePath),
    InMemory,
}

/// Database configuration with connection pool settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    location: DatabaseLocation,
    pool_size: ConnectionPoolSize,
    enable_wal_mode: bool,
}

impl DatabaseConfig {
    /// Config for a file-backed store with default settings
    #[must_use]
    pub fn new(path: DatabasePath) -> Self {
        Self {
            location: DatabaseLocation::File(path),
            pool_size: ConnectionPoolSize::default(),
            enable_wal_mode: true,
        }
    }

    /// Config for an in-memory store
    ///
    /// The pool is pinned to a single connection so every query sees the
    /// same in-memory database.
    ///
    /// # Panics
    ///
    /// Panics if pool size 1 cannot be created (the valid range is 1-100)
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            location: DatabaseLocation::InMemory,
            pool_size: ConnectionPoolSize::try_new(1).expect("pool size 1 is within 1-100"),
            enable_wal_mode: false,
        }
    }

    /// Builder: set connection pool size
    #[must_use]
    pub fn with_pool_size(mut self, pool_size: ConnectionPoolSize) -> Self {
        if !matches!(self.location, DatabaseLocation::InMemory) {
            self.pool_size = pool_size;
        }
        self
    }

    /// Builder: enable/disable WAL mode
    #[must_use]
    pub fn with_wal_mode(mut self, enable: bool) -> Self {
        self.enable_wal_mode = enable;
        self
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        let mut options = match &self.location {
            DatabaseLocation::File(path) => SqliteConnectOptions::new()
                .filename(path.as_path())
                .create_if_missing(true),
            DatabaseLocation::InMemory => SqliteConnectOptions::new().in_memory(true),
        };
        options = options.pragma("foreign_keys", "ON");
        if self.enable_wal_mode {
            options = options
                .pragma("journal_mode", "WAL")
                .pragma("synchronous", "NORMAL");
        }
        // The claim CAS relies on writers queueing rather than erroring.
        options.busy_timeout(std::time::Duration::from_secs(5))
    }
}

/// Database connection with managed pool
#[derive(Clone)]
pub struct DatabaseConnection {
    pool: Pool<Sqlite>,
}

impl DatabaseConnection {
    /// Opens the pool, applies pragmas, and runs embedded migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created, the pool
    /// cannot be opened, or a migration fails
    pub async fn initialize(config: DatabaseConfig) -> DatabaseResult<Self> {
        if let DatabaseLocation::File(path) = &config.location {
            if let Some(parent) = path.parent_directory() {
                tokio::fs::create_dir_all(&parent).await?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.pool_size.into_inner())
            .connect_with(config.connect_options())
            .await?;

        MIGRATOR.run(&pool).await?;
        info!("Database ready, schema current");

        Ok(Self { pool })
    }

    /// Convenience bootstrap for tests and ephemeral tooling
    ///
    /// # Errors
    ///
    /// Returns an error if initialization fails
    pub async fn in_memory() -> DatabaseResult<Self> {
        Self::initialize(DatabaseConfig::in_memory()).await
    }

    /// Access to the connection pool
    #[must_use]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}
