//! Connection settings for [`SqliteSaver`](crate::SqliteSaver)

use langgraph_checkpoint::{CheckpointError, Result};
use serde::{Deserialize, Serialize};

/// URL of a private in-memory database
pub const IN_MEMORY_URL: &str = "sqlite::memory:";

/// Settings used to open the SQLite connection pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteSaverConfig {
    /// sqlx SQLite URL, e.g. `sqlite://checkpoints.db` or `sqlite::memory:`
    pub database_url: String,

    /// Maximum pooled connections. In-memory databases always use one.
    pub max_connections: u32,

    /// How long a statement waits on a locked database before failing
    pub busy_timeout_ms: u64,

    /// Create the database file when it does not exist
    pub create_if_missing: bool,

    /// Open file databases in WAL journal mode
    pub wal: bool,
}

impl Default for SqliteSaverConfig {
    fn default() -> Self {
        Self {
            database_url: IN_MEMORY_URL.to_string(),
            max_connections: 5,
            busy_timeout_ms: 5_000,
            create_if_missing: true,
            wal: true,
        }
    }
}

impl SqliteSaverConfig {
    /// Settings for the given sqlx URL, other fields at their defaults
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    /// Settings from a loose connection string
    ///
    /// Accepts `memory://...` (or an empty string) for an in-memory store,
    /// `file://<path>`, a `sqlite:` URL, or a bare file path.
    pub fn from_conn_string(conn_string: &str) -> Self {
        let conn_string = conn_string.trim();
        let url = if conn_string.is_empty()
            || conn_string.starts_with("memory://")
            || conn_string == ":memory:"
        {
            IN_MEMORY_URL.to_string()
        } else if conn_string.starts_with("sqlite:") {
            conn_string.to_string()
        } else if let Some(path) = conn_string.strip_prefix("file://") {
            format!("sqlite://{}", path)
        } else {
            format!("sqlite://{}", conn_string)
        };
        Self::new(url)
    }

    /// Load settings from `<PREFIX>_DATABASE_URL`, `<PREFIX>_MAX_CONNECTIONS`
    /// and `<PREFIX>_BUSY_TIMEOUT_MS`; unset variables keep their defaults.
    pub fn from_env(prefix: &str) -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var(format!("{}_DATABASE_URL", prefix)) {
            config = Self::from_conn_string(&url);
        }
        if let Some(max) = parse_env::<u32>(&format!("{}_MAX_CONNECTIONS", prefix))? {
            config.max_connections = max;
        }
        if let Some(timeout) = parse_env::<u64>(&format!("{}_BUSY_TIMEOUT_MS", prefix))? {
            config.busy_timeout_ms = timeout;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the maximum number of pooled connections
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Set the busy timeout in milliseconds
    pub fn with_busy_timeout_ms(mut self, busy_timeout_ms: u64) -> Self {
        self.busy_timeout_ms = busy_timeout_ms;
        self
    }

    /// Whether the URL addresses an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }

    /// Reject settings the pool cannot be opened with
    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(CheckpointError::Invalid("database_url is required".to_string()));
        }
        if self.max_connections == 0 {
            return Err(CheckpointError::Invalid(
                "max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|e| {
            CheckpointError::Invalid(format!(
                "Failed to parse environment variable '{}': {}",
                key, e
            ))
        }),
        Err(_) => Ok(None),
    }
}
