//! Connection pool and transaction helpers

use crate::config::SqliteSaverConfig;
use langgraph_checkpoint::{CheckpointError, Result};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Type alias for the database connection pool
pub type DatabasePool = SqlitePool;

/// Open a connection pool with the given settings
pub(crate) async fn connect(config: &SqliteSaverConfig) -> Result<DatabasePool> {
    config.validate()?;

    let journal_mode = if config.wal && !config.is_in_memory() {
        SqliteJournalMode::Wal
    } else {
        SqliteJournalMode::Memory
    };
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .map_err(db_err("parse database url"))?
        .create_if_missing(config.create_if_missing)
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .journal_mode(journal_mode);

    debug!(url = %config.database_url, "Connecting to checkpoint database");

    // An in-memory database lives as long as its connections do, and its
    // shared-cache table locks ignore the busy timeout: keep exactly one
    // connection open for the lifetime of the pool.
    let pool_options = if config.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(config.max_connections)
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .map_err(db_err("connect to database"))?;

    info!(url = %config.database_url, "Checkpoint database connection established");
    Ok(pool)
}

/// Map a sqlx error to a storage error carrying the failed operation
pub(crate) fn db_err(context: &'static str) -> impl FnOnce(sqlx::Error) -> CheckpointError {
    move |e| CheckpointError::Storage(format!("Failed to {}: {}", context, e))
}

/// Begin a transaction on the pool
pub(crate) async fn begin(pool: &DatabasePool) -> Result<Transaction<'static, Sqlite>> {
    pool.begin().await.map_err(db_err("begin transaction"))
}

/// Commit `tx` when `outcome` succeeded, otherwise roll it back and return the original error
pub(crate) async fn finish<T>(
    tx: Transaction<'static, Sqlite>,
    outcome: Result<T>,
    operation: &'static str,
) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await.map_err(db_err("commit transaction"))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(operation, error = %rollback_err, "Rollback failed");
            } else {
                debug!(operation, error = %err, "Transaction rolled back");
            }
            Err(err)
        }
    }
}

/// Acquire a connection and open a `BEGIN IMMEDIATE` transaction on it
///
/// The write lock is taken up front, so reads made inside the transaction
/// cannot be invalidated by another writer before the first write. Waiting for
/// the lock honours the configured busy timeout.
pub(crate) async fn begin_immediate(pool: &DatabasePool) -> Result<PoolConnection<Sqlite>> {
    let mut conn = pool.acquire().await.map_err(db_err("acquire connection"))?;
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut *conn)
        .await
        .map_err(db_err("begin immediate transaction"))?;
    Ok(conn)
}

/// [`finish`] for a connection opened with [`begin_immediate`]
pub(crate) async fn finish_immediate<T>(
    mut conn: PoolConnection<Sqlite>,
    outcome: Result<T>,
    operation: &'static str,
) -> Result<T> {
    let outcome = match outcome {
        Ok(value) => match sqlx::query("COMMIT").execute(&mut *conn).await {
            Ok(_) => return Ok(value),
            Err(e) => Err(db_err("commit transaction")(e)),
        },
        Err(err) => Err(err),
    };

    match sqlx::query("ROLLBACK").execute(&mut *conn).await {
        Ok(_) => debug!(operation, "Transaction rolled back"),
        Err(rollback_err) => {
            warn!(operation, error = %rollback_err, "Rollback failed");
            // Never hand a connection with an open transaction back to the pool
            drop(conn.detach());
        }
    }
    outcome
}
