//! Ordered schema migrations
//!
//! The version of a migration is its index in [`MIGRATIONS`]. Applied
//! versions are recorded in `checkpoint_migrations`; a database without that
//! table is at version `-1`. Entries are append-only.

use crate::db::{self, db_err, DatabasePool};
use langgraph_checkpoint::Result;
use sqlx::{Executor, Sqlite, SqliteConnection};
use tracing::{debug, info};

pub const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS checkpoint_migrations (
    v INTEGER PRIMARY KEY
)",
    "CREATE TABLE IF NOT EXISTS checkpoints (
    thread_id TEXT NOT NULL,
    checkpoint_ns TEXT NOT NULL DEFAULT '',
    checkpoint_id TEXT NOT NULL,
    parent_checkpoint_id TEXT,
    type TEXT,
    checkpoint TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    PRIMARY KEY (thread_id, checkpoint_ns, checkpoint_id)
)",
    "CREATE TABLE IF NOT EXISTS checkpoint_blobs (
    thread_id TEXT NOT NULL,
    checkpoint_ns TEXT NOT NULL DEFAULT '',
    channel TEXT NOT NULL,
    version TEXT NOT NULL,
    type TEXT NOT NULL,
    blob BLOB,
    PRIMARY KEY (thread_id, checkpoint_ns, channel, version)
)",
    "CREATE TABLE IF NOT EXISTS checkpoint_writes (
    thread_id TEXT NOT NULL,
    checkpoint_ns TEXT NOT NULL DEFAULT '',
    checkpoint_id TEXT NOT NULL,
    task_id TEXT NOT NULL,
    idx INTEGER NOT NULL,
    channel TEXT NOT NULL,
    type TEXT,
    blob BLOB NOT NULL,
    PRIMARY KEY (thread_id, checkpoint_ns, checkpoint_id, task_id, idx)
)",
    "CREATE INDEX IF NOT EXISTS checkpoints_thread_id_idx ON checkpoints(thread_id)",
    "CREATE INDEX IF NOT EXISTS checkpoint_blobs_thread_id_idx ON checkpoint_blobs(thread_id)",
    "CREATE INDEX IF NOT EXISTS checkpoint_writes_thread_id_idx ON checkpoint_writes(thread_id)",
];

const SELECT_MIGRATION_VERSION_SQL: &str =
    "SELECT v FROM checkpoint_migrations ORDER BY v DESC LIMIT 1";

const INSERT_MIGRATION_VERSION_SQL: &str = "INSERT INTO checkpoint_migrations (v) VALUES (?1)";

const MISSING_MIGRATIONS_TABLE: &str = "no such table: checkpoint_migrations";

/// Highest applied migration, `-1` for a fresh database
pub async fn current_version(pool: &DatabasePool) -> Result<i64> {
    read_version(pool).await
}

async fn read_version<'e, E>(executor: E) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    match sqlx::query_scalar::<_, i64>(SELECT_MIGRATION_VERSION_SQL)
        .fetch_optional(executor)
        .await
    {
        Ok(version) => Ok(version.unwrap_or(-1)),
        Err(sqlx::Error::Database(e)) if is_missing_migrations_table(e.message()) => Ok(-1),
        Err(e) => Err(db_err("read migration version")(e)),
    }
}

fn is_missing_migrations_table(message: &str) -> bool {
    message.contains(MISSING_MIGRATIONS_TABLE)
}

/// Apply every migration above the recorded version, each in its own transaction
///
/// Each transaction takes the write lock before re-reading the version, so
/// sessions migrating the same file at once apply every version exactly once.
/// Returns the number of migrations this call applied; `0` when the schema is current.
pub async fn run_migrations(pool: &DatabasePool) -> Result<usize> {
    let current = current_version(pool).await?;
    let mut applied = 0;

    for (version, statement) in MIGRATIONS.iter().enumerate() {
        let version = version as i64;
        if version <= current {
            continue;
        }

        let mut conn = db::begin_immediate(pool).await?;
        let outcome = apply(&mut conn, version, statement).await;
        if db::finish_immediate(conn, outcome, "migrate").await? {
            info!(version, "Applied checkpoint migration");
            applied += 1;
        } else {
            debug!(version, "Checkpoint migration already applied");
        }
    }

    if applied > 0 {
        info!(
            applied,
            version = MIGRATIONS.len() as i64 - 1,
            "Checkpoint schema migrated"
        );
    }
    Ok(applied)
}

/// Apply `statement` unless another session recorded `version` first
async fn apply(conn: &mut SqliteConnection, version: i64, statement: &str) -> Result<bool> {
    if read_version(&mut *conn).await? >= version {
        return Ok(false);
    }
    sqlx::query(statement)
        .execute(&mut *conn)
        .await
        .map_err(db_err("apply migration"))?;
    sqlx::query(INSERT_MIGRATION_VERSION_SQL)
        .bind(version)
        .execute(&mut *conn)
        .await
        .map_err(db_err("record migration version"))?;
    Ok(true)
}
