//! SQLite implementation of [`CheckpointSaver`]

use crate::codec::{self, try_get};
use crate::config::SqliteSaverConfig;
use crate::db::{self, db_err, DatabasePool};
use crate::migrations;
use crate::search::{bind_params, metadata_contains, SearchWhere, SqlParam};
use crate::sql;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use langgraph_checkpoint::constants::{is_reserved, TASKS};
use langgraph_checkpoint::{
    ChannelVersions, Checkpoint, CheckpointConfig, CheckpointError, CheckpointMetadata,
    CheckpointSaver, CheckpointStream, CheckpointTuple, JsonSerializer, Result,
    SerializerProtocol,
};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Checkpoint saver backed by a SQLite database
///
/// Call [`setup`](Self::setup) once before first use to create the schema.
/// The saver is cheap to share behind an `Arc`; all operations go through an
/// internal connection pool.
///
/// ```rust,no_run
/// use langgraph_checkpoint_sqlite::SqliteSaver;
///
/// # async fn run() -> langgraph_checkpoint::Result<()> {
/// let saver = SqliteSaver::connect("sqlite://checkpoints.db").await?;
/// saver.setup().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SqliteSaver {
    pool: Arc<DatabasePool>,
    serde: Arc<dyn SerializerProtocol>,
    is_setup: AtomicBool,
}

/// A checkpoint row with its record columns decoded
struct CheckpointRow {
    thread_id: String,
    checkpoint_ns: String,
    checkpoint_id: String,
    parent_checkpoint_id: Option<String>,
    checkpoint: Value,
    metadata: Value,
}

impl CheckpointRow {
    fn from_row(row: &SqliteRow) -> Result<Self> {
        let checkpoint: String = try_get(row, "checkpoint")?;
        let metadata: String = try_get(row, "metadata")?;
        Ok(Self {
            thread_id: try_get(row, "thread_id")?,
            checkpoint_ns: try_get(row, "checkpoint_ns")?,
            checkpoint_id: try_get(row, "checkpoint_id")?,
            parent_checkpoint_id: try_get(row, "parent_checkpoint_id")?,
            checkpoint: serde_json::from_str(&checkpoint)?,
            metadata: serde_json::from_str(&metadata)?,
        })
    }
}

impl SqliteSaver {
    /// Connect to `database_url` with default settings and the JSON serializer
    pub async fn connect(database_url: &str) -> Result<Self> {
        Self::with_config(SqliteSaverConfig::from_conn_string(database_url)).await
    }

    /// Connect with explicit settings
    pub async fn with_config(config: SqliteSaverConfig) -> Result<Self> {
        let pool = db::connect(&config).await?;
        Ok(Self::from_pool(pool, Arc::new(JsonSerializer::new())))
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: DatabasePool, serde: Arc<dyn SerializerProtocol>) -> Self {
        Self {
            pool: Arc::new(pool),
            serde,
            is_setup: AtomicBool::new(false),
        }
    }

    /// Replace the serializer used for channel values and writes
    pub fn with_serde(mut self, serde: Arc<dyn SerializerProtocol>) -> Self {
        self.serde = serde;
        self
    }

    /// The underlying connection pool
    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Whether [`setup`](Self::setup) has completed on this saver
    pub fn is_setup(&self) -> bool {
        self.is_setup.load(Ordering::Acquire)
    }

    /// Create or upgrade the schema. Safe to call repeatedly and from several
    /// sessions at once; each migration is applied under the write lock and
    /// recorded in the same transaction.
    #[instrument(skip(self), err)]
    pub async fn setup(&self) -> Result<()> {
        self.ensure_open()?;
        migrations::run_migrations(&self.pool).await?;
        self.is_setup.store(true, Ordering::Release);
        Ok(())
    }

    /// Close the pool. Every later operation fails with [`CheckpointError::Closed`].
    pub async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            info!("Checkpoint saver closed");
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.pool.is_closed() {
            Err(CheckpointError::Closed)
        } else {
            Ok(())
        }
    }

    async fn put_rows(
        conn: &mut SqliteConnection,
        serde: &dyn SerializerProtocol,
        config: &CheckpointConfig,
        thread_id: &str,
        checkpoint: &Checkpoint,
        metadata: &CheckpointMetadata,
        new_versions: &ChannelVersions,
    ) -> Result<()> {
        let ns = config.namespace();

        for blob in codec::dump_blobs(serde, &checkpoint.channel_values, new_versions)? {
            sqlx::query(sql::UPSERT_CHECKPOINT_BLOBS_SQL)
                .bind(thread_id)
                .bind(ns)
                .bind(&blob.channel)
                .bind(&blob.version)
                .bind(&blob.type_tag)
                .bind(blob.blob)
                .execute(&mut *conn)
                .await
                .map_err(db_err("insert channel blob"))?;
        }

        sqlx::query(sql::UPSERT_CHECKPOINTS_SQL)
            .bind(thread_id)
            .bind(ns)
            .bind(&checkpoint.id)
            .bind(given(config.checkpoint_id.as_ref()))
            .bind(codec::dump_checkpoint(checkpoint)?)
            .bind(codec::dump_metadata(metadata)?)
            .execute(&mut *conn)
            .await
            .map_err(db_err("save checkpoint"))?;

        Ok(())
    }

    async fn write_rows(
        conn: &mut SqliteConnection,
        statement: &str,
        key: (&str, &str, &str, &str),
        rows: Vec<codec::WriteRow>,
    ) -> Result<()> {
        let (thread_id, ns, checkpoint_id, task_id) = key;
        for row in rows {
            sqlx::query(statement)
                .bind(thread_id)
                .bind(ns)
                .bind(checkpoint_id)
                .bind(task_id)
                .bind(row.idx)
                .bind(row.channel)
                .bind(row.type_tag)
                .bind(row.blob)
                .execute(&mut *conn)
                .await
                .map_err(db_err("save pending write"))?;
        }
        Ok(())
    }

    async fn delete_rows(
        conn: &mut SqliteConnection,
        thread_id: &str,
        ns: &str,
        checkpoint_id: &str,
    ) -> Result<()> {
        sqlx::query(sql::DELETE_CHECKPOINT_WRITES_SQL)
            .bind(thread_id)
            .bind(ns)
            .bind(checkpoint_id)
            .execute(&mut *conn)
            .await
            .map_err(db_err("delete checkpoint writes"))?;

        let siblings: Vec<String> = sqlx::query_scalar(sql::SELECT_SIBLING_PAYLOADS_SQL)
            .bind(thread_id)
            .bind(ns)
            .bind(checkpoint_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(db_err("read sibling checkpoints"))?;
        let live = serde_json::to_string(&codec::referenced_versions(&siblings)?)?;

        let orphans = sqlx::query(sql::DELETE_ORPHAN_BLOBS_SQL)
            .bind(thread_id)
            .bind(ns)
            .bind(live)
            .execute(&mut *conn)
            .await
            .map_err(db_err("delete orphaned blobs"))?;
        debug!(removed = orphans.rows_affected(), "Removed unreferenced channel blobs");

        sqlx::query(sql::DELETE_CHECKPOINT_SQL)
            .bind(thread_id)
            .bind(ns)
            .bind(checkpoint_id)
            .execute(&mut *conn)
            .await
            .map_err(db_err("delete checkpoint"))?;

        Ok(())
    }

    async fn delete_thread_rows(conn: &mut SqliteConnection, thread_id: &str, ns: &str) -> Result<()> {
        for (statement, context) in [
            (sql::DELETE_THREAD_WRITES_SQL, "delete thread writes"),
            (sql::DELETE_THREAD_BLOBS_SQL, "delete thread blobs"),
            (sql::DELETE_THREAD_CHECKPOINTS_SQL, "delete thread checkpoints"),
        ] {
            sqlx::query(statement)
                .bind(thread_id)
                .bind(ns)
                .execute(&mut *conn)
                .await
                .map_err(db_err(context))?;
        }
        Ok(())
    }
}

/// Load the blobs, writes and sends of a checkpoint row into a tuple
async fn assemble(
    pool: &DatabasePool,
    serde: &dyn SerializerProtocol,
    row: CheckpointRow,
) -> Result<CheckpointTuple> {
    let CheckpointRow {
        thread_id,
        checkpoint_ns,
        checkpoint_id,
        parent_checkpoint_id,
        checkpoint,
        metadata,
    } = row;

    let versions = Value::Object(codec::version_keys(&checkpoint)).to_string();
    let blob_rows = sqlx::query(sql::SELECT_CHANNEL_VALUES_SQL)
        .bind(&thread_id)
        .bind(&checkpoint_ns)
        .bind(versions)
        .fetch_all(pool)
        .await
        .map_err(db_err("load channel values"))?;

    let write_rows = sqlx::query(sql::SELECT_PENDING_WRITES_SQL)
        .bind(&thread_id)
        .bind(&checkpoint_ns)
        .bind(&checkpoint_id)
        .fetch_all(pool)
        .await
        .map_err(db_err("load pending writes"))?;

    let pending_sends = match &parent_checkpoint_id {
        Some(parent_id) => {
            let rows = sqlx::query(sql::SELECT_PENDING_SENDS_SQL)
                .bind(&thread_id)
                .bind(&checkpoint_ns)
                .bind(parent_id)
                .bind(TASKS)
                .fetch_all(pool)
                .await
                .map_err(db_err("load pending sends"))?;
            codec::load_sends(serde, &rows)?
        }
        None => Vec::new(),
    };

    let mut checkpoint: Checkpoint = serde_json::from_value(checkpoint)?;
    checkpoint.channel_values = codec::load_blobs(serde, &blob_rows)?;
    checkpoint.pending_sends = pending_sends;

    let metadata: CheckpointMetadata = serde_json::from_value(serde.normalize(&metadata)?)?;

    let mut tuple = CheckpointTuple::new(
        CheckpointConfig::for_checkpoint(&thread_id, &checkpoint_ns, &checkpoint_id),
        checkpoint,
        metadata,
    )
    .with_pending_writes(codec::load_writes(serde, &write_rows)?);

    if let Some(parent_id) = parent_checkpoint_id {
        tuple = tuple.with_parent_config(CheckpointConfig::for_checkpoint(
            thread_id,
            checkpoint_ns,
            parent_id,
        ));
    }

    Ok(tuple)
}

/// An empty id counts as absent
fn given(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}

fn required<'a>(value: Option<&'a String>, what: &str) -> Result<&'a str> {
    given(value)
        .ok_or_else(|| CheckpointError::Invalid(format!("{} is required", what)))
}

#[async_trait]
impl CheckpointSaver for SqliteSaver {
    #[instrument(skip(self), fields(thread_id = ?config.thread_id), err)]
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        self.ensure_open()?;
        let thread_id = required(config.thread_id.as_ref(), "thread_id")?;

        let mut search = SearchWhere::new();
        let clause = format!(
            "WHERE thread_id = {} AND checkpoint_ns = {}",
            search.bind(SqlParam::Text(thread_id.to_string())),
            search.bind(SqlParam::Text(config.namespace().to_string())),
        );
        let statement = match given(config.checkpoint_id.as_ref()) {
            Some(id) => format!(
                "{} {} AND checkpoint_id = {}",
                sql::SELECT_CHECKPOINTS_SQL,
                clause,
                search.bind(SqlParam::Text(id.to_string()))
            ),
            None => format!(
                "{} {} ORDER BY checkpoint_id DESC LIMIT 1",
                sql::SELECT_CHECKPOINTS_SQL,
                clause
            ),
        };

        let row = bind_params(sqlx::query(&statement), search.params())
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(db_err("load checkpoint"))?;

        match row {
            Some(row) => {
                let row = CheckpointRow::from_row(&row)?;
                Ok(Some(assemble(&self.pool, self.serde.as_ref(), row).await?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, filter), err)]
    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream> {
        self.ensure_open()?;

        let mut search = SearchWhere::for_list(config, filter.as_ref(), before);
        let residual = search.residual().cloned();

        let mut statement = format!(
            "{} {} ORDER BY checkpoint_id DESC",
            sql::SELECT_CHECKPOINTS_SQL,
            search.where_sql()
        );
        // With a residual filter the limit counts matches, so it is applied while streaming
        if let (Some(limit), None) = (limit, &residual) {
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            statement.push_str(&format!(" LIMIT {}", search.bind(SqlParam::Int(limit))));
        }

        let rows = bind_params(sqlx::query(&statement), search.params())
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(db_err("list checkpoints"))?;
        let rows = rows
            .iter()
            .map(CheckpointRow::from_row)
            .collect::<Result<Vec<_>>>()?;
        debug!(rows = rows.len(), residual = residual.is_some(), "Listing checkpoints");

        let pool = Arc::clone(&self.pool);
        let serde = Arc::clone(&self.serde);
        let tuples = stream::iter(rows)
            .filter(move |row| {
                let keep = residual
                    .as_ref()
                    .map_or(true, |f| metadata_contains(&row.metadata, f));
                futures::future::ready(keep)
            })
            .take(limit.unwrap_or(usize::MAX))
            .then(move |row| {
                let pool = Arc::clone(&pool);
                let serde = Arc::clone(&serde);
                async move { assemble(&pool, serde.as_ref(), row).await }
            });

        Ok(Box::pin(tuples))
    }

    #[instrument(
        skip(self, checkpoint, metadata, new_versions),
        fields(thread_id = ?config.thread_id, checkpoint_id = %checkpoint.id),
        err
    )]
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
        new_versions: ChannelVersions,
    ) -> Result<CheckpointConfig> {
        self.ensure_open()?;
        let thread_id = required(config.thread_id.as_ref(), "thread_id")?;

        let mut tx = db::begin(&self.pool).await?;
        let outcome = Self::put_rows(
            &mut tx,
            self.serde.as_ref(),
            config,
            thread_id,
            &checkpoint,
            &metadata,
            &new_versions,
        )
        .await;
        db::finish(tx, outcome, "put").await?;

        debug!(blobs = new_versions.len(), "Checkpoint saved");
        Ok(CheckpointConfig::for_checkpoint(
            thread_id,
            config.namespace(),
            checkpoint.id,
        ))
    }

    #[instrument(
        skip(self, writes),
        fields(thread_id = ?config.thread_id, checkpoint_id = ?config.checkpoint_id, writes = writes.len()),
        err
    )]
    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, Value)>,
        task_id: String,
    ) -> Result<()> {
        self.ensure_open()?;
        let thread_id = required(config.thread_id.as_ref(), "thread_id")?;
        let checkpoint_id = required(config.checkpoint_id.as_ref(), "checkpoint_id")?;
        if writes.is_empty() {
            return Ok(());
        }

        // A batch made only of reserved channels replaces earlier values,
        // anything else keeps the first stored write per slot.
        let statement = if writes.iter().all(|(channel, _)| is_reserved(channel)) {
            sql::UPSERT_CHECKPOINT_WRITES_SQL
        } else {
            sql::INSERT_CHECKPOINT_WRITES_SQL
        };
        let rows = codec::dump_writes(self.serde.as_ref(), &writes)?;

        let mut tx = db::begin(&self.pool).await?;
        let outcome = Self::write_rows(
            &mut tx,
            statement,
            (thread_id, config.namespace(), checkpoint_id, &task_id),
            rows,
        )
        .await;
        db::finish(tx, outcome, "put_writes").await
    }

    #[instrument(
        skip(self),
        fields(thread_id = ?config.thread_id, checkpoint_id = ?config.checkpoint_id),
        err
    )]
    async fn delete(&self, config: &CheckpointConfig) -> Result<()> {
        self.ensure_open()?;
        let thread_id = required(config.thread_id.as_ref(), "thread_id")?;
        let checkpoint_id = required(config.checkpoint_id.as_ref(), "checkpoint_id")?;

        let mut tx = db::begin(&self.pool).await?;
        let outcome = Self::delete_rows(&mut tx, thread_id, config.namespace(), checkpoint_id).await;
        db::finish(tx, outcome, "delete").await
    }

    #[instrument(skip(self), err)]
    async fn delete_thread(&self, thread_id: &str, checkpoint_ns: &str) -> Result<()> {
        self.ensure_open()?;
        if thread_id.is_empty() {
            return Err(CheckpointError::Invalid("thread_id is required".to_string()));
        }

        let mut tx = db::begin(&self.pool).await?;
        let outcome = Self::delete_thread_rows(&mut tx, thread_id, checkpoint_ns).await;
        db::finish(tx, outcome, "delete_thread").await?;

        info!("Thread history deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn saver() -> SqliteSaver {
        let saver = SqliteSaver::connect("memory://").await.unwrap();
        saver.setup().await.unwrap();
        saver
    }

    #[tokio::test]
    async fn test_setup_marks_saver_ready() {
        let saver = SqliteSaver::connect("memory://").await.unwrap();
        assert!(!saver.is_setup());
        saver.setup().await.unwrap();
        saver.setup().await.unwrap();
        assert!(saver.is_setup());
    }

    #[tokio::test]
    async fn test_missing_thread_id_is_invalid() {
        let saver = saver().await;
        let config = CheckpointConfig::new();

        let err = saver
            .put(&config, Checkpoint::empty(), CheckpointMetadata::new(), HashMap::new())
            .await
            .unwrap_err();
        assert!(err.is_invalid());
        assert!(saver.get_tuple(&config).await.unwrap_err().is_invalid());
    }

    #[tokio::test]
    async fn test_put_writes_requires_checkpoint_id() {
        let saver = saver().await;
        let err = saver
            .put_writes(
                &CheckpointConfig::for_thread("t"),
                vec![("a".into(), json!(1))],
                "task".into(),
            )
            .await
            .unwrap_err();
        assert!(err.is_invalid());
    }

    #[tokio::test]
    async fn test_operations_fail_after_close() {
        let saver = saver().await;
        saver.close().await;
        saver.close().await;

        let config = CheckpointConfig::for_thread("t");
        assert!(matches!(
            saver.get_tuple(&config).await,
            Err(CheckpointError::Closed)
        ));
        assert!(matches!(
            saver.list(None, None, None, None).await,
            Err(CheckpointError::Closed)
        ));
        assert!(matches!(saver.setup().await, Err(CheckpointError::Closed)));
    }

    #[tokio::test]
    async fn test_stored_checkpoint_record_keeps_values_out() {
        let saver = saver().await;
        let mut checkpoint = Checkpoint::empty();
        checkpoint.channel_values.insert("a".into(), json!("big value"));
        checkpoint.channel_versions.insert("a".into(), 1.into());
        let versions = checkpoint.channel_versions.clone();

        saver
            .put(&CheckpointConfig::for_thread("t"), checkpoint, CheckpointMetadata::new(), versions)
            .await
            .unwrap();

        let record: String = sqlx::query_scalar("SELECT checkpoint FROM checkpoints")
            .fetch_one(saver.pool())
            .await
            .unwrap();
        assert!(!record.contains("big value"));

        let version: String = sqlx::query_scalar("SELECT version FROM checkpoint_blobs")
            .fetch_one(saver.pool())
            .await
            .unwrap();
        assert_eq!(version, "1");
    }

    #[tokio::test]
    async fn test_empty_ids_are_treated_as_absent() {
        let saver = saver().await;
        let mut parent = CheckpointConfig::for_thread("t").with_checkpoint_id("");
        for id in ["c1", "c2"] {
            let mut checkpoint = Checkpoint::empty();
            checkpoint.id = id.to_string();
            parent = saver
                .put(&parent, checkpoint, CheckpointMetadata::new(), HashMap::new())
                .await
                .unwrap();
        }

        let first = saver
            .get_tuple(&CheckpointConfig::for_checkpoint("t", "", "c1"))
            .await
            .unwrap()
            .unwrap();
        assert!(first.parent_config.is_none());

        let latest = saver
            .get_tuple(&CheckpointConfig::for_thread("t").with_checkpoint_id(""))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.checkpoint.id, "c2");

        let listed: Vec<_> = saver
            .list(Some(&CheckpointConfig::for_checkpoint("t", "", "")), None, None, None)
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(listed.len(), 2);

        let no_thread = CheckpointConfig::for_thread("");
        assert!(saver.get_tuple(&no_thread).await.unwrap_err().is_invalid());
    }
}
