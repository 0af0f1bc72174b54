//! Common test utilities and setup

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use langgraph_checkpoint::{
    ChannelVersion, Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver,
    CheckpointSource, CheckpointTuple,
};
use langgraph_checkpoint_sqlite::{SqliteSaver, SqliteSaverConfig};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

static TEST_DB_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Create a migrated saver on a file database with a unique name
pub async fn setup_test_saver() -> (TempDir, Arc<SqliteSaver>) {
    let (temp_dir, config) = test_config();
    let saver = SqliteSaver::with_config(config)
        .await
        .expect("Failed to open test database");
    saver.setup().await.expect("Failed to migrate test database");
    (temp_dir, Arc::new(saver))
}

/// Settings for a fresh database file inside a new temp dir
pub fn test_config() -> (TempDir, SqliteSaverConfig) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let counter = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    let db_path = temp_dir.path().join(format!("test_{}.db", counter));
    let config = SqliteSaverConfig::from_conn_string(&format!("file://{}", db_path.display()));
    (temp_dir, config)
}

/// Checkpoint with the given id, values and versions
pub fn checkpoint(id: &str, day: u32, values: &[(&str, serde_json::Value)], versions: &[(&str, i64)]) -> Checkpoint {
    let mut checkpoint = Checkpoint::new(
        id.to_string(),
        values
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
        versions
            .iter()
            .map(|(k, v)| (k.to_string(), ChannelVersion::Int(*v)))
            .collect(),
        HashMap::from([(
            "someKey3".to_string(),
            HashMap::from([("someKey4".to_string(), ChannelVersion::Int(day as i64 - 18))]),
        )]),
    );
    checkpoint.ts = Utc
        .with_ymd_and_hms(2024, 4, day, 17, 19, 7)
        .single()
        .expect("valid timestamp");
    checkpoint
}

/// First fixture: one value, two versioned channels
pub fn checkpoint1() -> Checkpoint {
    checkpoint(
        "1ef6d2b8-0000-6000-8000-000000000001",
        19,
        &[("someKey1", json!("someValue1"))],
        &[("someKey1", 1), ("someKey2", 1)],
    )
}

/// Second fixture: later id, bumps `someKey2`
pub fn checkpoint2() -> Checkpoint {
    checkpoint(
        "1ef6d2b8-0000-6000-8000-000000000002",
        20,
        &[("someKey1", json!("someValue2"))],
        &[("someKey1", 1), ("someKey2", 2)],
    )
}

pub fn update_metadata(step: i32) -> CheckpointMetadata {
    CheckpointMetadata::new()
        .with_source(CheckpointSource::Update)
        .with_step(step)
        .with_parents(HashMap::new())
        .with_extra("writes".to_string(), json!(null))
}

/// Save a checkpoint using its own versions as the new versions
pub async fn save(
    saver: &SqliteSaver,
    config: &CheckpointConfig,
    checkpoint: Checkpoint,
    metadata: CheckpointMetadata,
) -> CheckpointConfig {
    let versions = checkpoint.channel_versions.clone();
    saver
        .put(config, checkpoint, metadata, versions)
        .await
        .expect("Failed to save checkpoint")
}

/// Collect every tuple of a `list` call
pub async fn list_all(
    saver: &SqliteSaver,
    config: Option<&CheckpointConfig>,
    filter: Option<HashMap<String, serde_json::Value>>,
    before: Option<&CheckpointConfig>,
    limit: Option<usize>,
) -> Vec<CheckpointTuple> {
    saver
        .list(config, filter, before, limit)
        .await
        .expect("Failed to start listing")
        .try_collect()
        .await
        .expect("Failed to list checkpoints")
}

/// Ids of listed tuples, in stream order
pub fn ids(tuples: &[CheckpointTuple]) -> Vec<String> {
    tuples
        .iter()
        .filter_map(|t| t.config.checkpoint_id.clone())
        .collect()
}

pub async fn count_rows(saver: &SqliteSaver, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(saver.pool())
        .await
        .expect("Failed to count rows")
}
