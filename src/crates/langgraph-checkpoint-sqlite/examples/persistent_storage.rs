//! Persist checkpoints across two saver sessions on the same database file
//!
//! Run with `RUST_LOG=debug cargo run --example persistent_storage` to see the
//! saver's tracing output.

use futures::TryStreamExt;
use langgraph_checkpoint::{
    ChannelVersion, Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver,
    CheckpointSource,
};
use langgraph_checkpoint_sqlite::SqliteSaver;
use serde_json::json;
use std::collections::HashMap;

const DB_PATH: &str = "./checkpoint-demo.db";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{}", DB_PATH, suffix));
    }

    let config = CheckpointConfig::for_thread("persistent-thread")
        .with_checkpoint_ns("demo".to_string());

    tracing::info!("Session 1: saving checkpoint");
    let saved = {
        let saver = SqliteSaver::connect(&format!("file://{}", DB_PATH)).await?;
        saver.setup().await?;

        let mut checkpoint = Checkpoint::new(
            "persistent-checkpoint-1".to_string(),
            HashMap::from([("test_key".to_string(), json!("persistent_value"))]),
            HashMap::from([("test_key".to_string(), ChannelVersion::Int(1))]),
            HashMap::new(),
        );
        checkpoint.versions_seen.insert(
            "test_key".to_string(),
            HashMap::from([("value".to_string(), ChannelVersion::Int(1))]),
        );
        let versions = checkpoint.channel_versions.clone();
        let metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Input)
            .with_step(1)
            .with_extra("writes".to_string(), json!(null));

        let saved = saver.put(&config, checkpoint, metadata, versions).await?;
        saver
            .put_writes(&saved, vec![("notes".to_string(), json!("first run"))], "task-1".to_string())
            .await?;
        saver.close().await;
        saved
    };

    tracing::info!("Session 2: reading checkpoint back");
    let saver = SqliteSaver::connect(&format!("file://{}", DB_PATH)).await?;
    saver.setup().await?;

    match saver.get_tuple(&config).await? {
        Some(tuple) => {
            println!("Retrieved checkpoint {}", tuple.checkpoint.id);
            println!("  channel values: {}", json!(tuple.checkpoint.channel_values));
            println!("  metadata: {}", serde_json::to_string(&tuple.metadata)?);
            println!("  pending writes: {:?}", tuple.pending_writes);
        }
        None => println!("No checkpoint found"),
    }

    let tuples: Vec<_> = saver.list(Some(&saved), None, None, None).await?.try_collect().await?;
    for tuple in &tuples {
        println!("- Checkpoint ID: {}", tuple.checkpoint.id);
    }

    saver.close().await;
    Ok(())
}
