//! The storage seam between graph execution and a persistence backend
//!
//! Execution decides when a checkpoint is taken and which metadata it carries.
//! A [`CheckpointSaver`] only lays the data out and reads it back.
//!
//! Contract shared by all backends:
//!
//! - A `(thread_id, checkpoint_ns)` pair is an independent history. Operations never
//!   read or modify rows of another scope.
//! - On [`put`](CheckpointSaver::put) the incoming `checkpoint_id` is the parent; the
//!   returned config addresses the stored checkpoint and is the parent of the next save.
//! - Lookups that find nothing return `Ok(None)` or an empty stream.
//! - Writes to the reserved channels in [`crate::constants`] replace earlier values.
//!   Other writes are stored once per `(task_id, idx)` and replays are ignored.
//! - A missing `thread_id` (or `checkpoint_id` where one is required) is
//!   [`CheckpointError::Invalid`](crate::CheckpointError::Invalid).
//!
//! ```rust,ignore
//! let latest = saver.get_tuple(&CheckpointConfig::for_thread("t1")).await?;
//! let next = saver.put(&latest_config, checkpoint, metadata, new_versions).await?;
//! let history: Vec<_> = saver.list(Some(&next), None, None, Some(10)).await?.try_collect().await?;
//! ```

use crate::{
    checkpoint::{
        ChannelVersions, Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple,
    },
    error::Result,
};
use async_trait::async_trait;
use futures::stream::Stream;
use std::collections::HashMap;
use std::pin::Pin;

/// Newest-first stream returned by [`CheckpointSaver::list`]
pub type CheckpointStream =
    Pin<Box<dyn Stream<Item = Result<CheckpointTuple>> + Send + 'static>>;

/// Persistence backend for checkpoints and their pending writes
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Checkpoint part of [`get_tuple`](Self::get_tuple)
    async fn get(&self, config: &CheckpointConfig) -> Result<Option<Checkpoint>> {
        Ok(self.get_tuple(config).await?.map(|tuple| tuple.checkpoint))
    }

    /// Load the checkpoint named by `config.checkpoint_id`, or the latest one of the
    /// scope when no id is given
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>>;

    /// Stream stored checkpoints, newest first
    ///
    /// `config` narrows by thread, namespace and id; without it every scope is listed.
    /// `filter` is a JSON document the stored metadata must contain. `before` keeps
    /// ids strictly below its `checkpoint_id`.
    async fn list(
        &self,
        config: Option<&CheckpointConfig>,
        filter: Option<HashMap<String, serde_json::Value>>,
        before: Option<&CheckpointConfig>,
        limit: Option<usize>,
    ) -> Result<CheckpointStream>;

    /// Atomically store a checkpoint and the channel values named in `new_versions`
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
        new_versions: ChannelVersions,
    ) -> Result<CheckpointConfig>;

    /// Attach a task's `(channel, value)` writes to the checkpoint in `config`
    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, serde_json::Value)>,
        task_id: String,
    ) -> Result<()>;

    /// Delete one checkpoint, its writes and the channel blobs no other checkpoint uses
    ///
    /// `config.checkpoint_id` is required.
    async fn delete(&self, config: &CheckpointConfig) -> Result<()>;

    /// Delete all checkpoints, writes and blobs of a `(thread_id, checkpoint_ns)` scope
    async fn delete_thread(&self, thread_id: &str, checkpoint_ns: &str) -> Result<()>;
}
