//! Checkpoint data model and the [`CheckpointSaver`] storage trait
//!
//! A graph run records a [`Checkpoint`] after every step. Each one captures channel
//! values and the version of every channel, and lives inside a
//! `(thread_id, checkpoint_ns)` scope. Saved checkpoints are the basis for resuming
//! interrupted runs, replaying history and forking from an earlier step.
//!
//! This crate has no storage of its own. Backends implement [`CheckpointSaver`]; the
//! SQLite backend is `langgraph-checkpoint-sqlite`.
//!
//! Channel values are opaque to a backend. They go through a [`SerializerProtocol`],
//! which produces a `(type_tag, bytes)` pair per value. [`JsonSerializer`] is the
//! default and [`BincodeSerializer`] the compact option.
//!
//! Writes to the channels in [`constants`] have fixed slots and overwrite each other.
//! Writes on [`TASKS`] become the `pending_sends` of the next checkpoint.

pub mod checkpoint;
pub mod constants;
pub mod error;
pub mod serializer;
pub mod traits;

pub use checkpoint::{
    ChannelVersion, ChannelVersions, Checkpoint, CheckpointConfig, CheckpointId,
    CheckpointMetadata, CheckpointSource, CheckpointTuple, PendingWrite,
};
pub use constants::{writes_idx, TASKS, WRITES_IDX_MAP};
pub use error::{CheckpointError, Result};
pub use serializer::{BincodeSerializer, JsonSerializer, SerializerProtocol};
pub use traits::{CheckpointSaver, CheckpointStream};
