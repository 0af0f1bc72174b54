//! # langgraph-checkpoint-sqlite - SQLite Checkpoint Persistence
//!
//! A [`CheckpointSaver`](langgraph_checkpoint::CheckpointSaver) that stores graph
//! checkpoints in SQLite through `sqlx`.
//!
//! ## Storage Layout
//!
//! | Table | Contents |
//! |-------|----------|
//! | `checkpoint_migrations` | Applied schema versions |
//! | `checkpoints` | Checkpoint record and metadata, keyed by thread, namespace and id |
//! | `checkpoint_blobs` | Serialized channel values, keyed by channel and version |
//! | `checkpoint_writes` | Pending writes of a task against a checkpoint |
//!
//! Channel values are stored once per `(channel, version)`. A checkpoint only
//! records the versions it sees, so unchanged channels are shared between
//! consecutive checkpoints. On load, values are joined back in by version and
//! `pending_sends` is rebuilt from the parent checkpoint's
//! [`TASKS`](langgraph_checkpoint::TASKS) writes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use langgraph_checkpoint::{Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointSaver};
//! use langgraph_checkpoint_sqlite::SqliteSaver;
//! use std::collections::HashMap;
//!
//! # async fn run() -> langgraph_checkpoint::Result<()> {
//! let saver = SqliteSaver::connect("file://checkpoints.db").await?;
//! saver.setup().await?;
//!
//! let config = CheckpointConfig::for_thread("session-1");
//! let stored = saver
//!     .put(&config, Checkpoint::empty(), CheckpointMetadata::new(), HashMap::new())
//!     .await?;
//!
//! let latest = saver.get_tuple(&config).await?;
//! assert_eq!(latest.map(|t| t.config), Some(stored));
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! [`SqliteSaverConfig`] controls the pool. It can be built directly, from a
//! connection string ([`SqliteSaverConfig::from_conn_string`]) or from
//! environment variables ([`SqliteSaverConfig::from_env`]).

pub mod codec;
pub mod config;
pub mod db;
pub mod migrations;
pub mod saver;
pub mod search;
pub mod sql;

pub use config::SqliteSaverConfig;
pub use db::DatabasePool;
pub use migrations::MIGRATIONS;
pub use saver::SqliteSaver;
