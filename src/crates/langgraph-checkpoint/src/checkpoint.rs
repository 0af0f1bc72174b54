//! Checkpoint records and the handles used to address them
//!
//! - [`Checkpoint`] - Channel state of one step: values, versions, versions seen
//! - [`CheckpointMetadata`] - Step number, source, parents and free-form fields
//! - [`CheckpointConfig`] - `thread_id` + `checkpoint_ns` + `checkpoint_id` handle
//! - [`CheckpointTuple`] - A loaded checkpoint with its metadata, parent and pending writes
//! - [`ChannelVersion`] / [`ChannelVersions`] - Per-channel version tokens
//! - [`PendingWrite`] - A task's staged `(task_id, channel, value)` write
//!
//! # Scopes
//!
//! A `(thread_id, checkpoint_ns)` pair identifies one independent history line. The
//! namespace defaults to the empty string, which is a real namespace and not "unset":
//!
//! ```rust
//! use langgraph_checkpoint::CheckpointConfig;
//!
//! let config = CheckpointConfig::for_thread("session-alice");
//! assert_eq!(config.namespace(), "");
//!
//! let sub = config.clone().with_checkpoint_ns("subgraph");
//! assert_eq!(sub.namespace(), "subgraph");
//! ```
//!
//! # Ordering
//!
//! Checkpoint IDs are compared as strings, and within a scope the lexicographically
//! greatest ID is the latest checkpoint. [`Checkpoint::empty`] uses UUIDv7 IDs, which
//! sort by creation time.
//!
//! # Derived fields
//!
//! `channel_values` and `pending_sends` are part of a loaded [`Checkpoint`] but storage
//! backends keep them outside the checkpoint record: values live in versioned blobs and
//! pending sends are the parent checkpoint's writes on the
//! [`TASKS`](crate::constants::TASKS) channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

pub type CheckpointId = String;

/// `(task_id, channel, value)` staged by a task against a checkpoint
pub type PendingWrite = (String, String, Value);

/// Version token of one channel
///
/// Graphs may count versions with integers, floats or strings. Backends
/// compare versions through [`as_key`](Self::as_key), never numerically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelVersion {
    Int(i64),
    Float(f64),
    String(String),
}

impl ChannelVersion {
    /// Canonical text form used as the storage key of a versioned blob
    pub fn as_key(&self) -> String {
        self.to_string()
    }

    /// Canonical text form of a version held as an untyped JSON value
    pub fn key_of(value: &Value) -> Option<String> {
        serde_json::from_value::<ChannelVersion>(value.clone())
            .ok()
            .map(|v| v.as_key())
    }
}

impl fmt::Display for ChannelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelVersion::Int(v) => write!(f, "{}", v),
            ChannelVersion::Float(v) => match serde_json::Number::from_f64(*v) {
                Some(n) => write!(f, "{}", n),
                None => write!(f, "{}", v),
            },
            ChannelVersion::String(v) => f.write_str(v),
        }
    }
}

impl From<i64> for ChannelVersion {
    fn from(v: i64) -> Self {
        ChannelVersion::Int(v)
    }
}

impl From<&str> for ChannelVersion {
    fn from(v: &str) -> Self {
        ChannelVersion::String(v.to_string())
    }
}

pub type ChannelVersions = HashMap<String, ChannelVersion>;

/// What produced a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    /// Graph input passed to an invocation
    Input,
    /// A step of the execution loop
    Loop,
    /// A state update applied from outside the loop
    Update,
    /// A copy of another checkpoint
    Fork,
}

/// Descriptive data stored beside a checkpoint and matched by `list` filters
///
/// Fields other than `source`, `step` and `parents` land in `extra`, so any
/// JSON object round-trips through this type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<CheckpointSource>,

    /// `-1` for the input checkpoint, then `0, 1, ...` per loop step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<i32>,

    /// Parent checkpoint id per namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents: Option<HashMap<String, String>>,

    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl CheckpointMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: CheckpointSource) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_step(mut self, step: i32) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_parents(mut self, parents: HashMap<String, String>) -> Self {
        self.parents = Some(parents);
        self
    }

    /// Attach a free-form field
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Channel state captured after one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Record format version, see [`Checkpoint::CURRENT_VERSION`]
    pub v: i32,

    /// Unique within its scope; later checkpoints sort greater
    pub id: CheckpointId,

    pub ts: DateTime<Utc>,

    /// Channel name to value. Loaded from versioned blobs, not the record.
    #[serde(default)]
    pub channel_values: HashMap<String, Value>,

    /// Channel name to the version this checkpoint sees
    pub channel_versions: ChannelVersions,

    /// Node name to the channel versions it last consumed
    #[serde(default)]
    pub versions_seen: HashMap<String, ChannelVersions>,

    /// Sends emitted by the parent step. Rebuilt on load, never persisted.
    #[serde(default)]
    pub pending_sends: Vec<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_channels: Option<Vec<String>>,
}

impl Checkpoint {
    pub const CURRENT_VERSION: i32 = 1;

    pub fn new(
        id: impl Into<CheckpointId>,
        channel_values: HashMap<String, Value>,
        channel_versions: ChannelVersions,
        versions_seen: HashMap<String, ChannelVersions>,
    ) -> Self {
        Self {
            v: Self::CURRENT_VERSION,
            id: id.into(),
            ts: Utc::now(),
            channel_values,
            channel_versions,
            versions_seen,
            pending_sends: Vec::new(),
            updated_channels: None,
        }
    }

    /// A checkpoint with no channels and a fresh time-ordered ID
    pub fn empty() -> Self {
        Self::new(
            Uuid::now_v7().to_string(),
            HashMap::new(),
            HashMap::new(),
            HashMap::new(),
        )
    }

    pub fn with_updated_channels(mut self, channels: Vec<String>) -> Self {
        self.updated_channels = Some(channels);
        self
    }
}

/// Handle addressing a scope, or one checkpoint within it
///
/// On `put` a `checkpoint_id` names the parent of the checkpoint being saved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<CheckpointId>,

    /// `None` means "any namespace" when listing and `""` everywhere else
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_ns: Option<String>,

    /// Caller-defined keys carried alongside the handle
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl CheckpointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration addressing the latest checkpoint of a thread
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self::new().with_thread_id(thread_id)
    }

    /// Fully resolved configuration of one stored checkpoint
    pub fn for_checkpoint(
        thread_id: impl Into<String>,
        checkpoint_ns: impl Into<String>,
        checkpoint_id: impl Into<CheckpointId>,
    ) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            checkpoint_ns: Some(checkpoint_ns.into()),
            checkpoint_id: Some(checkpoint_id.into()),
            extra: HashMap::new(),
        }
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_checkpoint_id(mut self, checkpoint_id: impl Into<CheckpointId>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }

    pub fn with_checkpoint_ns(mut self, checkpoint_ns: impl Into<String>) -> Self {
        self.checkpoint_ns = Some(checkpoint_ns.into());
        self
    }

    /// Checkpoint namespace, defaulting to the root namespace `""`
    pub fn namespace(&self) -> &str {
        self.checkpoint_ns.as_deref().unwrap_or("")
    }
}

/// A checkpoint as returned by `get_tuple` and `list`
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointTuple {
    /// Resolved handle of this checkpoint
    pub config: CheckpointConfig,

    pub checkpoint: Checkpoint,

    pub metadata: CheckpointMetadata,

    /// Handle of the checkpoint this one was saved after, if any
    pub parent_config: Option<CheckpointConfig>,

    /// Writes stored against this checkpoint, ordered by task then index
    pub pending_writes: Vec<PendingWrite>,
}

impl CheckpointTuple {
    pub fn new(
        config: CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Self {
        Self {
            config,
            checkpoint,
            metadata,
            parent_config: None,
            pending_writes: Vec::new(),
        }
    }

    pub fn with_parent_config(mut self, parent_config: CheckpointConfig) -> Self {
        self.parent_config = Some(parent_config);
        self
    }

    pub fn with_pending_writes(mut self, pending_writes: Vec<PendingWrite>) -> Self {
        self.pending_writes = pending_writes;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_empty_checkpoint_has_no_channels() {
        let cp = Checkpoint::empty();
        assert_eq!(cp.v, Checkpoint::CURRENT_VERSION);
        assert!(cp.channel_values.is_empty());
        assert!(cp.channel_versions.is_empty());
        assert!(cp.pending_sends.is_empty());
        assert!(cp.updated_channels.is_none());
    }

    #[test]
    fn test_empty_ids_sort_by_creation() {
        let first = Checkpoint::empty();
        let second = Checkpoint::empty();
        assert!(first.id < second.id);
    }

    #[test]
    fn test_channel_version_keys() {
        assert_eq!(ChannelVersion::Int(7).as_key(), "7");
        assert_eq!(ChannelVersion::Float(1.5).as_key(), "1.5");
        assert_eq!(ChannelVersion::String("00001.abc".into()).as_key(), "00001.abc");
    }

    #[test]
    fn test_channel_version_key_of_json() {
        assert_eq!(ChannelVersion::key_of(&json!(3)), Some("3".to_string()));
        assert_eq!(ChannelVersion::key_of(&json!(2.5)), Some("2.5".to_string()));
        assert_eq!(ChannelVersion::key_of(&json!("v2")), Some("v2".to_string()));
        assert_eq!(ChannelVersion::key_of(&json!({"x": 1})), None);
    }

    #[test]
    fn test_metadata_extra_is_flattened() {
        let metadata = CheckpointMetadata::new()
            .with_source(CheckpointSource::Loop)
            .with_step(2)
            .with_extra("writes", json!(null));
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value, json!({"source": "loop", "step": 2, "writes": null}));

        let back: CheckpointMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(back, metadata);
    }

    #[test]
    fn test_config_builders_and_namespace() {
        let config = CheckpointConfig::for_thread("thread-1").with_checkpoint_id("checkpoint-1");
        assert_eq!(config.thread_id.as_deref(), Some("thread-1"));
        assert_eq!(config.checkpoint_id.as_deref(), Some("checkpoint-1"));
        assert_eq!(config.checkpoint_ns, None);
        assert_eq!(config.namespace(), "");

        let resolved = CheckpointConfig::for_checkpoint("thread-1", "inner", "checkpoint-1");
        assert_eq!(resolved.namespace(), "inner");
    }

    #[test]
    fn test_payload_without_derived_fields_deserializes() {
        let payload = json!({
            "v": 1,
            "id": "c1",
            "ts": "2024-04-19T17:19:07.952Z",
            "channel_versions": {"x": 1},
            "versions_seen": {}
        });
        let checkpoint: Checkpoint = serde_json::from_value(payload).unwrap();
        assert!(checkpoint.channel_values.is_empty());
        assert!(checkpoint.pending_sends.is_empty());
        assert_eq!(checkpoint.channel_versions["x"], ChannelVersion::Int(1));
    }

    proptest! {
        #[test]
        fn prop_int_version_key_matches_json_key(v in any::<i64>()) {
            prop_assert_eq!(ChannelVersion::key_of(&json!(v)), Some(ChannelVersion::Int(v).as_key()));
        }

        #[test]
        fn prop_string_version_key_is_verbatim(s in "[a-z0-9.]{1,16}") {
            prop_assert_eq!(ChannelVersion::key_of(&json!(s.clone())), Some(s));
        }
    }
}
