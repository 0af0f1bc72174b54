//! Conversion between checkpoint types and stored rows

use langgraph_checkpoint::constants::writes_idx;
use langgraph_checkpoint::{
    ChannelVersion, ChannelVersions, Checkpoint, CheckpointError, CheckpointMetadata,
    PendingWrite, Result, SerializerProtocol,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::HashMap;

/// Type tag of a blob row recording a channel with no value
pub const EMPTY_TYPE: &str = "empty";

/// One `checkpoint_blobs` row to insert
#[derive(Debug, Clone, PartialEq)]
pub struct BlobRow {
    pub channel: String,
    pub version: String,
    pub type_tag: String,
    pub blob: Option<Vec<u8>>,
}

/// One `checkpoint_writes` row to insert
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRow {
    pub idx: i64,
    pub channel: String,
    pub type_tag: String,
    pub blob: Vec<u8>,
}

/// Blob rows for the channels named in `new_versions`
///
/// A channel without a current value is recorded with the `"empty"` tag.
pub fn dump_blobs(
    serde: &dyn SerializerProtocol,
    values: &HashMap<String, Value>,
    new_versions: &ChannelVersions,
) -> Result<Vec<BlobRow>> {
    new_versions
        .iter()
        .map(|(channel, version)| {
            let (type_tag, blob) = match values.get(channel) {
                Some(value) => {
                    let (type_tag, bytes) = serde.dumps_typed(value)?;
                    (type_tag, Some(bytes))
                }
                None => (EMPTY_TYPE.to_string(), None),
            };
            Ok(BlobRow {
                channel: channel.clone(),
                version: version.as_key(),
                type_tag,
                blob,
            })
        })
        .collect()
}

/// Checkpoint record text, without the fields kept in other tables
pub fn dump_checkpoint(checkpoint: &Checkpoint) -> Result<String> {
    let mut value = serde_json::to_value(checkpoint)?;
    if let Value::Object(map) = &mut value {
        map.remove("channel_values");
        map.insert("pending_sends".to_string(), Value::Array(vec![]));
    }
    Ok(serde_json::to_string(&value)?)
}

/// Metadata record text with NUL characters removed from every string
pub fn dump_metadata(metadata: &CheckpointMetadata) -> Result<String> {
    let value = strip_nul(serde_json::to_value(metadata)?);
    Ok(serde_json::to_string(&value)?)
}

fn strip_nul(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace('\0', "")),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_nul).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.replace('\0', ""), strip_nul(v)))
                .collect::<Map<String, Value>>(),
        ),
        other => other,
    }
}

/// Write rows for a task's batch
///
/// Reserved channels take their fixed index, others their position in the batch.
pub fn dump_writes(
    serde: &dyn SerializerProtocol,
    writes: &[(String, Value)],
) -> Result<Vec<WriteRow>> {
    writes
        .iter()
        .enumerate()
        .map(|(position, (channel, value))| {
            let (type_tag, blob) = serde.dumps_typed(value)?;
            Ok(WriteRow {
                idx: writes_idx(channel).unwrap_or(position as i64),
                channel: channel.clone(),
                type_tag,
                blob,
            })
        })
        .collect()
}

#[derive(Deserialize)]
struct StoredVersions {
    #[serde(default)]
    channel_versions: HashMap<String, Value>,
}

/// `{channel: version_key}` for the versions named in a stored checkpoint record
pub fn version_keys(checkpoint: &Value) -> Map<String, Value> {
    checkpoint
        .get("channel_versions")
        .and_then(Value::as_object)
        .map(|versions| {
            versions
                .iter()
                .filter_map(|(channel, version)| {
                    ChannelVersion::key_of(version).map(|key| (channel.clone(), Value::String(key)))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Every `(channel, version_key)` pair referenced by the given checkpoint records
pub fn referenced_versions(payloads: &[String]) -> Result<Vec<(String, String)>> {
    let mut referenced = Vec::new();
    for payload in payloads {
        let stored: StoredVersions = serde_json::from_str(payload)?;
        for (channel, version) in stored.channel_versions {
            if let Some(key) = ChannelVersion::key_of(&version) {
                referenced.push((channel, key));
            }
        }
    }
    referenced.sort();
    referenced.dedup();
    Ok(referenced)
}

/// Channel values from `(channel, type, blob)` rows, skipping empty channels
pub fn load_blobs(
    serde: &dyn SerializerProtocol,
    rows: &[SqliteRow],
) -> Result<HashMap<String, Value>> {
    let mut values = HashMap::with_capacity(rows.len());
    for row in rows {
        let channel: String = try_get(row, "channel")?;
        let type_tag: String = try_get(row, "type")?;
        if type_tag == EMPTY_TYPE {
            continue;
        }
        let blob: Option<Vec<u8>> = try_get(row, "blob")?;
        let value = serde.loads_typed(&type_tag, blob.as_deref().unwrap_or_default())?;
        values.insert(channel, value);
    }
    Ok(values)
}

/// Pending writes from `(task_id, channel, type, blob)` rows, in row order
pub fn load_writes(serde: &dyn SerializerProtocol, rows: &[SqliteRow]) -> Result<Vec<PendingWrite>> {
    rows.iter()
        .map(|row| {
            let task_id: String = try_get(row, "task_id")?;
            let channel: String = try_get(row, "channel")?;
            let value = load_typed(serde, row)?;
            Ok((task_id, channel, value))
        })
        .collect()
}

/// Pending sends from `(type, blob)` rows, in row order
pub fn load_sends(serde: &dyn SerializerProtocol, rows: &[SqliteRow]) -> Result<Vec<Value>> {
    rows.iter().map(|row| load_typed(serde, row)).collect()
}

fn load_typed(serde: &dyn SerializerProtocol, row: &SqliteRow) -> Result<Value> {
    let type_tag: Option<String> = try_get(row, "type")?;
    let blob: Vec<u8> = try_get(row, "blob")?;
    let type_tag = type_tag.ok_or_else(|| {
        CheckpointError::Storage("checkpoint write is missing its type tag".to_string())
    })?;
    serde.loads_typed(&type_tag, &blob)
}

pub(crate) fn try_get<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column)
        .map_err(|e| CheckpointError::Storage(format!("Failed to read column {}: {}", column, e)))
}
