//! SQL statements used by the saver
//!
//! Statements use numbered `?N` parameters so a value can be referenced more
//! than once. Channel versions are always bound in their canonical text form.

/// Columns of a checkpoint row, without a `WHERE` clause
pub const SELECT_CHECKPOINTS_SQL: &str = "SELECT thread_id, checkpoint_ns, checkpoint_id, \
     parent_checkpoint_id, checkpoint, metadata FROM checkpoints";

/// Channel blobs named by a `{channel: version}` JSON object bound as `?3`
pub const SELECT_CHANNEL_VALUES_SQL: &str = "\
SELECT bl.channel, bl.type, bl.blob
FROM json_each(?3) AS cv
INNER JOIN checkpoint_blobs bl
    ON bl.thread_id = ?1
    AND bl.checkpoint_ns = ?2
    AND bl.channel = cv.key
    AND bl.version = cv.value";

pub const SELECT_PENDING_WRITES_SQL: &str = "\
SELECT task_id, channel, type, blob
FROM checkpoint_writes
WHERE thread_id = ?1 AND checkpoint_ns = ?2 AND checkpoint_id = ?3
ORDER BY task_id, idx";

/// Writes of the parent checkpoint on one channel, in send order
pub const SELECT_PENDING_SENDS_SQL: &str = "\
SELECT type, blob
FROM checkpoint_writes
WHERE thread_id = ?1 AND checkpoint_ns = ?2 AND checkpoint_id = ?3 AND channel = ?4
ORDER BY idx, task_id";

pub const UPSERT_CHECKPOINT_BLOBS_SQL: &str = "\
INSERT INTO checkpoint_blobs (thread_id, checkpoint_ns, channel, version, type, blob)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT (thread_id, checkpoint_ns, channel, version) DO NOTHING";

/// The parent of an existing checkpoint is never rewritten
pub const UPSERT_CHECKPOINTS_SQL: &str = "\
INSERT INTO checkpoints (thread_id, checkpoint_ns, checkpoint_id, parent_checkpoint_id, checkpoint, metadata)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT (thread_id, checkpoint_ns, checkpoint_id)
DO UPDATE SET
    checkpoint = excluded.checkpoint,
    metadata = excluded.metadata";

pub const UPSERT_CHECKPOINT_WRITES_SQL: &str = "\
INSERT INTO checkpoint_writes (thread_id, checkpoint_ns, checkpoint_id, task_id, idx, channel, type, blob)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
ON CONFLICT (thread_id, checkpoint_ns, checkpoint_id, task_id, idx)
DO UPDATE SET
    channel = excluded.channel,
    type = excluded.type,
    blob = excluded.blob";

pub const INSERT_CHECKPOINT_WRITES_SQL: &str = "\
INSERT INTO checkpoint_writes (thread_id, checkpoint_ns, checkpoint_id, task_id, idx, channel, type, blob)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
ON CONFLICT (thread_id, checkpoint_ns, checkpoint_id, task_id, idx) DO NOTHING";

pub const DELETE_CHECKPOINT_WRITES_SQL: &str = "\
DELETE FROM checkpoint_writes
WHERE thread_id = ?1 AND checkpoint_ns = ?2 AND checkpoint_id = ?3";

/// Payloads of every other checkpoint in the scope
pub const SELECT_SIBLING_PAYLOADS_SQL: &str = "\
SELECT checkpoint FROM checkpoints
WHERE thread_id = ?1 AND checkpoint_ns = ?2 AND checkpoint_id != ?3";

/// Blobs of the scope absent from the `[[channel, version], ...]` array bound as `?3`
pub const DELETE_ORPHAN_BLOBS_SQL: &str = "\
DELETE FROM checkpoint_blobs
WHERE thread_id = ?1
AND checkpoint_ns = ?2
AND NOT EXISTS (
    SELECT 1 FROM json_each(?3) AS live
    WHERE json_extract(live.value, '$[0]') = checkpoint_blobs.channel
    AND json_extract(live.value, '$[1]') = checkpoint_blobs.version
)";

pub const DELETE_CHECKPOINT_SQL: &str = "\
DELETE FROM checkpoints
WHERE thread_id = ?1 AND checkpoint_ns = ?2 AND checkpoint_id = ?3";

pub const DELETE_THREAD_CHECKPOINTS_SQL: &str =
    "DELETE FROM checkpoints WHERE thread_id = ?1 AND checkpoint_ns = ?2";

pub const DELETE_THREAD_BLOBS_SQL: &str =
    "DELETE FROM checkpoint_blobs WHERE thread_id = ?1 AND checkpoint_ns = ?2";

pub const DELETE_THREAD_WRITES_SQL: &str =
    "DELETE FROM checkpoint_writes WHERE thread_id = ?1 AND checkpoint_ns = ?2";
