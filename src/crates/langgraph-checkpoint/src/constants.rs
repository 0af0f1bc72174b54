//! Reserved control channels shared by the read and write paths
//!
//! Writes to the channels listed in [`WRITES_IDX_MAP`] occupy a single fixed
//! slot per task, so a repeated write replaces the previous one. Every other
//! channel is indexed by its position in the submitted batch.

/// Channel carrying messages sent to the next step. Writes against a parent
/// checkpoint on this channel surface as the child's `pending_sends`.
pub const TASKS: &str = "__pregel_tasks";

/// Channel recording a task error
pub const ERROR: &str = "__error__";

/// Channel marking a task as scheduled
pub const SCHEDULED: &str = "__scheduled__";

/// Channel recording an interrupt raised by a task
pub const INTERRUPT: &str = "__interrupt__";

/// Channel carrying the value a task is resumed with
pub const RESUME: &str = "__resume__";

/// Fixed write index for each reserved control channel
pub const WRITES_IDX_MAP: &[(&str, i64)] = &[
    (ERROR, -1),
    (SCHEDULED, -2),
    (INTERRUPT, -3),
    (RESUME, -4),
];

/// Fixed write index of `channel`, if it is a reserved control channel
pub fn writes_idx(channel: &str) -> Option<i64> {
    WRITES_IDX_MAP
        .iter()
        .find(|(name, _)| *name == channel)
        .map(|(_, idx)| *idx)
}

/// Whether `channel` owns a fixed write slot
pub fn is_reserved(channel: &str) -> bool {
    writes_idx(channel).is_some()
}
