//! Wire types for the pull/push sync protocol

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{MutationOp, OutboxEntry};

/// One server-originated change in a baby's change stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncChange {
    /// Entity name, e.g. `feed_log`. Unknown names are skipped so the
    /// client stays forward-compatible with new server entity types.
    #[serde(rename = "type")]
    pub entity: String,
    pub op: MutationOp,
    /// Numeric for babies, UUID string for log types
    pub id: Value,
    /// Full entity snapshot; absent for deletes
    #[serde(default)]
    pub data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// One page of the incremental pull stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullPage {
    pub changes: Vec<SyncChange>,
    pub next_cursor: i64,
    pub has_more: bool,
}

/// A queued mutation as submitted in a push batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMutation {
    pub mutation_id: String,
    pub entity_type: String,
    pub entity_id: String,
    pub op: MutationOp,
    pub payload: Value,
}

impl From<&OutboxEntry> for PushMutation {
    fn from(entry: &OutboxEntry) -> Self {
        Self {
            mutation_id: entry.mutation_id.clone(),
            entity_type: entry.entity_type.clone(),
            entity_id: entry.entity_id.clone(),
            op: entry.op,
            payload: entry.payload.clone(),
        }
    }
}

/// Server verdict on one pushed mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationStatus {
    Success,
    /// The server kept a newer version; `server_data` carries it
    Conflict,
    Error,
}

/// Server snapshot attached to a conflict verdict.
///
/// Explicitly tagged with its entity type so the resolver is a plain
/// dispatch rather than structural inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictSnapshot {
    pub entity_type: String,
    pub data: Value,
}

/// Per-mutation result in a push response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationResult {
    pub mutation_id: String,
    pub status: MutationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_data: Option<ConflictSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Push response body
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub results: Vec<MutationResult>,
    /// Per-baby cursor advances earned by this batch; the server sends
    /// `null` when the batch earned none
    #[serde(default, deserialize_with = "null_as_empty_map")]
    pub new_cursors: BTreeMap<i64, i64>,
}

fn null_as_empty_map<'de, D>(deserializer: D) -> Result<BTreeMap<i64, i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}
