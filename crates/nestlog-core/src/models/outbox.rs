//! Outbox model - the durable queue of not-yet-confirmed local mutations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of mutation queued in the outbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationOp {
    Create,
    Update,
    Delete,
}

/// Lifecycle of an outbox entry.
///
/// `pending` -> `syncing` -> (`synced` | `failed`). Failed entries stay
/// for manual retry; synced entries are purged after each flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Syncing,
    Synced,
    Failed,
}

/// A pending local mutation awaiting server confirmation.
///
/// `mutation_id` is generated once when the mutation is enqueued and is
/// never regenerated, so the server can deduplicate retried batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    /// Client-generated idempotency key (UUID v7)
    pub mutation_id: String,
    /// Entity name as used on the wire, e.g. `feed_log`
    pub entity_type: String,
    /// Id of the target entity (numeric ids are stringified)
    pub entity_id: String,
    pub op: MutationOp,
    /// Full wire payload of the mutated record
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl OutboxEntry {
    /// Create a new pending entry with a fresh mutation id
    #[must_use]
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        op: MutationOp,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            mutation_id: Uuid::now_v7().to_string(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            op,
            payload,
            status: OutboxStatus::Pending,
            created_at: Utc::now(),
            last_attempt_at: None,
            error_message: None,
        }
    }

    /// Baby id this mutation is scoped to, if derivable.
    ///
    /// Baby mutations carry it as their entity id; child-entity mutations
    /// carry it as `babyId` inside the payload.
    #[must_use]
    pub fn baby_id(&self) -> Option<i64> {
        if self.entity_type == "baby" {
            self.entity_id.parse().ok()
        } else {
            self.payload.get("babyId").and_then(serde_json::Value::as_i64)
        }
    }
}
