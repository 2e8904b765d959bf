//! Baby and baby-access models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recorded gender of a baby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
    Unknown,
}

/// Access level a caregiver holds on a baby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// Full control, including archiving and access management
    Owner,
    /// Can create and edit logs
    Editor,
    /// Read-only access
    Viewer,
}

/// A tracked child profile - the tenant root scoping almost all other
/// entities. Babies are archived (soft delete via `archived_at`), never
/// physically deleted, so their child logs stay referentially intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Baby {
    /// Server-assigned numeric id
    pub id: i64,
    pub name: String,
    pub birth_date: Option<DateTime<Utc>>,
    pub gender: Option<Gender>,
    pub birth_weight_g: Option<i64>,
    /// Soft-delete marker; an archived baby still exists locally
    pub archived_at: Option<DateTime<Utc>>,
    pub owner_user_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Baby {
    /// Whether this baby has been archived (retired, not deleted)
    pub const fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

/// Access grant for one user on one baby.
///
/// Composite key: (`user_id`, `baby_id`). Access records are created and
/// revoked independently of the baby's own lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BabyAccess {
    pub user_id: i64,
    pub baby_id: i64,
    pub access_level: AccessLevel,
    /// Human-readable caregiver label (e.g., "Mum", "Grandpa")
    pub caregiver_label: Option<String>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
