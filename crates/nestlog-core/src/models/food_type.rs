//! Food type model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named food a caregiver has introduced, referenced by solids logs.
///
/// Food types are scoped to a user rather than a baby, so they survive
/// revocation of any single baby's access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodType {
    /// Client-generated UUID
    pub id: String,
    pub user_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
