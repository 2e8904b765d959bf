//! Activity log models
//!
//! Every log is a timestamped event belonging to exactly one baby and
//! attributed to exactly one user. Log ids are client-generated UUIDs so
//! offline creates are idempotent; the server confirms or overwrites the
//! row on sync. The sync layer always replaces whole records - there are
//! no partial-field patches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a client-side log id (UUID v7, time-sortable)
#[must_use]
pub fn new_log_id() -> String {
    Uuid::now_v7().to_string()
}

/// How a feed was given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedMethod {
    Breast,
    Bottle,
}

/// Which breast a feed ended on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSide {
    Left,
    Right,
}

/// A feed event (breast or bottle)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedLog {
    /// Client-generated UUID
    pub id: String,
    pub baby_id: i64,
    pub logged_by_user_id: i64,
    pub method: FeedMethod,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub amount_ml: Option<i64>,
    pub is_estimated: bool,
    pub end_side: Option<FeedSide>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A sleep session; `ended_at` is `None` while the baby is still asleep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepLog {
    pub id: String,
    pub baby_id: i64,
    pub logged_by_user_id: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a nappy contained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NappyKind {
    Wee,
    Poo,
    Mixed,
    Dry,
    Clean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NappyColour {
    Green,
    Yellow,
    Brown,
    Black,
    Red,
    Grey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NappyConsistency {
    Watery,
    Runny,
    Mushy,
    Pasty,
    Formed,
    HardPellets,
}

/// A nappy change - an instant event, so no `ended_at`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NappyLog {
    pub id: String,
    pub baby_id: i64,
    pub logged_by_user_id: i64,
    #[serde(rename = "type")]
    pub kind: Option<NappyKind>,
    pub colour: Option<NappyColour>,
    pub consistency: Option<NappyConsistency>,
    pub started_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// How the baby reacted to a solid food
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolidsReaction {
    Allergic,
    Hate,
    Liked,
    Loved,
}

/// A solids meal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolidsLog {
    pub id: String,
    pub baby_id: i64,
    pub logged_by_user_id: i64,
    /// Display text, e.g. "Apple, Pear, Carrot"
    pub food: String,
    /// Food type UUIDs; empty for legacy rows logged before food types
    #[serde(default)]
    pub food_type_ids: Vec<String>,
    pub reaction: SolidsReaction,
    pub started_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A growth measurement (any subset of weight/height/head circumference)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthLog {
    pub id: String,
    pub baby_id: i64,
    pub logged_by_user_id: i64,
    pub started_at: DateTime<Utc>,
    pub weight_g: Option<i64>,
    pub height_mm: Option<i64>,
    pub head_circumference_mm: Option<i64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
