//! Local store adapter - typed accessors over the embedded cache
//!
//! Entity tables are keyed by primary id and written with
//! `INSERT OR REPLACE` upserts; deletes are idempotent (removing an
//! absent id is not an error). Timestamps are stored as unix
//! milliseconds, enums as their wire strings.

use chrono::{DateTime, Utc};
use libsql::{params, Connection, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::models::{Baby, BabyAccess, FeedLog, FoodType, GrowthLog, NappyLog, SleepLog, SolidsLog};

use super::Database;

/// Typed async accessors over the local database.
///
/// Cheap to clone; all clones share the same underlying connection.
#[derive(Clone)]
pub struct LocalStore {
    pub(crate) conn: Connection,
}

impl LocalStore {
    /// Create a store over an open database
    #[must_use]
    pub fn new(db: &Database) -> Self {
        Self {
            conn: db.connection().clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Column conversion helpers
// ---------------------------------------------------------------------------

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn opt_millis(ts: Option<DateTime<Utc>>) -> Option<i64> {
    ts.map(to_millis)
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

pub(crate) fn opt_from_millis(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.map(from_millis)
}

/// Serialize an enum to its bare wire string (no surrounding quotes)
pub(crate) fn enum_to_text<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}

pub(crate) fn opt_enum_to_text<T: Serialize>(value: Option<&T>) -> Result<Option<String>> {
    value.map(enum_to_text).transpose()
}

/// Parse an enum from its bare wire string
pub(crate) fn enum_from_text<T: DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::String(
        text.to_string(),
    ))?)
}

pub(crate) fn opt_enum_from_text<T: DeserializeOwned>(text: Option<String>) -> Result<Option<T>> {
    text.as_deref().map(enum_from_text).transpose()
}

// ---------------------------------------------------------------------------
// Babies and access grants
// ---------------------------------------------------------------------------

impl LocalStore {
    /// Upsert a batch of babies
    pub async fn save_babies(&self, babies: &[Baby]) -> Result<()> {
        for baby in babies {
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO babies
                     (id, name, birth_date, gender, birth_weight_g, archived_at,
                      owner_user_id, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        baby.id,
                        baby.name.clone(),
                        opt_millis(baby.birth_date),
                        opt_enum_to_text(baby.gender.as_ref())?,
                        baby.birth_weight_g,
                        opt_millis(baby.archived_at),
                        baby.owner_user_id,
                        to_millis(baby.created_at),
                        to_millis(baby.updated_at),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    /// Look up a baby by id
    pub async fn get_baby(&self, id: i64) -> Result<Option<Baby>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, birth_date, gender, birth_weight_g, archived_at,
                        owner_user_id, created_at, updated_at
                 FROM babies WHERE id = ?",
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_baby(&row)?)),
            None => Ok(None),
        }
    }

    /// Upsert a batch of access grants
    pub async fn save_baby_access(&self, records: &[BabyAccess]) -> Result<()> {
        for access in records {
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO baby_access
                     (user_id, baby_id, access_level, caregiver_label, last_accessed_at,
                      created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?)",
                    params![
                        access.user_id,
                        access.baby_id,
                        enum_to_text(&access.access_level)?,
                        access.caregiver_label.clone(),
                        opt_millis(access.last_accessed_at),
                        to_millis(access.created_at),
                        to_millis(access.updated_at),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    /// Look up an access grant by its composite key
    pub async fn get_baby_access(&self, user_id: i64, baby_id: i64) -> Result<Option<BabyAccess>> {
        let mut rows = self
            .conn
            .query(
                "SELECT user_id, baby_id, access_level, caregiver_label, last_accessed_at,
                        created_at, updated_at
                 FROM baby_access WHERE user_id = ? AND baby_id = ?",
                params![user_id, baby_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_baby_access(&row)?)),
            None => Ok(None),
        }
    }
}

fn parse_baby(row: &Row) -> Result<Baby> {
    Ok(Baby {
        id: row.get(0)?,
        name: row.get(1)?,
        birth_date: opt_from_millis(row.get(2)?),
        gender: opt_enum_from_text(row.get(3)?)?,
        birth_weight_g: row.get(4)?,
        archived_at: opt_from_millis(row.get(5)?),
        owner_user_id: row.get(6)?,
        created_at: from_millis(row.get(7)?),
        updated_at: from_millis(row.get(8)?),
    })
}

fn parse_baby_access(row: &Row) -> Result<BabyAccess> {
    Ok(BabyAccess {
        user_id: row.get(0)?,
        baby_id: row.get(1)?,
        access_level: enum_from_text(&row.get::<String>(2)?)?,
        caregiver_label: row.get(3)?,
        last_accessed_at: opt_from_millis(row.get(4)?),
        created_at: from_millis(row.get(5)?),
        updated_at: from_millis(row.get(6)?),
    })
}

// ---------------------------------------------------------------------------
// Activity logs
// ---------------------------------------------------------------------------

impl LocalStore {
    /// Upsert a batch of feed logs
    pub async fn save_feed_logs(&self, logs: &[FeedLog]) -> Result<()> {
        for log in logs {
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO feed_logs
                     (id, baby_id, logged_by_user_id, method, started_at, ended_at,
                      duration_minutes, amount_ml, is_estimated, end_side, notes,
                      created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        log.id.clone(),
                        log.baby_id,
                        log.logged_by_user_id,
                        enum_to_text(&log.method)?,
                        to_millis(log.started_at),
                        opt_millis(log.ended_at),
                        log.duration_minutes,
                        log.amount_ml,
                        i64::from(log.is_estimated),
                        opt_enum_to_text(log.end_side.as_ref())?,
                        log.notes.clone(),
                        to_millis(log.created_at),
                        to_millis(log.updated_at),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    pub async fn get_feed_log(&self, id: &str) -> Result<Option<FeedLog>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, baby_id, logged_by_user_id, method, started_at, ended_at,
                        duration_minutes, amount_ml, is_estimated, end_side, notes,
                        created_at, updated_at
                 FROM feed_logs WHERE id = ?",
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_feed_log(&row)?)),
            None => Ok(None),
        }
    }

    /// Delete a feed log; deleting an absent id is a no-op
    pub async fn delete_feed_log(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM feed_logs WHERE id = ?", params![id])
            .await?;
        Ok(())
    }

    /// Upsert a batch of sleep logs
    pub async fn save_sleep_logs(&self, logs: &[SleepLog]) -> Result<()> {
        for log in logs {
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO sleep_logs
                     (id, baby_id, logged_by_user_id, started_at, ended_at,
                      duration_minutes, notes, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        log.id.clone(),
                        log.baby_id,
                        log.logged_by_user_id,
                        to_millis(log.started_at),
                        opt_millis(log.ended_at),
                        log.duration_minutes,
                        log.notes.clone(),
                        to_millis(log.created_at),
                        to_millis(log.updated_at),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    pub async fn get_sleep_log(&self, id: &str) -> Result<Option<SleepLog>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, baby_id, logged_by_user_id, started_at, ended_at,
                        duration_minutes, notes, created_at, updated_at
                 FROM sleep_logs WHERE id = ?",
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_sleep_log(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_sleep_log(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM sleep_logs WHERE id = ?", params![id])
            .await?;
        Ok(())
    }

    /// Upsert a batch of nappy logs
    pub async fn save_nappy_logs(&self, logs: &[NappyLog]) -> Result<()> {
        for log in logs {
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO nappy_logs
                     (id, baby_id, logged_by_user_id, kind, colour, consistency,
                      started_at, notes, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        log.id.clone(),
                        log.baby_id,
                        log.logged_by_user_id,
                        opt_enum_to_text(log.kind.as_ref())?,
                        opt_enum_to_text(log.colour.as_ref())?,
                        opt_enum_to_text(log.consistency.as_ref())?,
                        to_millis(log.started_at),
                        log.notes.clone(),
                        to_millis(log.created_at),
                        to_millis(log.updated_at),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    pub async fn get_nappy_log(&self, id: &str) -> Result<Option<NappyLog>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, baby_id, logged_by_user_id, kind, colour, consistency,
                        started_at, notes, created_at, updated_at
                 FROM nappy_logs WHERE id = ?",
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_nappy_log(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_nappy_log(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM nappy_logs WHERE id = ?", params![id])
            .await?;
        Ok(())
    }

    /// Upsert a batch of solids logs
    pub async fn save_solids_logs(&self, logs: &[SolidsLog]) -> Result<()> {
        for log in logs {
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO solids_logs
                     (id, baby_id, logged_by_user_id, food, food_type_ids, reaction,
                      started_at, notes, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        log.id.clone(),
                        log.baby_id,
                        log.logged_by_user_id,
                        log.food.clone(),
                        serde_json::to_string(&log.food_type_ids)?,
                        enum_to_text(&log.reaction)?,
                        to_millis(log.started_at),
                        log.notes.clone(),
                        to_millis(log.created_at),
                        to_millis(log.updated_at),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    pub async fn get_solids_log(&self, id: &str) -> Result<Option<SolidsLog>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, baby_id, logged_by_user_id, food, food_type_ids, reaction,
                        started_at, notes, created_at, updated_at
                 FROM solids_logs WHERE id = ?",
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_solids_log(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_solids_log(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM solids_logs WHERE id = ?", params![id])
            .await?;
        Ok(())
    }

    /// Upsert a batch of growth logs
    pub async fn save_growth_logs(&self, logs: &[GrowthLog]) -> Result<()> {
        for log in logs {
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO growth_logs
                     (id, baby_id, logged_by_user_id, started_at, weight_g, height_mm,
                      head_circumference_mm, notes, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        log.id.clone(),
                        log.baby_id,
                        log.logged_by_user_id,
                        to_millis(log.started_at),
                        log.weight_g,
                        log.height_mm,
                        log.head_circumference_mm,
                        log.notes.clone(),
                        to_millis(log.created_at),
                        to_millis(log.updated_at),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    pub async fn get_growth_log(&self, id: &str) -> Result<Option<GrowthLog>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, baby_id, logged_by_user_id, started_at, weight_g, height_mm,
                        head_circumference_mm, notes, created_at, updated_at
                 FROM growth_logs WHERE id = ?",
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_growth_log(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_growth_log(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM growth_logs WHERE id = ?", params![id])
            .await?;
        Ok(())
    }

    /// Upsert a batch of food types
    pub async fn save_food_types(&self, food_types: &[FoodType]) -> Result<()> {
        for food_type in food_types {
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO food_types
                     (id, user_id, name, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?)",
                    params![
                        food_type.id.clone(),
                        food_type.user_id,
                        food_type.name.clone(),
                        to_millis(food_type.created_at),
                        to_millis(food_type.updated_at),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    pub async fn get_food_type(&self, id: &str) -> Result<Option<FoodType>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, user_id, name, created_at, updated_at
                 FROM food_types WHERE id = ?",
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_food_type(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_food_type(&self, id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM food_types WHERE id = ?", params![id])
            .await?;
        Ok(())
    }
}

fn parse_feed_log(row: &Row) -> Result<FeedLog> {
    Ok(FeedLog {
        id: row.get(0)?,
        baby_id: row.get(1)?,
        logged_by_user_id: row.get(2)?,
        method: enum_from_text(&row.get::<String>(3)?)?,
        started_at: from_millis(row.get(4)?),
        ended_at: opt_from_millis(row.get(5)?),
        duration_minutes: row.get(6)?,
        amount_ml: row.get(7)?,
        is_estimated: row.get::<i64>(8)? != 0,
        end_side: opt_enum_from_text(row.get(9)?)?,
        notes: row.get(10)?,
        created_at: from_millis(row.get(11)?),
        updated_at: from_millis(row.get(12)?),
    })
}

fn parse_sleep_log(row: &Row) -> Result<SleepLog> {
    Ok(SleepLog {
        id: row.get(0)?,
        baby_id: row.get(1)?,
        logged_by_user_id: row.get(2)?,
        started_at: from_millis(row.get(3)?),
        ended_at: opt_from_millis(row.get(4)?),
        duration_minutes: row.get(5)?,
        notes: row.get(6)?,
        created_at: from_millis(row.get(7)?),
        updated_at: from_millis(row.get(8)?),
    })
}

fn parse_nappy_log(row: &Row) -> Result<NappyLog> {
    Ok(NappyLog {
        id: row.get(0)?,
        baby_id: row.get(1)?,
        logged_by_user_id: row.get(2)?,
        kind: opt_enum_from_text(row.get(3)?)?,
        colour: opt_enum_from_text(row.get(4)?)?,
        consistency: opt_enum_from_text(row.get(5)?)?,
        started_at: from_millis(row.get(6)?),
        notes: row.get(7)?,
        created_at: from_millis(row.get(8)?),
        updated_at: from_millis(row.get(9)?),
    })
}

fn parse_solids_log(row: &Row) -> Result<SolidsLog> {
    Ok(SolidsLog {
        id: row.get(0)?,
        baby_id: row.get(1)?,
        logged_by_user_id: row.get(2)?,
        food: row.get(3)?,
        food_type_ids: serde_json::from_str(&row.get::<String>(4)?)?,
        reaction: enum_from_text(&row.get::<String>(5)?)?,
        started_at: from_millis(row.get(6)?),
        notes: row.get(7)?,
        created_at: from_millis(row.get(8)?),
        updated_at: from_millis(row.get(9)?),
    })
}

fn parse_growth_log(row: &Row) -> Result<GrowthLog> {
    Ok(GrowthLog {
        id: row.get(0)?,
        baby_id: row.get(1)?,
        logged_by_user_id: row.get(2)?,
        started_at: from_millis(row.get(3)?),
        weight_g: row.get(4)?,
        height_mm: row.get(5)?,
        head_circumference_mm: row.get(6)?,
        notes: row.get(7)?,
        created_at: from_millis(row.get(8)?),
        updated_at: from_millis(row.get(9)?),
    })
}

fn parse_food_type(row: &Row) -> Result<FoodType> {
    Ok(FoodType {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        created_at: from_millis(row.get(3)?),
        updated_at: from_millis(row.get(4)?),
    })
}

// ---------------------------------------------------------------------------
// Access revocation cleanup
// ---------------------------------------------------------------------------

impl LocalStore {
    /// Remove all locally cached data scoped to a baby whose access was
    /// revoked for `user_id`.
    ///
    /// The user's access grant always goes. The baby row, its logs, and
    /// its cursor go only when no other cached grant still references the
    /// baby. Queued outbox mutations targeting the baby are dropped
    /// either way. Food types survive - they are user-scoped.
    pub async fn clear_revoked_baby_data(&self, baby_id: i64, user_id: i64) -> Result<()> {
        tracing::info!("Clearing local data for revoked baby {baby_id}");

        self.conn.execute("BEGIN TRANSACTION", ()).await?;
        if let Err(e) = self.clear_revoked_inner(baby_id, user_id).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e);
        }
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    async fn clear_revoked_inner(&self, baby_id: i64, user_id: i64) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM baby_access WHERE user_id = ? AND baby_id = ?",
                params![user_id, baby_id],
            )
            .await?;

        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM baby_access WHERE baby_id = ?",
                params![baby_id],
            )
            .await?;
        let other_access: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };

        if other_access == 0 {
            self.conn
                .execute("DELETE FROM babies WHERE id = ?", params![baby_id])
                .await?;
            for table in [
                "sync_cursors",
                "feed_logs",
                "sleep_logs",
                "nappy_logs",
                "solids_logs",
                "growth_logs",
            ] {
                self.conn
                    .execute(
                        &format!("DELETE FROM {table} WHERE baby_id = ?"),
                        params![baby_id],
                    )
                    .await?;
            }
            tracing::debug!("Deleted baby {baby_id} and all scoped logs");
        }

        // Drop queued mutations targeting the revoked baby
        let mut rows = self
            .conn
            .query("SELECT mutation_id, entity_type, entity_id, payload FROM outbox", ())
            .await?;
        let mut doomed = Vec::new();
        while let Some(row) = rows.next().await? {
            let mutation_id: String = row.get(0)?;
            let entity_type: String = row.get(1)?;
            let entity_id: String = row.get(2)?;
            let payload: String = row.get(3)?;

            let targets_baby = if entity_type == "baby" {
                entity_id == baby_id.to_string()
            } else {
                serde_json::from_str::<serde_json::Value>(&payload)
                    .ok()
                    .and_then(|p| p.get("babyId").and_then(serde_json::Value::as_i64))
                    == Some(baby_id)
            };
            if targets_baby {
                doomed.push(mutation_id);
            }
        }
        for mutation_id in &doomed {
            self.conn
                .execute(
                    "DELETE FROM outbox WHERE mutation_id = ?",
                    params![mutation_id.clone()],
                )
                .await?;
        }
        tracing::debug!("Dropped {} queued mutations for baby {baby_id}", doomed.len());

        Ok(())
    }
}
