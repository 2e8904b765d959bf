//! Per-entity codecs between wire JSON and the local store.
//!
//! Each entity has an upsert path (decode the wire snapshot, write it
//! through the store) and a change path that also handles deletes and
//! missing payloads. Deletes are idempotent; a change without data is
//! logged and skipped rather than failing the batch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::db::LocalStore;
use crate::error::Result;
use crate::models::{
    Baby, BabyAccess, FeedLog, FoodType, GrowthLog, MutationOp, NappyLog, SleepLog, SolidsLog,
};

/// Baby wire payload: the baby row plus optionally embedded access
/// grants, which the server includes so shared babies arrive with
/// their grant rows in one change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BabyPayload {
    #[serde(flatten)]
    pub baby: Baby,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access: Vec<BabyAccess>,
}

pub(crate) async fn upsert_baby(store: &LocalStore, data: &Value) -> Result<()> {
    let payload: BabyPayload = serde_json::from_value(data.clone())?;
    store.save_babies(&[payload.baby]).await?;
    if !payload.access.is_empty() {
        store.save_baby_access(&payload.access).await?;
    }
    Ok(())
}

pub(crate) async fn apply_baby_change(
    store: &LocalStore,
    op: MutationOp,
    id: i64,
    data: Option<&Value>,
) -> Result<()> {
    if op == MutationOp::Delete && data.is_none() {
        // Baby deletion is a soft delete carried in the snapshot's
        // isArchived flag; a bare delete has nothing to apply and the
        // row must stay for its child logs.
        warn!("Baby delete for {id} arrived without data; keeping local row");
        return Ok(());
    }
    let Some(data) = data else {
        warn!("Baby change for {id} arrived without data; skipping");
        return Ok(());
    };
    upsert_baby(store, data).await
}

pub(crate) async fn upsert_feed_log(store: &LocalStore, data: &Value) -> Result<()> {
    let log: FeedLog = serde_json::from_value(data.clone())?;
    store.save_feed_logs(&[log]).await
}

pub(crate) async fn apply_feed_log_change(
    store: &LocalStore,
    op: MutationOp,
    id: &str,
    data: Option<&Value>,
) -> Result<()> {
    if op == MutationOp::Delete {
        return store.delete_feed_log(id).await;
    }
    let Some(data) = data else {
        warn!("Feed log change for {id} arrived without data; skipping");
        return Ok(());
    };
    upsert_feed_log(store, data).await
}

pub(crate) async fn upsert_sleep_log(store: &LocalStore, data: &Value) -> Result<()> {
    let log: SleepLog = serde_json::from_value(data.clone())?;
    store.save_sleep_logs(&[log]).await
}

pub(crate) async fn apply_sleep_log_change(
    store: &LocalStore,
    op: MutationOp,
    id: &str,
    data: Option<&Value>,
) -> Result<()> {
    if op == MutationOp::Delete {
        return store.delete_sleep_log(id).await;
    }
    let Some(data) = data else {
        warn!("Sleep log change for {id} arrived without data; skipping");
        return Ok(());
    };
    upsert_sleep_log(store, data).await
}

pub(crate) async fn upsert_nappy_log(store: &LocalStore, data: &Value) -> Result<()> {
    let log: NappyLog = serde_json::from_value(data.clone())?;
    store.save_nappy_logs(&[log]).await
}

pub(crate) async fn apply_nappy_log_change(
    store: &LocalStore,
    op: MutationOp,
    id: &str,
    data: Option<&Value>,
) -> Result<()> {
    if op == MutationOp::Delete {
        return store.delete_nappy_log(id).await;
    }
    let Some(data) = data else {
        warn!("Nappy log change for {id} arrived without data; skipping");
        return Ok(());
    };
    upsert_nappy_log(store, data).await
}

pub(crate) async fn upsert_solids_log(store: &LocalStore, data: &Value) -> Result<()> {
    let log: SolidsLog = serde_json::from_value(data.clone())?;
    store.save_solids_logs(&[log]).await
}

pub(crate) async fn apply_solids_log_change(
    store: &LocalStore,
    op: MutationOp,
    id: &str,
    data: Option<&Value>,
) -> Result<()> {
    if op == MutationOp::Delete {
        return store.delete_solids_log(id).await;
    }
    let Some(data) = data else {
        warn!("Solids log change for {id} arrived without data; skipping");
        return Ok(());
    };
    upsert_solids_log(store, data).await
}

pub(crate) async fn upsert_growth_log(store: &LocalStore, data: &Value) -> Result<()> {
    let log: GrowthLog = serde_json::from_value(data.clone())?;
    store.save_growth_logs(&[log]).await
}

pub(crate) async fn apply_growth_log_change(
    store: &LocalStore,
    op: MutationOp,
    id: &str,
    data: Option<&Value>,
) -> Result<()> {
    if op == MutationOp::Delete {
        return store.delete_growth_log(id).await;
    }
    let Some(data) = data else {
        warn!("Growth log change for {id} arrived without data; skipping");
        return Ok(());
    };
    upsert_growth_log(store, data).await
}

pub(crate) async fn upsert_food_type(store: &LocalStore, data: &Value) -> Result<()> {
    let food_type: FoodType = serde_json::from_value(data.clone())?;
    store.save_food_types(&[food_type]).await
}

pub(crate) async fn apply_food_type_change(
    store: &LocalStore,
    op: MutationOp,
    id: &str,
    data: Option<&Value>,
) -> Result<()> {
    if op == MutationOp::Delete {
        return store.delete_food_type(id).await;
    }
    let Some(data) = data else {
        warn!("Food type change for {id} arrived without data; skipping");
        return Ok(());
    };
    upsert_food_type(store, data).await
}
