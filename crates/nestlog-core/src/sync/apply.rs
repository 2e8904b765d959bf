//! Applies server change records to the local store.

use serde_json::Value;
use tracing::warn;

use crate::db::LocalStore;
use crate::error::Result;
use crate::sync::codec;
use crate::sync::wire::SyncChange;

/// Apply one pulled change, dispatching on its entity type.
///
/// Unknown entity types are logged and skipped rather than failing, so
/// one server-side addition never aborts a whole pull batch.
pub async fn apply_change(store: &LocalStore, change: &SyncChange) -> Result<()> {
    match change.entity.as_str() {
        "baby" => {
            let Some(id) = numeric_id(&change.id) else {
                warn!("Baby change arrived with non-numeric id {:?}; skipping", change.id);
                return Ok(());
            };
            codec::apply_baby_change(store, change.op, id, change.data.as_ref()).await
        }
        "feed_log" => {
            codec::apply_feed_log_change(store, change.op, &string_id(&change.id), change.data.as_ref())
                .await
        }
        "sleep_log" => {
            codec::apply_sleep_log_change(store, change.op, &string_id(&change.id), change.data.as_ref())
                .await
        }
        "nappy_log" => {
            codec::apply_nappy_log_change(store, change.op, &string_id(&change.id), change.data.as_ref())
                .await
        }
        "solids_log" => {
            codec::apply_solids_log_change(store, change.op, &string_id(&change.id), change.data.as_ref())
                .await
        }
        "growth_log" => {
            codec::apply_growth_log_change(store, change.op, &string_id(&change.id), change.data.as_ref())
                .await
        }
        "food_type" => {
            codec::apply_food_type_change(store, change.op, &string_id(&change.id), change.data.as_ref())
                .await
        }
        other => {
            warn!("Unknown entity type '{other}' in change stream; skipping");
            Ok(())
        }
    }
}

/// Wire ids are strings for log entities but the server has sent bare
/// numbers in older payloads; accept both.
fn string_id(id: &Value) -> String {
    match id {
        Value::String(id) => id.clone(),
        other => other.to_string(),
    }
}

fn numeric_id(id: &Value) -> Option<i64> {
    match id {
        Value::Number(number) => number.as_i64(),
        Value::String(id) => id.parse().ok(),
        _ => None,
    }
}
