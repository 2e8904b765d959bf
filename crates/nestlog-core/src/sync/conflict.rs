//! Last-write-wins conflict resolution.
//!
//! When a push reports a conflict, the server has already kept the
//! newer version (by `updatedAt`) and returns its snapshot tagged with
//! the entity type. Resolving a conflict is therefore just upserting
//! that snapshot locally.

use tracing::warn;

use crate::db::LocalStore;
use crate::error::Result;
use crate::sync::codec;
use crate::sync::wire::ConflictSnapshot;

/// Overwrite local state with the server's winning snapshot.
///
/// Unrecognized entity tags are logged and skipped so a server-side
/// addition never fails the rest of the push batch.
pub async fn apply_server_data(store: &LocalStore, snapshot: &ConflictSnapshot) -> Result<()> {
    match snapshot.entity_type.as_str() {
        "baby" => codec::upsert_baby(store, &snapshot.data).await,
        "feed_log" => codec::upsert_feed_log(store, &snapshot.data).await,
        "sleep_log" => codec::upsert_sleep_log(store, &snapshot.data).await,
        "nappy_log" => codec::upsert_nappy_log(store, &snapshot.data).await,
        "solids_log" => codec::upsert_solids_log(store, &snapshot.data).await,
        "growth_log" => codec::upsert_growth_log(store, &snapshot.data).await,
        "food_type" => codec::upsert_food_type(store, &snapshot.data).await,
        other => {
            warn!("Conflict snapshot with unknown entity type '{other}'; skipping");
            Ok(())
        }
    }
}
