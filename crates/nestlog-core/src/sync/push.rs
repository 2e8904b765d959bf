//! Flushes the outbox queue to the server.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::db::LocalStore;
use crate::models::{OutboxEntry, OutboxStatus};
use crate::sync::api::{ApiResponse, SyncApi};
use crate::sync::conflict::apply_server_data;
use crate::sync::wire::{MutationStatus, PushMutation};
use crate::sync::{SyncContext, SyncError, SyncReport};

/// Push all pending outbox entries in one batch.
///
/// Serialized by the context's flush lock so concurrent triggers
/// (reconnect, interval timer, explicit sync) cannot double-submit the
/// same entries. Entries flip pending -> syncing before the request;
/// on a failed request every entry reverts to pending, so mutations
/// are never lost to a flaky network.
pub async fn flush_outbox<A: SyncApi>(ctx: &SyncContext<A>) -> Result<SyncReport, SyncError> {
    let _guard = ctx.flush_lock().lock().await;

    let pending = ctx.store().pending_outbox_entries().await?;
    if pending.is_empty() {
        return Ok(SyncReport::default());
    }

    for entry in &pending {
        ctx.store()
            .update_outbox_status(&entry.mutation_id, OutboxStatus::Syncing, None)
            .await?;
    }

    let mutations: Vec<PushMutation> = pending.iter().map(PushMutation::from).collect();
    debug!("Pushing {} queued mutations", mutations.len());

    match ctx.api().push_batch(&mutations).await {
        ApiResponse::Forbidden => handle_revoked_batch(ctx.store(), &pending).await,
        ApiResponse::Error(message) => {
            revert_to_pending(ctx.store(), &pending).await?;
            Err(SyncError::Network(message))
        }
        ApiResponse::Success(response) => {
            let mut changes_applied: u64 = 0;

            for result in &response.results {
                match result.status {
                    MutationStatus::Success => {
                        ctx.store()
                            .update_outbox_status(&result.mutation_id, OutboxStatus::Synced, None)
                            .await?;
                        changes_applied += 1;
                    }
                    MutationStatus::Conflict => {
                        // Server kept the newer version; take its snapshot
                        if let Some(snapshot) = &result.server_data {
                            apply_server_data(ctx.store(), snapshot).await?;
                        } else {
                            warn!(
                                "Conflict result for {} carried no server data",
                                result.mutation_id
                            );
                        }
                        ctx.store()
                            .update_outbox_status(&result.mutation_id, OutboxStatus::Synced, None)
                            .await?;
                        changes_applied += 1;
                    }
                    MutationStatus::Error => {
                        let message = result.error.as_deref().unwrap_or("server rejected mutation");
                        warn!("Mutation {} failed: {message}", result.mutation_id);
                        ctx.store()
                            .update_outbox_status(
                                &result.mutation_id,
                                OutboxStatus::Failed,
                                Some(message),
                            )
                            .await?;
                    }
                }
            }

            for (baby_id, cursor) in &response.new_cursors {
                ctx.store().advance_sync_cursor(*baby_id, *cursor).await?;
            }

            let purged = ctx.store().clear_synced_outbox_entries().await?;
            debug!("Cleared {purged} synced outbox entries");

            Ok(SyncReport { changes_applied })
        }
    }
}

/// A 403 on push means access to at least one baby in the batch was
/// revoked. Purge every baby the batch touches; when no baby can be
/// derived (and so nothing can be purged), treat it as a transient
/// failure and requeue.
async fn handle_revoked_batch(
    store: &LocalStore,
    pending: &[OutboxEntry],
) -> Result<SyncReport, SyncError> {
    let user_id = store.current_user_id().await?;
    let affected: BTreeSet<i64> = pending.iter().filter_map(OutboxEntry::baby_id).collect();

    if let (Some(user_id), Some(&first)) = (user_id, affected.iter().next()) {
        info!("Push rejected for revoked access; purging {} babies", affected.len());
        for &baby_id in &affected {
            store.clear_revoked_baby_data(baby_id, user_id).await?;
        }
        return Err(SyncError::AccessRevoked { baby_id: first });
    }

    revert_to_pending(store, pending).await?;
    Err(SyncError::Network(
        "push rejected with 403 but no affected baby could be derived".to_string(),
    ))
}

async fn revert_to_pending(store: &LocalStore, entries: &[OutboxEntry]) -> Result<(), SyncError> {
    for entry in entries {
        store
            .update_outbox_status(&entry.mutation_id, OutboxStatus::Pending, None)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MutationOp;
    use crate::sync::testing::{scripted_context, ScriptedApi};
    use crate::sync::wire::{ConflictSnapshot, MutationResult, PushResponse};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn feed_entry(baby_id: i64) -> OutboxEntry {
        OutboxEntry::new(
            "feed_log",
            "f1",
            MutationOp::Create,
            json!({
                "id": "f1",
                "babyId": baby_id,
                "loggedByUserId": 42,
                "method": "breast",
                "startedAt": "2025-06-01T08:00:00Z",
                "isEstimated": false,
                "createdAt": Utc::now(),
                "updatedAt": Utc::now(),
            }),
        )
    }

    fn success_response(mutation_id: &str) -> PushResponse {
        PushResponse {
            results: vec![MutationResult {
                mutation_id: mutation_id.to_string(),
                status: MutationStatus::Success,
                server_data: None,
                error: None,
            }],
            new_cursors: BTreeMap::new(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_successful_flush_clears_queue() {
        let api = ScriptedApi::default();
        let ctx = scripted_context(api).await;
        let entry = feed_entry(7);
        ctx.store().enqueue_mutation(&entry).await.unwrap();
        ctx.api().push_push(ApiResponse::Success(success_response(&entry.mutation_id)));

        let report = flush_outbox(&ctx).await.unwrap();

        assert_eq!(report.changes_applied, 1);
        assert!(ctx.store().pending_outbox_entries().await.unwrap().is_empty());
        // Synced entries are purged, not retained
        assert!(ctx
            .store()
            .get_outbox_entry(&entry.mutation_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_push_reverts_entries_to_pending() {
        let api = ScriptedApi::default();
        let ctx = scripted_context(api).await;
        let entry = feed_entry(7);
        ctx.store().enqueue_mutation(&entry).await.unwrap();
        ctx.api().push_push(ApiResponse::Error("HTTP 502".to_string()));

        let error = flush_outbox(&ctx).await.unwrap_err();

        assert!(matches!(error, SyncError::Network(_)));
        let pending = ctx.store().pending_outbox_entries().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].mutation_id, entry.mutation_id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_server_error_result_marks_entry_failed() {
        let api = ScriptedApi::default();
        let ctx = scripted_context(api).await;
        let entry = feed_entry(7);
        ctx.store().enqueue_mutation(&entry).await.unwrap();
        ctx.api().push_push(ApiResponse::Success(PushResponse {
            results: vec![MutationResult {
                mutation_id: entry.mutation_id.clone(),
                status: MutationStatus::Error,
                server_data: None,
                error: Some("validation failed".to_string()),
            }],
            new_cursors: BTreeMap::new(),
        }));

        flush_outbox(&ctx).await.unwrap();

        let failed = ctx.store().failed_outbox_entries().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error_message.as_deref(), Some("validation failed"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_conflict_applies_server_snapshot() {
        let api = ScriptedApi::default();
        let ctx = scripted_context(api).await;
        let entry = feed_entry(7);
        ctx.store().enqueue_mutation(&entry).await.unwrap();
        ctx.api().push_push(ApiResponse::Success(PushResponse {
            results: vec![MutationResult {
                mutation_id: entry.mutation_id.clone(),
                status: MutationStatus::Conflict,
                server_data: Some(ConflictSnapshot {
                    entity_type: "feed_log".to_string(),
                    data: json!({
                        "id": "f1",
                        "babyId": 7,
                        "loggedByUserId": 43,
                        "method": "bottle",
                        "startedAt": "2025-06-01T08:00:00Z",
                        "amountMl": 90,
                        "isEstimated": false,
                        "createdAt": Utc::now(),
                        "updatedAt": Utc::now(),
                    }),
                }),
                error: None,
            }],
            new_cursors: BTreeMap::new(),
        }));

        let report = flush_outbox(&ctx).await.unwrap();

        assert_eq!(report.changes_applied, 1);
        let log = ctx.store().get_feed_log("f1").await.unwrap().unwrap();
        assert_eq!(log.amount_ml, Some(90));
        // The losing local mutation is confirmed and purged, not retried
        assert!(ctx
            .store()
            .get_outbox_entry(&entry.mutation_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_push_cursor_advances_per_baby() {
        let api = ScriptedApi::default();
        let ctx = scripted_context(api).await;
        let entry = feed_entry(7);
        ctx.store().enqueue_mutation(&entry).await.unwrap();
        let mut response = success_response(&entry.mutation_id);
        response.new_cursors.insert(7, 88);
        ctx.api().push_push(ApiResponse::Success(response));

        flush_outbox(&ctx).await.unwrap();

        assert_eq!(ctx.store().sync_cursor(7).await.unwrap(), 88);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_forbidden_purges_affected_babies() {
        let api = ScriptedApi::default();
        let ctx = scripted_context(api).await;
        ctx.store().save_auth_session(42).await.unwrap();
        crate::sync::codec::upsert_baby(
            ctx.store(),
            &json!({
                "id": 7,
                "name": "Willow",
                "ownerUserId": 99,
                "createdAt": Utc::now(),
                "updatedAt": Utc::now(),
                "access": [{
                    "userId": 42,
                    "babyId": 7,
                    "accessLevel": "editor",
                    "createdAt": Utc::now(),
                    "updatedAt": Utc::now(),
                }],
            }),
        )
        .await
        .unwrap();
        ctx.store().enqueue_mutation(&feed_entry(7)).await.unwrap();
        ctx.api().push_push(ApiResponse::Forbidden);

        let error = flush_outbox(&ctx).await.unwrap_err();

        assert!(matches!(error, SyncError::AccessRevoked { baby_id: 7 }));
        assert!(ctx.store().get_baby(7).await.unwrap().is_none());
        // The queued mutation targeting the purged baby went with it
        assert!(ctx.store().pending_outbox_entries().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_forbidden_without_derivable_baby_requeues() {
        let api = ScriptedApi::default();
        let ctx = scripted_context(api).await;
        ctx.store().save_auth_session(42).await.unwrap();
        let entry = OutboxEntry::new(
            "food_type",
            "ft1",
            MutationOp::Create,
            json!({"id": "ft1", "userId": 42, "name": "Banana"}),
        );
        ctx.store().enqueue_mutation(&entry).await.unwrap();
        ctx.api().push_push(ApiResponse::Forbidden);

        let error = flush_outbox(&ctx).await.unwrap_err();

        assert!(matches!(error, SyncError::Network(_)));
        assert_eq!(ctx.store().pending_outbox_entries().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_queue_skips_request() {
        let api = ScriptedApi::default();
        let ctx = scripted_context(api).await;

        let report = flush_outbox(&ctx).await.unwrap();

        assert_eq!(report, SyncReport::default());
        assert!(ctx.api().pushed_batches().is_empty());
    }
}
