//! Offline-first synchronization: outbox push, incremental pull, and
//! last-write-wins conflict resolution.
//!
//! Local writes are queued in an outbox and flushed opportunistically;
//! server changes are pulled per baby from a monotonic cursor. A full
//! sync pushes first (so the server resolves conflicts against this
//! client's latest writes), then pulls every tracked baby.

mod api;
mod apply;
mod codec;
mod conflict;
mod pull;
mod push;
mod wire;

use chrono::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::db::LocalStore;

pub use api::{ApiResponse, HttpSyncApi, SyncApi};
pub use apply::apply_change;
pub use codec::BabyPayload;
pub use conflict::apply_server_data;
pub use pull::{pull_changes, PULL_PAGE_SIZE};
pub use push::flush_outbox;
pub use wire::{
    ConflictSnapshot, MutationResult, MutationStatus, PullPage, PushMutation, PushResponse,
    SyncChange,
};

/// Entries stuck in `syncing` longer than this are assumed to belong
/// to a crashed flush and are requeued at the start of a full sync.
pub fn stuck_entry_max_age() -> Duration {
    Duration::minutes(5)
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport failure or non-403 server error; retried next sync
    #[error("Sync request failed: {0}")]
    Network(String),
    /// The server revoked this client's access to a baby
    #[error("Access revoked for baby {baby_id}")]
    AccessRevoked { baby_id: i64 },
    #[error(transparent)]
    Store(#[from] crate::Error),
}

/// Outcome of one push or one per-baby pull
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub changes_applied: u64,
}

/// Aggregate outcome of a full sync pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FullSyncReport {
    pub changes_applied: u64,
    /// Babies whose access was revoked during this pass; their local
    /// data has already been purged
    pub revoked_babies: Vec<i64>,
}

/// Everything a sync operation needs: the local store, the API
/// transport, and the lock that serializes outbox flushes.
pub struct SyncContext<A: SyncApi> {
    store: LocalStore,
    api: A,
    flush_lock: Mutex<()>,
}

impl<A: SyncApi> SyncContext<A> {
    pub fn new(store: LocalStore, api: A) -> Self {
        Self {
            store,
            api,
            flush_lock: Mutex::new(()),
        }
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub const fn api(&self) -> &A {
        &self.api
    }

    pub(crate) const fn flush_lock(&self) -> &Mutex<()> {
        &self.flush_lock
    }
}

/// Run one complete sync pass: recover stuck entries, flush the
/// outbox, then pull changes for every tracked baby.
///
/// Individual failures are logged and do not abort the pass; a flaky
/// pull for one baby must not starve the others. Revoked babies are
/// collected in the report (their data is purged as soon as the 403
/// is seen) and skipped for the rest of the pass.
pub async fn perform_full_sync<A: SyncApi>(
    ctx: &SyncContext<A>,
    baby_ids: &[i64],
) -> Result<FullSyncReport, SyncError> {
    let requeued = ctx.store().requeue_stuck_entries(stuck_entry_max_age()).await?;
    if requeued > 0 {
        info!("Requeued {requeued} outbox entries stuck in syncing");
    }

    let mut report = FullSyncReport::default();
    let mut server_reached = false;

    match flush_outbox(ctx).await {
        Ok(push_report) => {
            report.changes_applied += push_report.changes_applied;
            server_reached = true;
        }
        Err(SyncError::AccessRevoked { baby_id }) => report.revoked_babies.push(baby_id),
        Err(error) => warn!("Outbox flush failed: {error}"),
    }

    for &baby_id in baby_ids {
        if report.revoked_babies.contains(&baby_id) {
            continue;
        }
        match pull_changes(ctx, baby_id).await {
            Ok(pull_report) => {
                report.changes_applied += pull_report.changes_applied;
                server_reached = true;
            }
            Err(SyncError::AccessRevoked { baby_id }) => report.revoked_babies.push(baby_id),
            Err(error) => warn!("Pull failed for baby {baby_id}: {error}"),
        }
    }

    if server_reached {
        // Contact with the server proves the account is still live, so
        // the offline grace window restarts. A failure here must not
        // fail the pass; the applied changes are already committed.
        if let Err(error) = ctx.store().refresh_auth_session().await {
            warn!("Failed to refresh auth session: {error}");
        }
    }

    Ok(report)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::db::Database;
    use crate::sync::api::{ApiResponse, SyncApi};
    use crate::sync::wire::{PullPage, PushMutation, PushResponse};
    use crate::sync::SyncContext;
    use crate::LocalStore;

    /// [`SyncApi`] that replays queued responses and records requests.
    #[derive(Default)]
    pub(crate) struct ScriptedApi {
        pulls: Mutex<VecDeque<ApiResponse<PullPage>>>,
        pushes: Mutex<VecDeque<ApiResponse<PushResponse>>>,
        pull_log: Mutex<Vec<(i64, i64)>>,
        push_log: Mutex<Vec<Vec<PushMutation>>>,
    }

    impl ScriptedApi {
        pub(crate) fn push_pull(&self, response: ApiResponse<PullPage>) {
            self.pulls.lock().unwrap().push_back(response);
        }

        pub(crate) fn push_push(&self, response: ApiResponse<PushResponse>) {
            self.pushes.lock().unwrap().push_back(response);
        }

        /// `(baby_id, since)` of every pull request seen
        pub(crate) fn pull_requests(&self) -> Vec<(i64, i64)> {
            self.pull_log.lock().unwrap().clone()
        }

        pub(crate) fn pushed_batches(&self) -> Vec<Vec<PushMutation>> {
            self.push_log.lock().unwrap().clone()
        }
    }

    impl SyncApi for ScriptedApi {
        async fn pull_page(&self, baby_id: i64, since: i64, _limit: u32) -> ApiResponse<PullPage> {
            self.pull_log.lock().unwrap().push((baby_id, since));
            self.pulls
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| ApiResponse::Error("scripted pull responses exhausted".to_string()))
        }

        async fn push_batch(&self, mutations: &[PushMutation]) -> ApiResponse<PushResponse> {
            self.push_log.lock().unwrap().push(mutations.to_vec());
            self.pushes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| ApiResponse::Error("scripted push responses exhausted".to_string()))
        }
    }

    pub(crate) async fn scripted_context(api: ScriptedApi) -> SyncContext<ScriptedApi> {
        let db = Database::open_in_memory().await.unwrap();
        SyncContext::new(LocalStore::new(&db), api)
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{scripted_context, ScriptedApi};
    use super::*;
    use crate::models::{MutationOp, OutboxEntry, OutboxStatus};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn empty_page(next_cursor: i64) -> wire::PullPage {
        wire::PullPage {
            changes: vec![],
            next_cursor,
            has_more: false,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_full_sync_pushes_before_pulling() {
        let api = ScriptedApi::default();
        let ctx = scripted_context(api).await;
        let entry = OutboxEntry::new(
            "feed_log",
            "f1",
            MutationOp::Create,
            json!({"babyId": 7}),
        );
        ctx.store().enqueue_mutation(&entry).await.unwrap();
        ctx.api().push_push(ApiResponse::Success(wire::PushResponse {
            results: vec![wire::MutationResult {
                mutation_id: entry.mutation_id.clone(),
                status: wire::MutationStatus::Success,
                server_data: None,
                error: None,
            }],
            new_cursors: BTreeMap::new(),
        }));
        ctx.api().push_pull(ApiResponse::Success(empty_page(10)));

        let report = perform_full_sync(&ctx, &[7]).await.unwrap();

        assert_eq!(report.changes_applied, 1);
        assert_eq!(ctx.api().pushed_batches().len(), 1);
        assert_eq!(ctx.api().pull_requests(), vec![(7, 0)]);
        assert_eq!(ctx.store().sync_cursor(7).await.unwrap(), 10);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_one_failing_pull_does_not_starve_others() {
        let api = ScriptedApi::default();
        let ctx = scripted_context(api).await;
        ctx.api().push_pull(ApiResponse::Error("HTTP 500".to_string()));
        ctx.api().push_pull(ApiResponse::Success(empty_page(20)));

        let report = perform_full_sync(&ctx, &[7, 9]).await.unwrap();

        assert_eq!(report.revoked_babies, Vec::<i64>::new());
        assert_eq!(ctx.store().sync_cursor(7).await.unwrap(), 0);
        assert_eq!(ctx.store().sync_cursor(9).await.unwrap(), 20);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_revoked_baby_is_reported_and_purged() {
        let api = ScriptedApi::default();
        let ctx = scripted_context(api).await;
        ctx.store().save_auth_session(42).await.unwrap();
        ctx.api().push_pull(ApiResponse::Forbidden);
        ctx.api().push_pull(ApiResponse::Success(empty_page(15)));

        let report = perform_full_sync(&ctx, &[7, 9]).await.unwrap();

        assert_eq!(report.revoked_babies, vec![7]);
        assert_eq!(ctx.store().sync_cursor(9).await.unwrap(), 15);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_full_sync_requeues_stuck_entries() {
        let api = ScriptedApi::default();
        let ctx = scripted_context(api).await;
        let mut entry = OutboxEntry::new(
            "feed_log",
            "f1",
            MutationOp::Create,
            json!({"babyId": 7}),
        );
        entry.status = OutboxStatus::Syncing;
        entry.created_at = Utc::now() - Duration::minutes(30);
        ctx.store().enqueue_mutation(&entry).await.unwrap();
        ctx.api().push_push(ApiResponse::Error("HTTP 502".to_string()));

        perform_full_sync(&ctx, &[]).await.unwrap();

        // The stale syncing entry went back to pending and was offered
        // to the (failing) push, so it is still pending afterwards
        let pending = ctx.store().pending_outbox_entries().await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_session_refresh_does_not_fail_the_pass() {
        let api = ScriptedApi::default();
        let ctx = scripted_context(api).await;
        ctx.api().push_pull(ApiResponse::Success(empty_page(5)));

        // Break only the session table; the pull itself still applies
        ctx.store()
            .conn
            .execute("DROP TABLE auth_session", ())
            .await
            .unwrap();

        let report = perform_full_sync(&ctx, &[7]).await.unwrap();

        assert_eq!(report.revoked_babies, Vec::<i64>::new());
        assert_eq!(ctx.store().sync_cursor(7).await.unwrap(), 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_successful_pass_refreshes_session_window() {
        let api = ScriptedApi::default();
        let ctx = scripted_context(api).await;
        ctx.store().save_auth_session(42).await.unwrap();
        let before = ctx.store().auth_session().await.unwrap().unwrap();
        ctx.api().push_pull(ApiResponse::Success(empty_page(5)));

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        perform_full_sync(&ctx, &[7]).await.unwrap();

        let after = ctx.store().auth_session().await.unwrap().unwrap();
        assert!(after.last_auth_at >= before.last_auth_at);
        assert_eq!(after.user_id, 42);
    }
}
