//! Outbox queue, sync cursors, and offline session storage

use chrono::{DateTime, Duration, Utc};
use libsql::{params, Row};

use crate::error::Result;
use crate::models::{AuthSession, MutationOp, OutboxEntry, OutboxStatus, SyncCursor};

use super::store::{
    enum_from_text, enum_to_text, from_millis, opt_from_millis, opt_millis, to_millis,
};
use super::LocalStore;

/// How long a successful sync keeps offline access alive
pub fn offline_session_window() -> Duration {
    Duration::days(7)
}

// ---------------------------------------------------------------------------
// Outbox
// ---------------------------------------------------------------------------

impl LocalStore {
    /// Append a mutation to the outbox
    pub async fn enqueue_mutation(&self, entry: &OutboxEntry) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO outbox
                 (mutation_id, entity_type, entity_id, op, payload, status,
                  created_at, last_attempt_at, error_message)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    entry.mutation_id.clone(),
                    entry.entity_type.clone(),
                    entry.entity_id.clone(),
                    enum_to_text(&entry.op)?,
                    serde_json::to_string(&entry.payload)?,
                    enum_to_text(&entry.status)?,
                    to_millis(entry.created_at),
                    opt_millis(entry.last_attempt_at),
                    entry.error_message.clone(),
                ],
            )
            .await?;
        Ok(())
    }

    /// All `pending` entries, oldest first
    pub async fn pending_outbox_entries(&self) -> Result<Vec<OutboxEntry>> {
        self.outbox_entries_with_status(OutboxStatus::Pending).await
    }

    /// All `failed` entries, oldest first
    pub async fn failed_outbox_entries(&self) -> Result<Vec<OutboxEntry>> {
        self.outbox_entries_with_status(OutboxStatus::Failed).await
    }

    async fn outbox_entries_with_status(&self, status: OutboxStatus) -> Result<Vec<OutboxEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT mutation_id, entity_type, entity_id, op, payload, status,
                        created_at, last_attempt_at, error_message
                 FROM outbox WHERE status = ? ORDER BY created_at ASC",
                params![enum_to_text(&status)?],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(parse_outbox_entry(&row)?);
        }
        Ok(entries)
    }

    /// Look up a single entry by mutation id
    pub async fn get_outbox_entry(&self, mutation_id: &str) -> Result<Option<OutboxEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT mutation_id, entity_type, entity_id, op, payload, status,
                        created_at, last_attempt_at, error_message
                 FROM outbox WHERE mutation_id = ?",
                params![mutation_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(parse_outbox_entry(&row)?)),
            None => Ok(None),
        }
    }

    /// Transition an entry's status, stamping the attempt time
    pub async fn update_outbox_status(
        &self,
        mutation_id: &str,
        status: OutboxStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE outbox SET status = ?, last_attempt_at = ?, error_message = ?
                 WHERE mutation_id = ?",
                params![
                    enum_to_text(&status)?,
                    to_millis(Utc::now()),
                    error_message.map(str::to_string),
                    mutation_id,
                ],
            )
            .await?;
        Ok(())
    }

    /// Purge entries confirmed by the server; returns how many were removed
    pub async fn clear_synced_outbox_entries(&self) -> Result<u64> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM outbox WHERE status = ?",
                params![enum_to_text(&OutboxStatus::Synced)?],
            )
            .await?;
        Ok(removed)
    }

    /// Flip `failed` entries back to `pending` for another attempt
    pub async fn retry_failed_outbox_entries(&self) -> Result<()> {
        self.conn
            .execute(
                "UPDATE outbox SET status = ?, error_message = NULL WHERE status = ?",
                params![
                    enum_to_text(&OutboxStatus::Pending)?,
                    enum_to_text(&OutboxStatus::Failed)?,
                ],
            )
            .await?;
        Ok(())
    }

    /// Recovery sweep: requeue entries stuck in `syncing` longer than
    /// `max_age` (e.g. after a crash between marking and the server's
    /// response). Returns how many entries were requeued.
    pub async fn requeue_stuck_entries(&self, max_age: Duration) -> Result<u64> {
        let cutoff = to_millis(Utc::now() - max_age);
        let requeued = self
            .conn
            .execute(
                "UPDATE outbox SET status = ?
                 WHERE status = ? AND COALESCE(last_attempt_at, created_at) < ?",
                params![
                    enum_to_text(&OutboxStatus::Pending)?,
                    enum_to_text(&OutboxStatus::Syncing)?,
                    cutoff,
                ],
            )
            .await?;
        if requeued > 0 {
            tracing::warn!("Requeued {requeued} outbox entries stuck in syncing");
        }
        Ok(requeued)
    }
}

fn parse_outbox_entry(row: &Row) -> Result<OutboxEntry> {
    let op: MutationOp = enum_from_text(&row.get::<String>(3)?)?;
    let status: OutboxStatus = enum_from_text(&row.get::<String>(5)?)?;
    Ok(OutboxEntry {
        mutation_id: row.get(0)?,
        entity_type: row.get(1)?,
        entity_id: row.get(2)?,
        op,
        payload: serde_json::from_str(&row.get::<String>(4)?)?,
        status,
        created_at: from_millis(row.get(6)?),
        last_attempt_at: opt_from_millis(row.get(7)?),
        error_message: row.get(8)?,
    })
}

// ---------------------------------------------------------------------------
// Sync cursors
// ---------------------------------------------------------------------------

impl LocalStore {
    /// Stored cursor for a baby; 0 when no pull has happened yet
    pub async fn sync_cursor(&self, baby_id: i64) -> Result<i64> {
        let mut rows = self
            .conn
            .query(
                "SELECT cursor FROM sync_cursors WHERE baby_id = ?",
                params![baby_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    /// Advance a baby's cursor to `max(current, cursor)`.
    ///
    /// A stale or duplicate response can therefore never move the
    /// watermark backward.
    pub async fn advance_sync_cursor(&self, baby_id: i64, cursor: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_cursors (baby_id, cursor, last_sync_at)
                 VALUES (?, ?, ?)
                 ON CONFLICT(baby_id) DO UPDATE SET
                     cursor = MAX(cursor, excluded.cursor),
                     last_sync_at = excluded.last_sync_at",
                params![baby_id, cursor, to_millis(Utc::now())],
            )
            .await?;
        Ok(())
    }

    /// Full cursor row, if one exists
    pub async fn get_sync_cursor_row(&self, baby_id: i64) -> Result<Option<SyncCursor>> {
        let mut rows = self
            .conn
            .query(
                "SELECT baby_id, cursor, last_sync_at FROM sync_cursors WHERE baby_id = ?",
                params![baby_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(SyncCursor {
                baby_id: row.get(0)?,
                cursor: row.get(1)?,
                last_sync_at: from_millis(row.get(2)?),
            })),
            None => Ok(None),
        }
    }
}

// ---------------------------------------------------------------------------
// Offline auth session
// ---------------------------------------------------------------------------

impl LocalStore {
    /// Current session marker, if a user has authenticated on this device
    pub async fn auth_session(&self) -> Result<Option<AuthSession>> {
        let mut rows = self
            .conn
            .query(
                "SELECT user_id, last_auth_at, expires_at FROM auth_session WHERE id = 'current'",
                (),
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(AuthSession {
                user_id: row.get(0)?,
                last_auth_at: from_millis(row.get(1)?),
                expires_at: opt_from_millis(row.get(2)?),
            })),
            None => Ok(None),
        }
    }

    /// Record a successful authentication, opening the offline window
    pub async fn save_auth_session(&self, user_id: i64) -> Result<()> {
        let now = Utc::now();
        self.put_auth_session(user_id, now, Some(now + offline_session_window()))
            .await
    }

    /// Extend the offline window after a successful sync.
    ///
    /// No-op when no session is stored.
    pub async fn refresh_auth_session(&self) -> Result<()> {
        let Some(session) = self.auth_session().await? else {
            return Ok(());
        };
        let now = Utc::now();
        self.put_auth_session(session.user_id, now, Some(now + offline_session_window()))
            .await
    }

    /// Locally cached user id, if any session marker exists
    pub async fn current_user_id(&self) -> Result<Option<i64>> {
        Ok(self.auth_session().await?.map(|session| session.user_id))
    }

    /// Drop the session marker (sign out)
    pub async fn clear_auth_session(&self) -> Result<()> {
        self.conn
            .execute("DELETE FROM auth_session WHERE id = 'current'", ())
            .await?;
        Ok(())
    }

    async fn put_auth_session(
        &self,
        user_id: i64,
        last_auth_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO auth_session (id, user_id, last_auth_at, expires_at)
                 VALUES ('current', ?, ?, ?)",
                params![user_id, to_millis(last_auth_at), opt_millis(expires_at)],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> LocalStore {
        let db = Database::open_in_memory().await.unwrap();
        LocalStore::new(&db)
    }

    fn entry(entity_id: &str) -> OutboxEntry {
        OutboxEntry::new(
            "feed_log",
            entity_id,
            MutationOp::Create,
            json!({"babyId": 7, "id": entity_id}),
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_outbox_lifecycle() {
        let store = setup().await;
        let e = entry("f1");
        store.enqueue_mutation(&e).await.unwrap();

        let pending = store.pending_outbox_entries().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].mutation_id, e.mutation_id);

        store
            .update_outbox_status(&e.mutation_id, OutboxStatus::Syncing, None)
            .await
            .unwrap();
        assert!(store.pending_outbox_entries().await.unwrap().is_empty());

        store
            .update_outbox_status(&e.mutation_id, OutboxStatus::Synced, None)
            .await
            .unwrap();
        let removed = store.clear_synced_outbox_entries().await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_outbox_entry(&e.mutation_id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_entries_can_be_retried() {
        let store = setup().await;
        let e = entry("f1");
        store.enqueue_mutation(&e).await.unwrap();
        store
            .update_outbox_status(&e.mutation_id, OutboxStatus::Failed, Some("server said no"))
            .await
            .unwrap();

        let failed = store.failed_outbox_entries().await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].error_message.as_deref(), Some("server said no"));

        store.retry_failed_outbox_entries().await.unwrap();
        let pending = store.pending_outbox_entries().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].error_message.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_requeue_stuck_entries() {
        let store = setup().await;
        let e = entry("f1");
        store.enqueue_mutation(&e).await.unwrap();
        store
            .update_outbox_status(&e.mutation_id, OutboxStatus::Syncing, None)
            .await
            .unwrap();

        // A generous cutoff leaves the fresh entry alone
        let requeued = store.requeue_stuck_entries(Duration::minutes(5)).await.unwrap();
        assert_eq!(requeued, 0);

        // A zero cutoff reclaims it
        let requeued = store.requeue_stuck_entries(Duration::zero()).await.unwrap();
        assert_eq!(requeued, 1);
        assert_eq!(store.pending_outbox_entries().await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cursor_defaults_to_zero_and_never_regresses() {
        let store = setup().await;
        assert_eq!(store.sync_cursor(7).await.unwrap(), 0);

        store.advance_sync_cursor(7, 50).await.unwrap();
        assert_eq!(store.sync_cursor(7).await.unwrap(), 50);

        // Stale response with a lower cursor must not move it backward
        store.advance_sync_cursor(7, 10).await.unwrap();
        assert_eq!(store.sync_cursor(7).await.unwrap(), 50);

        store.advance_sync_cursor(7, 120).await.unwrap();
        assert_eq!(store.sync_cursor(7).await.unwrap(), 120);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_auth_session_refresh_extends_window() {
        let store = setup().await;
        assert!(store.current_user_id().await.unwrap().is_none());

        store.save_auth_session(42).await.unwrap();
        assert_eq!(store.current_user_id().await.unwrap(), Some(42));

        let before = store.auth_session().await.unwrap().unwrap();
        store.refresh_auth_session().await.unwrap();
        let after = store.auth_session().await.unwrap().unwrap();
        assert!(after.expires_at.unwrap() >= before.expires_at.unwrap());
        assert!(after.is_valid_at(Utc::now()));

        store.clear_auth_session().await.unwrap();
        assert!(store.auth_session().await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_refresh_without_session_is_noop() {
        let store = setup().await;
        store.refresh_auth_session().await.unwrap();
        assert!(store.auth_session().await.unwrap().is_none());
    }
}
