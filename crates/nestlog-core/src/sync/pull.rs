//! Incremental pull of server-side changes, one baby at a time.

use tracing::{debug, info};

use crate::sync::api::{ApiResponse, SyncApi};
use crate::sync::apply::apply_change;
use crate::sync::{SyncContext, SyncError, SyncReport};

/// Page size requested from the pull endpoint
pub const PULL_PAGE_SIZE: u32 = 100;

/// Pull and apply all changes for one baby since its stored cursor.
///
/// Pages sequentially until the server reports no more changes,
/// advancing the cursor after each fully applied page so an
/// interrupted pull resumes from the last complete page. A 403
/// response means access to this baby was revoked: all locally held
/// data scoped to it is purged and the error is surfaced so the caller
/// can drop the baby from its tracked set.
pub async fn pull_changes<A: SyncApi>(
    ctx: &SyncContext<A>,
    baby_id: i64,
) -> Result<SyncReport, SyncError> {
    let mut changes_applied: u64 = 0;

    loop {
        let cursor = ctx.store().sync_cursor(baby_id).await?;
        match ctx.api().pull_page(baby_id, cursor, PULL_PAGE_SIZE).await {
            ApiResponse::Forbidden => {
                info!("Access revoked for baby {baby_id}; purging local data");
                if let Some(user_id) = ctx.store().current_user_id().await? {
                    ctx.store().clear_revoked_baby_data(baby_id, user_id).await?;
                }
                return Err(SyncError::AccessRevoked { baby_id });
            }
            ApiResponse::Error(message) => {
                // Cursor untouched; the same page is retried next sync
                return Err(SyncError::Network(message));
            }
            ApiResponse::Success(page) => {
                debug!(
                    "Applying {} changes for baby {baby_id} (cursor {cursor} -> {})",
                    page.changes.len(),
                    page.next_cursor
                );
                for change in &page.changes {
                    apply_change(ctx.store(), change).await?;
                    changes_applied += 1;
                }
                ctx.store()
                    .advance_sync_cursor(baby_id, page.next_cursor)
                    .await?;
                if !page.has_more {
                    break;
                }
            }
        }
    }

    Ok(SyncReport { changes_applied })
}
