//! Sync bookkeeping models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-baby watermark into the server's change stream.
///
/// The cursor is opaque and monotonically non-decreasing; the store
/// never moves it backward, even when a stale response arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    pub baby_id: i64,
    pub cursor: i64,
    pub last_sync_at: DateTime<Utc>,
}

/// Singleton session marker enabling offline access.
///
/// A previously authenticated user keeps access to cached data while the
/// session is unexpired; each successful sync extends the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub user_id: i64,
    pub last_auth_at: DateTime<Utc>,
    /// `None` means the session never expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthSession {
    /// Whether the session still grants offline access at `now`
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expiry| now < expiry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_session_validity() {
        let now = Utc::now();
        let session = AuthSession {
            user_id: 1,
            last_auth_at: now,
            expires_at: Some(now + Duration::days(7)),
        };
        assert!(session.is_valid_at(now));
        assert!(!session.is_valid_at(now + Duration::days(8)));

        let unbounded = AuthSession {
            expires_at: None,
            ..session
        };
        assert!(unbounded.is_valid_at(now + Duration::days(365)));
    }
}
