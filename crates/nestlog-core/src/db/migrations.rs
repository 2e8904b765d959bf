//! Database migrations

use libsql::Connection;

use crate::error::Result;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Migration to version 1: core entities, outbox, and sync bookkeeping
async fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Babies - tenant roots with soft delete via archived_at
        "CREATE TABLE IF NOT EXISTS babies (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            birth_date INTEGER,
            gender TEXT,
            birth_weight_g INTEGER,
            archived_at INTEGER,
            owner_user_id INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_babies_owner ON babies(owner_user_id)",
        // Access grants - composite key (user, baby)
        "CREATE TABLE IF NOT EXISTS baby_access (
            user_id INTEGER NOT NULL,
            baby_id INTEGER NOT NULL,
            access_level TEXT NOT NULL,
            caregiver_label TEXT,
            last_accessed_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (user_id, baby_id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_baby_access_baby ON baby_access(baby_id)",
        // Activity logs - client-generated UUID keys
        "CREATE TABLE IF NOT EXISTS feed_logs (
            id TEXT PRIMARY KEY,
            baby_id INTEGER NOT NULL,
            logged_by_user_id INTEGER NOT NULL,
            method TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            ended_at INTEGER,
            duration_minutes INTEGER,
            amount_ml INTEGER,
            is_estimated INTEGER NOT NULL DEFAULT 0,
            end_side TEXT,
            notes TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_feed_logs_baby_started ON feed_logs(baby_id, started_at)",
        "CREATE TABLE IF NOT EXISTS sleep_logs (
            id TEXT PRIMARY KEY,
            baby_id INTEGER NOT NULL,
            logged_by_user_id INTEGER NOT NULL,
            started_at INTEGER NOT NULL,
            ended_at INTEGER,
            duration_minutes INTEGER,
            notes TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_sleep_logs_baby_started ON sleep_logs(baby_id, started_at)",
        "CREATE TABLE IF NOT EXISTS nappy_logs (
            id TEXT PRIMARY KEY,
            baby_id INTEGER NOT NULL,
            logged_by_user_id INTEGER NOT NULL,
            kind TEXT,
            colour TEXT,
            consistency TEXT,
            started_at INTEGER NOT NULL,
            notes TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_nappy_logs_baby_started ON nappy_logs(baby_id, started_at)",
        "CREATE TABLE IF NOT EXISTS solids_logs (
            id TEXT PRIMARY KEY,
            baby_id INTEGER NOT NULL,
            logged_by_user_id INTEGER NOT NULL,
            food TEXT NOT NULL,
            food_type_ids TEXT NOT NULL DEFAULT '[]',
            reaction TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            notes TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_solids_logs_baby_started ON solids_logs(baby_id, started_at)",
        // Outbox - offline mutation queue
        "CREATE TABLE IF NOT EXISTS outbox (
            mutation_id TEXT PRIMARY KEY,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            op TEXT NOT NULL,
            payload TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at INTEGER NOT NULL,
            last_attempt_at INTEGER,
            error_message TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_outbox_status ON outbox(status)",
        "CREATE INDEX IF NOT EXISTS idx_outbox_created ON outbox(created_at)",
        // Per-baby pull cursors
        "CREATE TABLE IF NOT EXISTS sync_cursors (
            baby_id INTEGER PRIMARY KEY,
            cursor INTEGER NOT NULL,
            last_sync_at INTEGER NOT NULL
        )",
        // Offline auth session (singleton row)
        "CREATE TABLE IF NOT EXISTS auth_session (
            id TEXT PRIMARY KEY CHECK (id = 'current'),
            user_id INTEGER NOT NULL,
            last_auth_at INTEGER NOT NULL,
            expires_at INTEGER
        )",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: growth logs and food types
async fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        "CREATE TABLE IF NOT EXISTS growth_logs (
            id TEXT PRIMARY KEY,
            baby_id INTEGER NOT NULL,
            logged_by_user_id INTEGER NOT NULL,
            started_at INTEGER NOT NULL,
            weight_g INTEGER,
            height_mm INTEGER,
            head_circumference_mm INTEGER,
            notes TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_growth_logs_baby_started ON growth_logs(baby_id, started_at)",
        "CREATE TABLE IF NOT EXISTS food_types (
            id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_food_types_user ON food_types(user_id)",
        "INSERT INTO schema_version (version) VALUES (2)",
    ];

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap(); // Should not fail

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migration_v2_creates_food_types_table() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let mut rows = conn
            .query(
                "SELECT EXISTS(
                    SELECT 1 FROM sqlite_master
                    WHERE type = 'table' AND name = 'food_types'
                )",
                (),
            )
            .await
            .unwrap();

        let exists = rows
            .next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0);

        assert!(exists);
    }
}
