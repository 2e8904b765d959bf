//! nestlog-core - Offline-first sync engine for Nestlog
//!
//! This crate contains the local store, outbox mutation queue, and
//! pull/push sync protocol shared by all Nestlog clients. All baby and
//! log data lives in a local SQLite database; the sync layer reconciles
//! it with the server using per-baby cursors and last-write-wins
//! conflict resolution.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod sync;

pub use config::SyncConfig;
pub use db::{Database, LocalStore};
pub use error::{Error, Result};
