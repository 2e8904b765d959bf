//! Database layer for nestlog

mod connection;
mod migrations;
mod store;
mod sync_store;

pub use connection::Database;
pub use store::LocalStore;
pub use sync_store::offline_session_window;
