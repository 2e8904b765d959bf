//! Data models for nestlog

mod baby;
mod food_type;
mod logs;
mod outbox;
mod sync_meta;

pub use baby::{AccessLevel, Baby, BabyAccess, Gender};
pub use food_type::FoodType;
pub use logs::{
    new_log_id, FeedLog, FeedMethod, FeedSide, GrowthLog, NappyColour, NappyConsistency, NappyKind,
    NappyLog, SleepLog, SolidsLog, SolidsReaction,
};
pub use outbox::{MutationOp, OutboxEntry, OutboxStatus};
pub use sync_meta::{AuthSession, SyncCursor};
