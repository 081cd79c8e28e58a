//! Small helpers shared by the backup flows.

mod owner;
pub mod retention;
pub mod retry;

pub use owner::Owner;
pub use retention::{prune_backups, RetentionConfig};
pub use retry::{RetryPolicy, Sleep, ThreadSleep};
