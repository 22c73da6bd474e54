//! Persisted record formats, kept apart from the domain models.

mod lock_table;
mod session;

pub use lock_table::{LockRecord, LockTableRecord};
pub use session::{CurrentSessionRecord, SESSION_RECORD_VERSION, SessionRecord};
