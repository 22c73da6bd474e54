//! Per-session command history.
//!
//! - `model`: persisted record types (`HistoryEntry`, `Outcome`, ...)
//! - `repository`: the append-only store contract

mod model;
mod repository;

pub use model::{HistoryEntry, InputKind, NewHistoryEntry, Outcome, OutcomeStatus};
pub use repository::{HistoryIter, HistoryPage, HistoryRepository};
