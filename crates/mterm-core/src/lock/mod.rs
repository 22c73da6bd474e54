//! Cross-session resource locks.
//!
//! - `model`: `ResourceLock` and acquire/release outcomes
//! - `manager`: the `LockManager` contract implemented by the store
//! - `lease`: `ResourceLease`, the guard the router holds while a command runs

mod lease;
mod manager;
mod model;

pub use lease::ResourceLease;
pub use manager::LockManager;
pub use model::{AcquireOutcome, ReleaseOutcome, ResourceLock};
