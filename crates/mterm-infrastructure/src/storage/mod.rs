//! Storage primitives shared by every repository.

mod atomic_toml;
mod store_lock;

pub use atomic_toml::{AtomicTomlError, AtomicTomlFile};
pub use store_lock::StoreLock;
