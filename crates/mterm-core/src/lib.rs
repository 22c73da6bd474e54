pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod history;
pub mod interpreter;
pub mod lock;
pub mod path;
pub mod session;

// Re-export common error type
pub use error::{MtermError, Result};
