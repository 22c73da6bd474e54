//! Session domain module.
//!
//! # Module Structure
//!
//! - `model`: Core session domain model (`Session`, `SessionId`)
//! - `repository`: Repository trait for session persistence
//! - `manager`: Session lifecycle management (`SessionManager`)

mod manager;
mod model;
mod repository;


pub use manager::SessionManager;
pub use model::{Session, SessionChange, SessionId, SessionStats};
pub use repository::SessionRepository;
