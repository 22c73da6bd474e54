pub mod config_service;
pub mod dto;
pub mod jsonl_history_repository;
pub mod paths;
pub mod storage;
pub mod store;
pub mod toml_lock_table;
pub mod toml_session_repository;

pub use crate::config_service::ConfigService;
pub use crate::jsonl_history_repository::JsonlHistoryRepository;
pub use crate::paths::{MtermPaths, PathError};
pub use crate::store::DurableStore;
pub use crate::toml_lock_table::TomlLockTable;
pub use crate::toml_session_repository::TomlSessionRepository;
