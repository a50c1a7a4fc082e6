//! Backup Lineage Library
//!
//! Leveled (full + incremental) backup scheduling over object-store listings:
//! decides the level of the next backup and the lineage metadata stored with it.

pub mod config;
pub mod lineage;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use utils::errors::LineageError;
pub type Result<T> = std::result::Result<T, LineageError>;
