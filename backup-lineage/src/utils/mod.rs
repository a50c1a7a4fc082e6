//! Utility modules for the lineage agent.

pub mod errors;
pub mod logger;

pub use errors::{LineageError, Result};
