//! Backup lineage and level resolution.
//!
//! Listing names flow through the identity codec into a [`LineageIndex`],
//! which the level engine consults to pick the next level and build the
//! [`ManifestMetadata`] stored with the new backup. No payload I/O happens here.

pub mod identity;
pub mod index;
pub mod level;
pub mod manifest;
pub mod restart;

pub use identity::{decode, encode, meta_object_name, BackupIdentity, BackupRecord};
pub use index::LineageIndex;
pub use level::{assign, resolve, LevelReason, LevelRequest, Policy, PolicyFlags, Resolution};
pub use manifest::{Auxiliary, ManifestMetadata};
pub use restart::should_restart;
