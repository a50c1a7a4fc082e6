//! Level assignment.
//!
//! Decides the level of the next backup of an identity from its lineage and
//! the configured policy, and produces the metadata to store with it.
//! Everything here is a pure function of its inputs, including `now`.

use super::identity::{meta_object_name, BackupIdentity, BackupRecord};
use super::index::LineageIndex;
use super::manifest::{self, Auxiliary, ManifestMetadata};
use super::restart::should_restart;
use crate::utils::errors::{LineageError, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Raw policy options as configured. May be contradictory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyFlags {
    /// Every run is a full backup.
    #[serde(default)]
    pub no_incremental: bool,

    /// Incrementing levels up to this depth, then wrap to 0.
    #[serde(default)]
    pub max_level: Option<u32>,

    /// Every run after the first targets this level.
    #[serde(default)]
    pub always_level: Option<u32>,

    /// Seconds after which an always-level chain restarts. 0 disables.
    #[serde(default)]
    pub restart_interval: i64,
}

impl PolicyFlags {
    /// Validate the flags into a single policy.
    ///
    /// With no flags at all every run is a full backup.
    pub fn to_policy(&self) -> Result<Policy> {
        if self.no_incremental && (self.max_level.is_some() || self.always_level.is_some()) {
            return Err(LineageError::ConflictingPolicy(
                "no-incremental cannot be combined with backup level options".into(),
            ));
        }

        let policy = match (self.max_level, self.always_level) {
            (Some(_), Some(_)) => {
                return Err(LineageError::ConflictingPolicy(
                    "max-level and always-level are mutually exclusive".into(),
                ))
            }
            (Some(max_level), None) => Policy::MaxLevel { max_level },
            (None, Some(always_level)) => Policy::AlwaysLevel {
                always_level,
                restart_interval: self.restart_interval,
            },
            (None, None) => Policy::NoIncremental,
        };

        if self.restart_interval > 0 && self.always_level.is_none() {
            warn!(
                restart_interval = self.restart_interval,
                "Restart interval only applies to always-level backups, ignoring"
            );
        }

        Ok(policy)
    }
}

/// A validated leveling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Policy {
    NoIncremental,
    MaxLevel { max_level: u32 },
    AlwaysLevel { always_level: u32, restart_interval: i64 },
}

/// Why a level was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelReason {
    /// Policy forbids incrementals.
    NoIncremental,
    /// No full backup to build on: first backup, or an incomplete chain.
    Bootstrap,
    /// Next incremental on top of the active chain.
    Increment,
    /// The chain reached its configured depth.
    Wrap,
    /// The always-level chain is older than the restart interval.
    Restart,
}

/// Inputs of one resolution.
#[derive(Debug, Clone)]
pub struct LevelRequest<'a> {
    pub identity: &'a BackupIdentity,
    pub flags: &'a PolicyFlags,
    pub now: i64,
    /// Unfiltered; records of other identities are ignored.
    pub prior_records: &'a [BackupRecord],
    /// Metadata stored with the newest prior record, if it could be read.
    pub prior_metadata: Option<&'a ManifestMetadata>,
    pub encryption_enabled: bool,
}

/// Outcome of one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub level: u32,
    pub reason: LevelReason,
    /// The record the new backup will be stored as.
    pub record: BackupRecord,
    pub policy: Policy,
    pub metadata: ManifestMetadata,
}

/// Resolve the level of the next backup.
///
/// Policy conflicts are reported before the identity or the records are
/// looked at.
pub fn resolve(request: &LevelRequest<'_>) -> Result<Resolution> {
    let policy = request.flags.to_policy()?;
    let index = LineageIndex::new(request.identity, request.prior_records.iter().cloned())?;
    assign(
        &policy,
        &index,
        request.now,
        request.prior_metadata,
        request.encryption_enabled,
    )
}

/// Assign a level from an already built lineage index.
///
/// An incremental is only built on records whose metadata object is listed;
/// otherwise the chain is treated as missing and the run bootstraps at level 0.
pub fn assign(
    policy: &Policy,
    index: &LineageIndex,
    now: i64,
    prior_metadata: Option<&ManifestMetadata>,
    encryption_enabled: bool,
) -> Result<Resolution> {
    if now < 0 {
        return Err(LineageError::InvalidTimestamp(now));
    }

    if let Some(prior) = prior_metadata {
        check_prior_metadata(policy, index, prior);
    }

    let (mut level, mut chain_start, mut reason) = match *policy {
        Policy::NoIncremental => (0, None, LevelReason::NoIncremental),

        Policy::MaxLevel { max_level } => match (index.chain_start(), index.newest()) {
            (Some(_), Some(newest)) if newest.level < max_level => {
                (newest.level + 1, None, LevelReason::Increment)
            }
            (Some(_), Some(_)) => (0, None, LevelReason::Wrap),
            _ => (0, None, LevelReason::Bootstrap),
        },

        Policy::AlwaysLevel {
            always_level,
            restart_interval,
        } => match index.chain_start() {
            None => (0, Some(now), LevelReason::Bootstrap),
            Some(start) if should_restart(start.timestamp, now, restart_interval) => {
                info!(
                    chain_start = start.timestamp,
                    restart_interval,
                    "Chain exceeded restart interval, restarting at level 0"
                );
                (0, Some(now), LevelReason::Restart)
            }
            Some(_) if always_level == 0 => (0, Some(now), LevelReason::Wrap),
            Some(start) => (always_level, Some(start.timestamp), LevelReason::Increment),
        },
    };

    if let Some(missing) = missing_meta_object(index, level) {
        warn!(
            record = %missing,
            "Metadata object of the chain is missing, starting a new chain at level 0"
        );
        level = 0;
        reason = LevelReason::Bootstrap;
        chain_start = chain_start.map(|_| now);
    }

    let identity = index.identity();
    let record = identity.record(now, level);
    let auxiliary = Auxiliary {
        encryption_enabled,
        prior_meta_object_name: index.parent_of(level).map(meta_object_name),
        current_meta_object_name: Some(meta_object_name(&record)),
    };
    let metadata = manifest::build(identity, level, policy, chain_start, &auxiliary);

    info!(
        identity = %identity,
        level,
        reason = ?reason,
        "Backup level resolved"
    );

    Ok(Resolution {
        level,
        reason,
        record,
        policy: *policy,
        metadata,
    })
}

// The newest record or the parent of an incremental at `level` whose
// metadata object was not listed.
fn missing_meta_object(index: &LineageIndex, level: u32) -> Option<&BackupRecord> {
    if level == 0 {
        return None;
    }
    index
        .newest()
        .into_iter()
        .chain(index.parent_of(level))
        .find(|r| !index.has_meta_object(r))
}

// Prior metadata is advisory: the listing stays authoritative for levels.
fn check_prior_metadata(policy: &Policy, index: &LineageIndex, prior: &ManifestMetadata) {
    if !prior.describes(index.identity()) {
        warn!(
            identity = %index.identity(),
            recorded = ?prior.backup_name,
            "Prior metadata belongs to a different backup, ignoring"
        );
        return;
    }

    if let (Some(recorded), Some(newest)) = (prior.current_level, index.newest()) {
        if recorded != newest.level {
            warn!(
                recorded,
                listed = newest.level,
                "Prior metadata level disagrees with the newest listed backup"
            );
        }
    }

    if let Some(recorded) = prior.policy() {
        if recorded != *policy {
            warn!(?recorded, current = ?policy, "Backup policy changed since the last run");
        }
    }
}
