//! Lineage index over the records of one backup identity.
//!
//! This is the single place that orders records. Records are kept ascending by
//! `(timestamp, level)`: the timestamp dominates and the level breaks ties
//! between records sharing a timestamp.

use super::identity::{
    decode, meta_object_name, BackupIdentity, BackupRecord, META_OBJECT_PREFIX,
};
use crate::utils::errors::Result;
use std::collections::HashSet;
use tracing::debug;

/// Ordering key for records within one identity.
pub fn order_key(record: &BackupRecord) -> (i64, u32) {
    (record.timestamp, record.level)
}

/// Records matching one identity, sorted by [`order_key`].
#[derive(Debug, Clone)]
pub struct LineageIndex {
    identity: BackupIdentity,
    records: Vec<BackupRecord>,
    /// Metadata objects seen in the listing. None when the index was built
    /// from records alone and companions are unknown.
    meta_objects: Option<HashSet<String>>,
}

impl LineageIndex {
    /// Keep the records that belong to `identity`.
    ///
    /// An empty result is valid (first-ever backup). An identity without a
    /// backup name is rejected instead of matching everything.
    pub fn new(
        identity: &BackupIdentity,
        records: impl IntoIterator<Item = BackupRecord>,
    ) -> Result<Self> {
        identity.validate()?;

        let mut records: Vec<BackupRecord> =
            records.into_iter().filter(|r| identity.owns(r)).collect();
        records.sort_by_key(order_key);
        records.dedup();

        Ok(Self {
            identity: identity.clone(),
            records,
            meta_objects: None,
        })
    }

    /// Build the index straight from an object listing.
    ///
    /// Metadata objects of this identity are remembered for
    /// [`Self::has_meta_object`]. Other names that do not decode (segments,
    /// unrelated objects in the same container) are skipped.
    pub fn from_listing<I, S>(identity: &BackupIdentity, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut skipped = 0usize;
        let mut meta_objects = HashSet::new();
        let mut records = Vec::new();

        for name in names {
            let name = name.as_ref();
            if let Some(described) = name.strip_prefix(META_OBJECT_PREFIX) {
                if decode(described).is_ok_and(|r| identity.owns(&r)) {
                    meta_objects.insert(name.to_string());
                    continue;
                }
            }
            match decode(name) {
                Ok(record) => records.push(record),
                Err(e) => {
                    debug!("Skipping listing entry: {}", e);
                    skipped += 1;
                }
            }
        }

        let mut index = Self::new(identity, records)?;
        debug!(
            identity = %index.identity,
            matched = index.records.len(),
            meta_objects = meta_objects.len(),
            skipped,
            "Lineage index built from listing"
        );
        index.meta_objects = Some(meta_objects);
        Ok(index)
    }

    pub fn identity(&self) -> &BackupIdentity {
        &self.identity
    }

    /// Matched records, oldest first.
    pub fn records(&self) -> &[BackupRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether the metadata object of `record` was listed.
    ///
    /// Always true for an index built from records alone.
    pub fn has_meta_object(&self, record: &BackupRecord) -> bool {
        self.meta_objects
            .as_ref()
            .map_or(true, |listed| listed.contains(&meta_object_name(record)))
    }

    pub fn newest(&self) -> Option<&BackupRecord> {
        self.records.last()
    }

    /// Oldest record regardless of chain membership. Used for retention.
    pub fn absolute_oldest(&self) -> Option<&BackupRecord> {
        self.records.first()
    }

    /// The level-0 record that began the chain the newest record belongs to.
    ///
    /// None when the identity is empty or the newest record has no full
    /// backup underneath it.
    pub fn chain_start(&self) -> Option<&BackupRecord> {
        let tip = self.records.len().checked_sub(1)?;
        self.walk_back(tip).and_then(|chain| chain.first().copied())
    }

    /// The record a new backup at `level` depends on: the most recent record
    /// with a strictly lower level. None for a full backup.
    pub fn parent_of(&self, level: u32) -> Option<&BackupRecord> {
        self.records.iter().rev().find(|r| r.level < level)
    }

    /// Partition the records into chains, oldest first.
    ///
    /// A chain starts at each full backup and runs until the next one.
    /// Records older than the first full backup form a leading chain
    /// without a base.
    pub fn chains(&self) -> Vec<&[BackupRecord]> {
        let mut chains = Vec::new();
        let mut start = 0;
        for (i, record) in self.records.iter().enumerate() {
            if record.is_full() && i > start {
                chains.push(&self.records[start..i]);
                start = i;
            }
        }
        if start < self.records.len() {
            chains.push(&self.records[start..]);
        }
        chains
    }

    /// Records to apply, full backup first, to restore the state as of `at`
    /// (or the newest state when `at` is None).
    ///
    /// Empty when nothing was taken by `at` or the chain has no full backup.
    pub fn restore_chain(&self, at: Option<i64>) -> Vec<&BackupRecord> {
        let tip = self
            .records
            .iter()
            .rposition(|r| at.map_or(true, |at| r.timestamp <= at));

        tip.and_then(|tip| self.walk_back(tip)).unwrap_or_default()
    }

    /// Records of complete chains that ended strictly before `cutoff`.
    ///
    /// The chain holding the newest record is never included.
    pub fn prunable_before(&self, cutoff: i64) -> Vec<&BackupRecord> {
        let mut chains = self.chains();
        chains.pop();

        chains
            .into_iter()
            .filter(|chain| {
                let complete = chain.first().is_some_and(BackupRecord::is_full);
                let ended = chain.last().is_some_and(|r| r.timestamp < cutoff);
                complete && ended
            })
            .flatten()
            .collect()
    }

    /// Walk backward from `tip` through strictly decreasing levels until a
    /// full backup is reached. Visits at most `level + 1` records.
    fn walk_back(&self, tip: usize) -> Option<Vec<&BackupRecord>> {
        let newest = self.records.get(tip)?;
        let mut level = newest.level;
        let mut chain = vec![newest];

        for record in self.records[..tip].iter().rev() {
            if level == 0 {
                break;
            }
            if record.level < level {
                level = record.level;
                chain.push(record);
            }
        }

        if level != 0 {
            return None;
        }
        chain.reverse();
        Some(chain)
    }
}
