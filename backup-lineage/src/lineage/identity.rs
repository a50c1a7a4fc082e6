//! Backup identity codec.
//!
//! Every stored backup is an object named
//! `<hostname>_<backup_name>_<timestamp>_<level>`. The separator is not allowed
//! inside the hostname or the backup name, so a name splits into exactly four
//! fields. Its companion metadata object carries the `tar_metadata_` prefix.

use crate::utils::errors::{LineageError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Field separator inside encoded object names.
pub const SEPARATOR: char = '_';

/// Prefix of the metadata object stored next to each backup.
pub const META_OBJECT_PREFIX: &str = "tar_metadata_";

/// The `(hostname, backup_name)` pair every lineage query is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackupIdentity {
    pub hostname: String,
    pub backup_name: String,
}

impl BackupIdentity {
    /// Build an identity, rejecting empty fields and embedded separators.
    pub fn new(hostname: impl Into<String>, backup_name: impl Into<String>) -> Result<Self> {
        let identity = Self {
            hostname: hostname.into(),
            backup_name: backup_name.into(),
        };
        identity.validate()?;
        Ok(identity)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backup_name.is_empty() {
            return Err(LineageError::InvalidIdentity("backup name is not set".into()));
        }
        if self.hostname.is_empty() {
            return Err(LineageError::InvalidIdentity("hostname is not set".into()));
        }
        for (field, value) in [("hostname", &self.hostname), ("backup name", &self.backup_name)] {
            if value.contains(SEPARATOR) {
                return Err(LineageError::InvalidIdentity(format!(
                    "{field} {value:?} contains the reserved separator {SEPARATOR:?}"
                )));
            }
        }
        Ok(())
    }

    /// Whether `record` belongs to this lineage.
    pub fn owns(&self, record: &BackupRecord) -> bool {
        record.hostname == self.hostname && record.backup_name == self.backup_name
    }

    /// The record a backup taken at `timestamp` with `level` will be stored as.
    pub fn record(&self, timestamp: i64, level: u32) -> BackupRecord {
        BackupRecord {
            hostname: self.hostname.clone(),
            backup_name: self.backup_name.clone(),
            timestamp,
            level,
        }
    }
}

impl fmt::Display for BackupIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.hostname, self.backup_name)
    }
}

/// One archived unit, as observed in an object listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackupRecord {
    pub hostname: String,
    pub backup_name: String,
    /// Unix seconds.
    pub timestamp: i64,
    /// 0 for a full backup, `n > 0` for an incremental layer.
    pub level: u32,
}

impl BackupRecord {
    pub fn identity(&self) -> BackupIdentity {
        BackupIdentity {
            hostname: self.hostname.clone(),
            backup_name: self.backup_name.clone(),
        }
    }

    pub fn object_name(&self) -> String {
        encode(self)
    }

    pub fn meta_object_name(&self) -> String {
        meta_object_name(self)
    }

    pub fn is_full(&self) -> bool {
        self.level == 0
    }
}

impl fmt::Display for BackupRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.hostname, self.backup_name, self.timestamp, self.level
        )
    }
}

impl FromStr for BackupRecord {
    type Err = LineageError;

    fn from_str(s: &str) -> Result<Self> {
        decode(s)
    }
}

/// Encode a record into its storage object name.
pub fn encode(record: &BackupRecord) -> String {
    record.to_string()
}

/// Decode a storage object name into a record.
pub fn decode(name: &str) -> Result<BackupRecord> {
    let fields: Vec<&str> = name.split(SEPARATOR).collect();
    let [hostname, backup_name, timestamp, level] = fields.as_slice() else {
        return Err(LineageError::MalformedIdentity(format!(
            "{name:?} has {} fields, expected 4",
            fields.len()
        )));
    };

    if hostname.is_empty() || backup_name.is_empty() {
        return Err(LineageError::MalformedIdentity(format!(
            "{name:?} has an empty hostname or backup name"
        )));
    }

    Ok(BackupRecord {
        hostname: hostname.to_string(),
        backup_name: backup_name.to_string(),
        timestamp: parse_unsigned(name, "timestamp", timestamp)?,
        level: parse_unsigned(name, "level", level)?,
    })
}

/// Name of the metadata object stored alongside `record`.
pub fn meta_object_name(record: &BackupRecord) -> String {
    format!("{META_OBJECT_PREFIX}{}", encode(record))
}

// Digits only: `str::parse` would also accept a leading sign.
fn parse_unsigned<T: FromStr>(name: &str, field: &str, raw: &str) -> Result<T> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LineageError::MalformedIdentity(format!(
            "{name:?}: {field} {raw:?} is not a non-negative integer"
        )));
    }
    raw.parse().map_err(|_| {
        LineageError::MalformedIdentity(format!("{name:?}: {field} {raw:?} is out of range"))
    })
}
