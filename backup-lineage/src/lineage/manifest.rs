//! Manifest metadata persisted alongside every backup.
//!
//! [`ManifestMetadata`] is the typed form used inside the engine. The transport
//! stores it as a flat string map (object headers, sidecar file, ...), produced
//! by [`ManifestMetadata::to_headers`] and read back with
//! [`ManifestMetadata::from_headers`].

use super::identity::BackupIdentity;
use super::level::Policy;
use crate::utils::errors::{LineageError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Version written under [`keys::VERSION`].
pub const LINEAGE_VERSION: &str = "1";

/// Header names of the wire format.
pub mod keys {
    pub const VERSION: &str = "x-object-meta-lineage-version";
    pub const BACKUP_NAME: &str = "x-object-meta-backup-name";
    pub const HOSTNAME: &str = "x-object-meta-hostname";
    pub const CURRENT_LEVEL: &str = "x-object-meta-backup-current-level";
    pub const MAX_LEVEL: &str = "x-object-meta-maximum-backup-level";
    pub const ALWAYS_LEVEL: &str = "x-object-meta-always-backup-level";
    pub const RESTART_INTERVAL: &str = "x-object-meta-restart-always-backup";
    pub const CHAIN_START: &str = "x-object-meta-backup-chain-start";
    pub const ENCRYPT_DATA: &str = "x-object-meta-encrypt-data";
    pub const META_OBJECT: &str = "x-object-meta-tar-meta-obj-name";
    pub const PREV_META_OBJECT: &str = "x-object-meta-tar-prev-meta-obj-name";
}

const ENCRYPTED_MARKER: &str = "Yes";

/// Lineage metadata of one backup record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_level: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_level: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub always_level: Option<u32>,

    /// Restart interval in seconds, always-level policy only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_interval: Option<i64>,

    /// Chain start used for the next restart check, always-level policy only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_start: Option<i64>,

    #[serde(default)]
    pub encrypted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_object_name: Option<String>,

    /// Metadata object of the record this one depends on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_meta_object_name: Option<String>,
}

/// Fields that do not take part in level assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Auxiliary {
    pub encryption_enabled: bool,
    pub prior_meta_object_name: Option<String>,
    pub current_meta_object_name: Option<String>,
}

/// Build the metadata for a record about to be created.
///
/// The prior metadata object is only recorded for incremental levels, where
/// a previous record in the same chain exists.
pub fn build(
    identity: &BackupIdentity,
    level: u32,
    policy: &Policy,
    chain_start: Option<i64>,
    auxiliary: &Auxiliary,
) -> ManifestMetadata {
    let mut meta = ManifestMetadata {
        backup_name: Some(identity.backup_name.clone()),
        hostname: Some(identity.hostname.clone()),
        current_level: Some(level),
        encrypted: auxiliary.encryption_enabled,
        meta_object_name: auxiliary.current_meta_object_name.clone(),
        ..Default::default()
    };

    match *policy {
        Policy::NoIncremental => return meta,
        Policy::MaxLevel { max_level } => {
            meta.max_level = Some(max_level);
        }
        Policy::AlwaysLevel {
            always_level,
            restart_interval,
        } => {
            meta.always_level = Some(always_level);
            meta.restart_interval = Some(restart_interval);
            meta.chain_start = chain_start;
        }
    }

    if level > 0 {
        meta.prev_meta_object_name = auxiliary.prior_meta_object_name.clone();
    }
    meta
}

impl ManifestMetadata {
    /// Whether this metadata describes a backup of `identity`.
    ///
    /// Metadata written without a hostname only has to agree on the name.
    pub fn describes(&self, identity: &BackupIdentity) -> bool {
        self.backup_name.as_deref() == Some(identity.backup_name.as_str())
            && self
                .hostname
                .as_deref()
                .map_or(true, |h| h == identity.hostname)
    }

    /// The policy this metadata was written under, if it records one.
    pub fn policy(&self) -> Option<Policy> {
        if let Some(always_level) = self.always_level {
            return Some(Policy::AlwaysLevel {
                always_level,
                restart_interval: self.restart_interval.unwrap_or(0),
            });
        }
        if let Some(max_level) = self.max_level {
            return Some(Policy::MaxLevel { max_level });
        }
        self.current_level.map(|_| Policy::NoIncremental)
    }

    /// Flatten into the header wire format. Unset fields are omitted.
    pub fn to_headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        let mut put = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                headers.insert(key.to_string(), value);
            }
        };

        put(keys::VERSION, Some(LINEAGE_VERSION.to_string()));
        put(keys::BACKUP_NAME, self.backup_name.clone());
        put(keys::HOSTNAME, self.hostname.clone());
        put(keys::CURRENT_LEVEL, self.current_level.map(|v| v.to_string()));
        put(keys::MAX_LEVEL, self.max_level.map(|v| v.to_string()));
        put(keys::ALWAYS_LEVEL, self.always_level.map(|v| v.to_string()));
        put(keys::RESTART_INTERVAL, self.restart_interval.map(|v| v.to_string()));
        put(keys::CHAIN_START, self.chain_start.map(|v| v.to_string()));
        put(keys::ENCRYPT_DATA, self.encrypted.then(|| ENCRYPTED_MARKER.to_string()));
        put(keys::META_OBJECT, self.meta_object_name.clone());
        put(keys::PREV_META_OBJECT, self.prev_meta_object_name.clone());

        headers
    }

    /// Read back metadata written by [`Self::to_headers`].
    ///
    /// Unknown keys and empty values are ignored.
    pub fn from_headers(headers: &BTreeMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            headers
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        if let Some(version) = get(keys::VERSION) {
            if version != LINEAGE_VERSION {
                return Err(LineageError::MalformedHeader {
                    key: keys::VERSION.to_string(),
                    value: version.to_string(),
                });
            }
        }

        Ok(Self {
            backup_name: get(keys::BACKUP_NAME).map(str::to_string),
            hostname: get(keys::HOSTNAME).map(str::to_string),
            current_level: parse_field(keys::CURRENT_LEVEL, get(keys::CURRENT_LEVEL))?,
            max_level: parse_field(keys::MAX_LEVEL, get(keys::MAX_LEVEL))?,
            always_level: parse_field(keys::ALWAYS_LEVEL, get(keys::ALWAYS_LEVEL))?,
            restart_interval: parse_field(keys::RESTART_INTERVAL, get(keys::RESTART_INTERVAL))?,
            chain_start: parse_field(keys::CHAIN_START, get(keys::CHAIN_START))?,
            encrypted: get(keys::ENCRYPT_DATA).is_some_and(|v| v.eq_ignore_ascii_case(ENCRYPTED_MARKER)),
            meta_object_name: get(keys::META_OBJECT).map(str::to_string),
            prev_meta_object_name: get(keys::PREV_META_OBJECT).map(str::to_string),
        })
    }
}

fn parse_field<T: FromStr>(key: &str, value: Option<&str>) -> Result<Option<T>> {
    value
        .map(|v| {
            v.parse().map_err(|_| LineageError::MalformedHeader {
                key: key.to_string(),
                value: v.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> BackupIdentity {
        BackupIdentity::new("web01", "etc").unwrap()
    }

    fn auxiliary() -> Auxiliary {
        Auxiliary {
            encryption_enabled: true,
            prior_meta_object_name: Some("tar_metadata_web01_etc_100_0".into()),
            current_meta_object_name: Some("tar_metadata_web01_etc_200_1".into()),
        }
    }

    #[test]
    fn test_build_no_incremental_has_no_lineage_fields() {
        let meta = build(&identity(), 0, &Policy::NoIncremental, Some(100), &auxiliary());
        assert_eq!(meta.backup_name.as_deref(), Some("etc"));
        assert_eq!(meta.current_level, Some(0));
        assert!(meta.max_level.is_none());
        assert!(meta.always_level.is_none());
        assert!(meta.restart_interval.is_none());
        assert!(meta.chain_start.is_none());
        assert!(meta.prev_meta_object_name.is_none());
        assert!(meta.encrypted);
    }

    #[test]
    fn test_build_max_level_links_prior_meta_object() {
        let meta = build(&identity(), 1, &Policy::MaxLevel { max_level: 3 }, None, &auxiliary());
        assert_eq!(meta.max_level, Some(3));
        assert!(meta.always_level.is_none());
        assert!(meta.chain_start.is_none());
        assert_eq!(meta.prev_meta_object_name.as_deref(), Some("tar_metadata_web01_etc_100_0"));
        assert_eq!(meta.meta_object_name.as_deref(), Some("tar_metadata_web01_etc_200_1"));
    }

    #[test]
    fn test_build_level_zero_drops_prior_meta_object() {
        let meta = build(&identity(), 0, &Policy::MaxLevel { max_level: 3 }, None, &auxiliary());
        assert!(meta.prev_meta_object_name.is_none());
    }

    #[test]
    fn test_build_always_level_records_chain_start() {
        let policy = Policy::AlwaysLevel {
            always_level: 2,
            restart_interval: 86_400,
        };
        let meta = build(&identity(), 2, &policy, Some(1_000), &Auxiliary::default());
        assert_eq!(meta.always_level, Some(2));
        assert_eq!(meta.restart_interval, Some(86_400));
        assert_eq!(meta.chain_start, Some(1_000));
        assert!(!meta.encrypted);
        assert_eq!(meta.policy(), Some(policy));
    }

    #[test]
    fn test_headers_layout() {
        let meta = build(&identity(), 1, &Policy::MaxLevel { max_level: 3 }, None, &auxiliary());
        let headers = meta.to_headers();

        assert_eq!(headers[keys::VERSION], "1");
        assert_eq!(headers[keys::BACKUP_NAME], "etc");
        assert_eq!(headers[keys::HOSTNAME], "web01");
        assert_eq!(headers[keys::CURRENT_LEVEL], "1");
        assert_eq!(headers[keys::MAX_LEVEL], "3");
        assert_eq!(headers[keys::ENCRYPT_DATA], "Yes");
        assert!(!headers.contains_key(keys::ALWAYS_LEVEL));
        assert!(!headers.contains_key(keys::CHAIN_START));

        assert_eq!(ManifestMetadata::from_headers(&headers).unwrap(), meta);
    }

    #[test]
    fn test_from_headers_ignores_unknown_and_empty_values() {
        let headers: BTreeMap<String, String> = [
            (keys::BACKUP_NAME, "etc"),
            (keys::CURRENT_LEVEL, "2"),
            (keys::MAX_LEVEL, ""),
            ("x-object-meta-src-file-to-backup", "/etc"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let meta = ManifestMetadata::from_headers(&headers).unwrap();
        assert_eq!(meta.current_level, Some(2));
        assert!(meta.max_level.is_none());
        assert!(meta.describes(&identity()));
        assert_eq!(meta.policy(), Some(Policy::NoIncremental));
    }

    #[test]
    fn test_from_headers_rejects_bad_numbers() {
        let mut headers = BTreeMap::new();
        headers.insert(keys::CURRENT_LEVEL.to_string(), "one".to_string());
        assert!(matches!(
            ManifestMetadata::from_headers(&headers),
            Err(LineageError::MalformedHeader { .. })
        ));
    }

    #[test]
    fn test_from_headers_rejects_unknown_version() {
        let mut headers = BTreeMap::new();
        headers.insert(keys::VERSION.to_string(), "2".to_string());
        assert!(ManifestMetadata::from_headers(&headers).is_err());
    }

    #[test]
    fn test_describes_checks_hostname_when_present() {
        let mut meta = ManifestMetadata {
            backup_name: Some("etc".into()),
            ..Default::default()
        };
        assert!(meta.describes(&identity()));

        meta.hostname = Some("web02".into());
        assert!(!meta.describes(&identity()));

        meta.hostname = Some("web01".into());
        meta.backup_name = Some("var".into());
        assert!(!meta.describes(&identity()));
    }
}
