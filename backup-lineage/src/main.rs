//! Backup Lineage - Main entry point
//!
//! Resolves backup levels and restore chains from an object listing.

use anyhow::{Context, Result};
use backup_lineage::lineage::{self, LineageIndex, ManifestMetadata};
use backup_lineage::{utils, Config};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Client hostname (overrides config)
    #[arg(long)]
    hostname: Option<String>,

    /// Backup set name (overrides config)
    #[arg(long)]
    backup_name: Option<String>,

    /// Take a full backup on every run
    #[arg(long)]
    no_incremental: bool,

    /// Incrementing levels up to this depth
    #[arg(long)]
    max_level: Option<u32>,

    /// Target this level on every run after the first
    #[arg(long)]
    always_level: Option<u32>,

    /// Seconds after which an always-level chain restarts (0 disables)
    #[arg(long)]
    restart_interval: Option<i64>,

    /// Mark the backup as encrypted
    #[arg(long)]
    encrypt: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decide the level of the next backup
    Resolve {
        /// Object listing, one name per line ("-" for stdin)
        #[arg(long, value_name = "FILE")]
        listing: PathBuf,

        /// JSON object with the headers of the newest backup's metadata
        #[arg(long, value_name = "FILE")]
        prior_meta: Option<PathBuf>,

        /// Unix timestamp of the run (defaults to now)
        #[arg(long)]
        now: Option<i64>,
    },

    /// List the objects to restore, full backup first
    Chain {
        #[arg(long, value_name = "FILE")]
        listing: PathBuf,

        /// Restore the state as of this Unix timestamp
        #[arg(long)]
        at: Option<i64>,
    },

    /// Summarize the lineage of the backup set
    Info {
        #[arg(long, value_name = "FILE")]
        listing: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    apply_overrides(&mut config, &args);

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level, &config.log.output)?;

    tracing::debug!("Starting backup-lineage v{}", env!("CARGO_PKG_VERSION"));

    let identity = config.identity()?;

    match args.command {
        Command::Resolve {
            listing,
            prior_meta,
            now,
        } => {
            // Refuse contradictory policies before touching any input
            let policy = config.policy.to_policy()?;

            let index = LineageIndex::from_listing(&identity, read_listing(&listing)?)?;
            let prior_metadata = prior_meta.as_deref().map(read_prior_metadata).transpose()?;
            let now = now.unwrap_or_else(|| chrono::Utc::now().timestamp());

            let resolution = lineage::assign(
                &policy,
                &index,
                now,
                prior_metadata.as_ref(),
                config.storage.encrypt,
            )?;

            let output = json!({
                "level": resolution.level,
                "reason": resolution.reason,
                "policy": resolution.policy,
                "object_name": resolution.record.object_name(),
                "meta_object_name": resolution.record.meta_object_name(),
                "chain_start": resolution.metadata.chain_start,
                "headers": resolution.metadata.to_headers(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Chain { listing, at } => {
            let index = LineageIndex::from_listing(&identity, read_listing(&listing)?)?;
            let chain = index.restore_chain(at);
            if chain.is_empty() {
                anyhow::bail!("No restorable backup of {} found", identity);
            }
            for record in chain {
                println!("{}", record.object_name());
            }
        }

        Command::Info { listing } => {
            let index = LineageIndex::from_listing(&identity, read_listing(&listing)?)?;
            let describe = |record: Option<&lineage::BackupRecord>| {
                record.map(|r| {
                    json!({
                        "object_name": r.object_name(),
                        "level": r.level,
                        "taken_at": format_timestamp(r.timestamp),
                    })
                })
            };
            let chains: Vec<Vec<String>> = index
                .chains()
                .iter()
                .map(|chain| chain.iter().map(|r| r.object_name()).collect())
                .collect();

            let output = json!({
                "identity": identity.to_string(),
                "records": index.len(),
                "newest": describe(index.newest()),
                "chain_start": describe(index.chain_start()),
                "absolute_oldest": describe(index.absolute_oldest()),
                "chains": chains,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(hostname) = &args.hostname {
        config.identity.hostname = hostname.clone();
    }
    if let Some(backup_name) = &args.backup_name {
        config.identity.backup_name = backup_name.clone();
    }
    if args.no_incremental {
        config.policy.no_incremental = true;
    }
    if args.max_level.is_some() {
        config.policy.max_level = args.max_level;
    }
    if args.always_level.is_some() {
        config.policy.always_level = args.always_level;
    }
    if let Some(restart_interval) = args.restart_interval {
        config.policy.restart_interval = restart_interval;
    }
    if args.encrypt {
        config.storage.encrypt = true;
    }
}

fn read_listing(path: &Path) -> Result<Vec<String>> {
    let mut content = String::new();
    if path == Path::new("-") {
        std::io::stdin().read_to_string(&mut content)?;
    } else {
        content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read listing {}", path.display()))?;
    }

    Ok(parse_listing(&content))
}

/// One object name per line; surrounding whitespace and blank lines dropped.
fn parse_listing(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_prior_metadata(path: &Path) -> Result<ManifestMetadata> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read prior metadata {}", path.display()))?;
    let headers: BTreeMap<String, String> = serde_json::from_str(&content)?;
    Ok(ManifestMetadata::from_headers(&headers)?)
}

fn format_timestamp(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_listing_drops_blanks_and_whitespace() {
        let names = parse_listing("h_b_100_0\r\n\n  tar_metadata_h_b_100_0  \n\t\nh_b_150_1");
        assert_eq!(names, vec!["h_b_100_0", "tar_metadata_h_b_100_0", "h_b_150_1"]);
    }

    #[test]
    fn test_read_listing_from_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"h_b_100_0\ntar_metadata_h_b_100_0\n\nh_b_150_1\n")?;
        file.flush()?;

        let names = read_listing(file.path())?;
        assert_eq!(names.len(), 3);

        let identity = backup_lineage::lineage::BackupIdentity::new("h", "b")?;
        let index = LineageIndex::from_listing(&identity, names)?;
        assert_eq!(index.len(), 2);
        assert!(index.has_meta_object(&identity.record(100, 0)));
        assert!(!index.has_meta_object(&identity.record(150, 1)));
        Ok(())
    }

    #[test]
    fn test_read_listing_missing_file() {
        assert!(read_listing(Path::new("/nonexistent/listing.txt")).is_err());
    }

    #[test]
    fn test_read_prior_metadata_from_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(
            br#"{"x-object-meta-backup-name": "b", "x-object-meta-backup-current-level": "1"}"#,
        )?;
        file.flush()?;

        let meta = read_prior_metadata(file.path())?;
        assert_eq!(meta.backup_name.as_deref(), Some("b"));
        assert_eq!(meta.current_level, Some(1));
        Ok(())
    }
}
