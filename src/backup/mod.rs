//! Backup archives of a docker volume.
//!
//! Archives are named `<prefix>-<YYYYMMDD_HHMMSS>.tar.gz`, so sorting them by
//! name sorts them by creation time as long as the prefix is the same.
//!
//! - [ArchiveWriter]: creates and verifies archives.
//! - [RestoreExecutor]: restores an archive over the live volume.

pub mod archive;
pub mod restore;

pub use archive::{verify_integrity, ArchiveWriter};
pub use restore::{RestoreExecutor, RestoreState};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;

/// File extension of every archive.
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

static BACKUP_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?<prefix>.+)-(?<timestamp>\d{8}_\d{6})\.tar\.gz$").expect("regex should be valid")
});

/// A backup archive on disk. Never modified once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    /// File name of the archive.
    pub name: String,
    /// Backing directory of the volume, only known for freshly created backups.
    pub source_volume_path: Option<PathBuf>,
    /// Full path of the archive.
    pub destination_path: PathBuf,
    pub size_bytes: u64,
    pub created_at: NaiveDateTime,
}

impl BackupRecord {
    /// The same archive after it was moved to `destination_path`.
    pub fn relocated(&self, destination_path: PathBuf) -> Self {
        Self {
            destination_path,
            ..self.clone()
        }
    }
}

/// `<prefix>-<YYYYMMDD_HHMMSS>.tar.gz`
pub fn backup_file_name(prefix: &str, timestamp: &NaiveDateTime) -> String {
    format!("{prefix}-{}{ARCHIVE_SUFFIX}", timestamp.format(TIMESTAMP_FORMAT))
}

/// Splits a file name following the naming convention into prefix and timestamp.
pub fn parse_backup_name(name: &str) -> Option<(&str, NaiveDateTime)> {
    let captures = BACKUP_NAME.captures(name)?;
    let prefix = captures.name("prefix")?.as_str();
    let timestamp =
        NaiveDateTime::parse_from_str(captures.name("timestamp")?.as_str(), TIMESTAMP_FORMAT)
            .ok()?;

    Some((prefix, timestamp))
}

/// Backups in `dir` with the given `prefix` (any prefix if [None]), most recent first.
///
/// A missing directory contains no backups.
pub fn list_backups(dir: &Path, prefix: Option<&str>) -> io::Result<Vec<BackupRecord>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!(target: "backup", "Backup directory {} doesn't exist", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut backups = Vec::new();
    for entry in entries {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let Some((entry_prefix, created_at)) = parse_backup_name(&name) else {
            continue;
        };
        if prefix.is_some_and(|p| p != entry_prefix) {
            continue;
        }

        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }

        backups.push(BackupRecord {
            name: name.clone(),
            source_volume_path: None,
            destination_path: entry.path(),
            size_bytes: metadata.len(),
            created_at,
        });
    }

    backups.sort_by(|a, b| b.name.cmp(&a.name));
    Ok(backups)
}
