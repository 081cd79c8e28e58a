//! Creation of compressed archives of a volume using [ArchiveWriter].

use std::fs::{self, File};
use std::io;
use std::path::Path;

use chrono::{Local, NaiveDateTime};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::{backup_file_name, BackupRecord};
use crate::process::CommandRunner;
use crate::util::Owner;
use crate::Error;

/// Writes `<prefix>-<timestamp>.tar.gz` archives of a volume's backing directory.
pub struct ArchiveWriter<'a> {
    prefix: String,
    runner: &'a dyn CommandRunner,
    /// User the archive is handed over to, the archive keeps our identity if [None].
    owner: Option<Owner>,
}

impl<'a> ArchiveWriter<'a> {
    pub fn new(prefix: impl Into<String>, runner: &'a dyn CommandRunner) -> Self {
        Self {
            prefix: prefix.into(),
            runner,
            owner: None,
        }
    }

    /// Hand created archives over to `owner`.
    pub fn with_owner(mut self, owner: Option<Owner>) -> Self {
        self.owner = owner;
        self
    }

    /// Archives everything below `source_volume_path` into `destination_dir`.
    pub fn create_backup(
        &self,
        source_volume_path: &Path,
        destination_dir: &Path,
    ) -> crate::Result<BackupRecord> {
        let now = Local::now().naive_local();
        self.create_backup_at(source_volume_path, destination_dir, now)
    }

    /// Like [create_backup](Self::create_backup) with an explicit timestamp for the name.
    pub fn create_backup_at(
        &self,
        source_volume_path: &Path,
        destination_dir: &Path,
        timestamp: NaiveDateTime,
    ) -> crate::Result<BackupRecord> {
        if !source_volume_path.is_dir() {
            return Err(Error::precondition(format!(
                "volume directory {} is not accessible",
                source_volume_path.display()
            )));
        }

        fs::create_dir_all(destination_dir)?;
        let name = backup_file_name(&self.prefix, &timestamp);
        let archive_path = destination_dir.join(&name);
        log::info!(
            target: "archive",
            "Create backup of {} at {}",
            source_volume_path.display(),
            archive_path.display()
        );

        // never touch an archive that already exists
        let archive_file = File::create_new(&archive_path)?;
        if let Err(e) = write_archive(archive_file, source_volume_path) {
            log::error!(target: "archive", "Writing {} failed: {e}", archive_path.display());
            remove_partial(&archive_path);
            return Err(e.into());
        }

        let size_bytes = verify_archive(&archive_path)?;

        if let Some(owner) = self.owner {
            log::debug!(target: "archive", "Handing {} over to {owner}", archive_path.display());
            if let Err(e) = owner.apply(self.runner, &archive_path, false) {
                remove_partial(&archive_path);
                return Err(e);
            }
        }

        log::info!(target: "archive", "Finished backup {name} ({size_bytes} bytes)");

        Ok(BackupRecord {
            name,
            source_volume_path: Some(source_volume_path.to_path_buf()),
            destination_path: archive_path,
            size_bytes,
            created_at: timestamp,
        })
    }
}

fn write_archive(archive_file: File, source: &Path) -> io::Result<()> {
    let encoder = GzEncoder::new(archive_file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(".", source)?;

    let encoder = builder.into_inner()?;
    let archive_file = encoder.finish()?;
    archive_file.sync_all()
}

/// Checks that the archive exists and isn't empty, returning its size.
///
/// A missing or empty archive is removed and reported as
/// [Error::BackupVerificationFailed].
pub fn verify_archive(archive_path: &Path) -> crate::Result<u64> {
    let failed = |reason: String| {
        remove_partial(archive_path);
        Error::BackupVerificationFailed {
            path: archive_path.to_path_buf(),
            reason,
        }
    };

    let metadata = fs::metadata(archive_path).map_err(|e| failed(format!("archive missing: {e}")))?;
    if !metadata.is_file() {
        return Err(failed("archive is not a regular file".into()));
    }
    if metadata.len() == 0 {
        return Err(failed("archive is empty".into()));
    }

    log::debug!(target: "archive", "Verified {} ({} bytes)", archive_path.display(), metadata.len());
    Ok(metadata.len())
}

/// Reads every entry of the archive to make sure it can be extracted.
pub fn verify_integrity(archive_path: &Path) -> crate::Result<()> {
    let failed = |e: io::Error| Error::BackupVerificationFailed {
        path: archive_path.to_path_buf(),
        reason: format!("archive is unreadable: {e}"),
    };

    let file = File::open(archive_path).map_err(failed)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut entries = 0usize;
    for entry in archive.entries().map_err(failed)? {
        let mut entry = entry.map_err(failed)?;
        io::copy(&mut entry, &mut io::sink()).map_err(failed)?;
        entries += 1;
    }
    log::debug!(target: "archive", "{} contains {entries} entries", archive_path.display());

    Ok(())
}

fn remove_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::debug!(target: "archive", "Removed partial archive {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!(target: "archive", "Removing {} failed: {e}", path.display()),
    }
}
