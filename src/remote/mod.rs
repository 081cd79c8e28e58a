//! Storing backups on an SMB/CIFS share.
//!
//! The share is mounted only for the duration of a [MountGuard]. Dropping the
//! guard, on success or on any error path, unmounts the share and removes the
//! mount point.

mod address;
mod credentials;

pub use address::ShareAddress;
pub use credentials::Credentials;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::backup::BackupRecord;
use crate::process::CommandRunner;
use crate::util::Owner;
use crate::Error;

/// Default directory on the share backups are stored in.
pub const DEFAULT_BACKUP_SUBDIR: &str = "backups";

/// A share that can be mounted to store backups on.
pub struct RemoteShare<'a> {
    runner: &'a dyn CommandRunner,
    address: ShareAddress,
    credentials_file: PathBuf,
    mount_point: PathBuf,
    backup_subdir: String,
    /// Owner of the files on the mounted share.
    owner: Option<Owner>,
}

impl<'a> RemoteShare<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        address: ShareAddress,
        credentials_file: impl Into<PathBuf>,
        mount_point: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            address,
            credentials_file: credentials_file.into(),
            mount_point: mount_point.into(),
            backup_subdir: DEFAULT_BACKUP_SUBDIR.to_string(),
            owner: None,
        }
    }

    pub fn with_backup_subdir(mut self, subdir: impl Into<String>) -> Self {
        self.backup_subdir = subdir.into();
        self
    }

    pub fn with_owner(mut self, owner: Option<Owner>) -> Self {
        self.owner = owner;
        self
    }

    pub fn address(&self) -> &ShareAddress {
        &self.address
    }

    fn access_failed(&self, reason: impl Into<String>) -> Error {
        Error::RemoteAccessFailed {
            share: self.address.to_string(),
            reason: reason.into(),
        }
    }

    /// Mounts the share read-write and verifies it with a test write.
    pub fn mount(&self) -> crate::Result<MountGuard<'a>> {
        if !self.credentials_file.is_file() {
            return Err(self.access_failed(format!(
                "credentials file {} doesn't exist",
                self.credentials_file.display()
            )));
        }

        fs::create_dir_all(&self.mount_point).map_err(|e| {
            self.access_failed(format!(
                "creating mount point {} failed: {e}",
                self.mount_point.display()
            ))
        })?;

        // from here on every return releases the mount point
        let mut guard = MountGuard {
            runner: self.runner,
            share: self.address.to_string(),
            mount_point: self.mount_point.clone(),
            backup_subdir: self.backup_subdir.clone(),
            mounted: false,
            released: false,
        };

        let mut options = format!("credentials={},rw", self.credentials_file.display());
        if let Some(owner) = self.owner {
            options.push_str(&format!(",uid={},gid={}", owner.uid, owner.gid));
        }

        log::info!(target: "remote", "Mounting {} at {}", self.address, self.mount_point.display());
        let mount_point = self.mount_point.to_string_lossy();
        let output = self
            .runner
            .run("mount.cifs", &[self.address.as_str(), &*mount_point, "-o", &options])
            .map_err(|e| self.access_failed(format!("mount failed: {e}")))?;
        if !output.success() {
            return Err(self.access_failed(format!("mount failed: {}", output.stderr.trim())));
        }
        guard.mounted = true;

        guard.verify_writable()?;
        log::debug!(target: "remote", "Share {} is writable", self.address);

        Ok(guard)
    }

    /// Pre-flight check: mount, test write and unmount the share.
    pub fn test_access(&self) -> crate::Result<()> {
        self.mount()?.release()
    }
}

/// A mounted share. Unmounted when released or dropped.
#[must_use = "the share is unmounted as soon as the guard is dropped"]
pub struct MountGuard<'a> {
    runner: &'a dyn CommandRunner,
    share: String,
    mount_point: PathBuf,
    backup_subdir: String,
    mounted: bool,
    released: bool,
}

impl MountGuard<'_> {
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    fn access_failed(&self, reason: impl Into<String>) -> Error {
        Error::RemoteAccessFailed {
            share: self.share.clone(),
            reason: reason.into(),
        }
    }

    /// Writes a uniquely named file, reads it back and compares the content.
    fn verify_writable(&self) -> crate::Result<()> {
        let id = Uuid::new_v4();
        let test_file = self.mount_point.join(format!(".write-test-{id}"));
        let written = format!("volume-backup write test {id}\n");

        fs::write(&test_file, &written)
            .map_err(|e| self.access_failed(format!("writing test file failed: {e}")))?;
        let read_back = fs::read(&test_file);
        if let Err(e) = fs::remove_file(&test_file) {
            log::warn!(target: "remote", "Removing {} failed: {e}", test_file.display());
        }

        let read_back =
            read_back.map_err(|e| self.access_failed(format!("reading test file failed: {e}")))?;
        if read_back != written.as_bytes() {
            return Err(self.access_failed("test file content differs from what was written"));
        }

        Ok(())
    }

    /// Directory on the share backups are stored in, created if absent.
    pub fn backup_dir(&self) -> crate::Result<PathBuf> {
        let dir = self.mount_point.join(&self.backup_subdir);
        fs::create_dir_all(&dir).map_err(|e| {
            self.access_failed(format!("creating {} failed: {e}", dir.display()))
        })?;
        Ok(dir)
    }

    /// Moves a local archive onto the share.
    ///
    /// The local file is deleted only after the copy was verified.
    pub fn transfer(&self, record: &BackupRecord, owner: Option<Owner>) -> crate::Result<BackupRecord> {
        let destination = self.backup_dir()?.join(&record.name);
        log::info!(
            target: "remote",
            "Copying {} to {}",
            record.destination_path.display(),
            destination.display()
        );

        if let Err(e) = fs::copy(&record.destination_path, &destination) {
            // a truncated copy would be listed as the newest backup
            remove_incomplete(&destination);
            return Err(self.access_failed(format!("copying {} failed: {e}", record.name)));
        }

        let copied_size = match fs::metadata(&destination) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                return Err(Error::BackupVerificationFailed {
                    path: destination,
                    reason: format!("copy missing on share: {e}"),
                })
            }
        };
        if copied_size != record.size_bytes {
            remove_incomplete(&destination);
            return Err(Error::BackupVerificationFailed {
                path: destination,
                reason: format!("copied {copied_size} of {} bytes", record.size_bytes),
            });
        }

        if let Some(owner) = owner {
            // CIFS mounts usually fix ownership with uid=/gid= mount options
            if let Err(e) = owner.apply(self.runner, &destination, false) {
                log::warn!(target: "remote", "Changing owner of {} failed: {e}", destination.display());
            }
        }

        if let Err(e) = fs::remove_file(&record.destination_path) {
            log::warn!(
                target: "remote",
                "Removing local copy {} failed: {e}",
                record.destination_path.display()
            );
        }
        log::info!(target: "remote", "Stored {} on {}", record.name, self.share);

        Ok(record.relocated(destination))
    }

    /// Unmounts the share and removes the mount point.
    pub fn release(mut self) -> crate::Result<()> {
        self.unmount()
    }

    fn unmount(&mut self) -> crate::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        if self.mounted {
            log::debug!(target: "remote", "Unmounting {}", self.mount_point.display());
            let mount_point = self.mount_point.to_string_lossy();
            let output = self.runner.run("umount", &[&*mount_point])?;
            if !output.success() {
                return Err(self.access_failed(format!(
                    "unmounting {} failed: {}",
                    self.mount_point.display(),
                    output.stderr.trim()
                )));
            }
            self.mounted = false;
        }

        // never recurse here, a failed unmount would otherwise wipe the share
        match fs::remove_dir(&self.mount_point) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.access_failed(format!(
                "removing mount point {} failed: {e}",
                self.mount_point.display()
            ))),
        }
    }
}

fn remove_incomplete(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::debug!(target: "remote", "Removed incomplete copy {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!(target: "remote", "Removing incomplete copy {} failed: {e}", path.display()),
    }
}

impl Drop for MountGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.unmount() {
            log::error!(target: "remote", "Releasing the share failed: {e}");
        }
    }
}
