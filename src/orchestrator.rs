//! The backup, restore, schedule and update flows built from the individual modules.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::backup::{list_backups, verify_integrity, ArchiveWriter, BackupRecord, RestoreExecutor, RestoreState};
use crate::config::Config;
use crate::docker::{ContainerState, Docker};
use crate::process::CommandRunner;
use crate::remote::{RemoteShare, ShareAddress};
use crate::schedule::{self, Frequency, ScheduleEntry};
use crate::service::{self, ServiceMode};
use crate::util::{prune_backups, Owner, RetentionConfig, Sleep};
use crate::Error;

/// Where backups are stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupTarget {
    Local(PathBuf),
    Remote(ShareAddress),
}

impl BackupTarget {
    /// A share address (`//server/share`) selects the share, anything else a local directory.
    pub fn parse(destination: &str) -> Self {
        match destination.parse::<ShareAddress>() {
            Ok(address) => Self::Remote(address),
            Err(_) => Self::Local(PathBuf::from(destination.trim())),
        }
    }
}

impl fmt::Display for BackupTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupTarget::Local(dir) => write!(f, "{}", dir.display()),
            BackupTarget::Remote(address) => write!(f, "{address}"),
        }
    }
}

/// Overview printed by the `check` command.
#[derive(Debug, Clone)]
pub struct Status {
    pub volume_path: PathBuf,
    pub container: ContainerState,
    pub companion: ServiceMode,
    pub local_backups: Vec<BackupRecord>,
}

/// Everything a flow needs, passed around instead of global state.
pub struct Context<'a> {
    pub config: &'a Config,
    pub runner: &'a dyn CommandRunner,
    pub sleeper: &'a dyn Sleep,
    /// The user behind `sudo`; archives are handed over to them.
    pub invoking_user: Option<Owner>,
}

impl<'a> Context<'a> {
    pub fn docker(&self) -> Docker<'a> {
        Docker::new(self.runner)
    }

    fn archive_writer(&self) -> ArchiveWriter<'a> {
        ArchiveWriter::new(self.config.backup_prefix(), self.runner).with_owner(self.invoking_user)
    }

    pub fn remote_share(&self, address: ShareAddress) -> RemoteShare<'a> {
        self.remote_share_with_credentials(address, &self.config.remote.credentials_file)
    }

    /// Like [remote_share](Self::remote_share) but logging in with another credentials file.
    pub fn remote_share_with_credentials(
        &self,
        address: ShareAddress,
        credentials_file: &Path,
    ) -> RemoteShare<'a> {
        let remote = &self.config.remote;
        RemoteShare::new(self.runner, address, credentials_file, &remote.mount_point)
        .with_backup_subdir(remote.backup_subdir.as_str())
        .with_owner(self.invoking_user)
    }

    /// The configured share, [Error::PreconditionFailed] if none is configured.
    pub fn configured_share(&self) -> crate::Result<ShareAddress> {
        self.config
            .remote
            .address
            .clone()
            .ok_or_else(|| Error::precondition("no remote share configured, run `remote` first"))
    }

    /// Backing directory of the configured volume; checks docker is usable first.
    fn volume_path(&self) -> crate::Result<PathBuf> {
        let docker = self.docker();
        docker.ensure_available()?;
        docker.volume_mountpoint(&self.config.volume)
    }

    /// Creates a backup in `target`.
    pub fn backup(&self, target: &BackupTarget) -> crate::Result<BackupRecord> {
        self.backup_with_retention(target, None)
    }

    /// Entry point of scheduled runs: a backup followed by pruning if configured.
    pub fn auto_backup(&self, destination: &str) -> crate::Result<BackupRecord> {
        let target = BackupTarget::parse(destination);
        log::info!("Unattended backup of volume {} to {target}", self.config.volume);
        self.backup_with_retention(&target, self.config.retention)
    }

    fn backup_with_retention(
        &self,
        target: &BackupTarget,
        retention: Option<RetentionConfig>,
    ) -> crate::Result<BackupRecord> {
        let volume_path = self.volume_path()?;
        let prefix = self.config.backup_prefix();

        match target {
            BackupTarget::Local(dir) => {
                let record = self.archive_writer().create_backup(&volume_path, dir)?;
                if let Some(retention) = retention {
                    prune_backups(dir, &prefix, retention, false)?;
                }
                Ok(record)
            }
            BackupTarget::Remote(address) => {
                // pre-flight before any archive is written
                let guard = self.remote_share(address.clone()).mount()?;
                let backup_dir = guard.backup_dir()?;

                let local = self
                    .archive_writer()
                    .create_backup(&volume_path, &self.config.staging_dir)?;
                let record = guard.transfer(&local, self.invoking_user)?;

                if let Some(retention) = retention {
                    prune_backups(&backup_dir, &prefix, retention, false)?;
                }
                guard.release()?;

                Ok(record)
            }
        }
    }

    /// Calls `f` with the directory and the backups of `target`, most recent first.
    ///
    /// A share stays mounted while `f` runs.
    pub fn with_backups<T>(
        &self,
        target: &BackupTarget,
        f: impl FnOnce(&Path, Vec<BackupRecord>) -> crate::Result<T>,
    ) -> crate::Result<T> {
        let prefix = self.config.backup_prefix();
        match target {
            BackupTarget::Local(dir) => f(dir.as_path(), list_backups(dir, Some(&prefix))?),
            BackupTarget::Remote(address) => {
                let guard = self.remote_share(address.clone()).mount()?;
                let dir = guard.backup_dir()?;
                let result = f(dir.as_path(), list_backups(&dir, Some(&prefix))?)?;
                guard.release()?;
                Ok(result)
            }
        }
    }

    /// Restores `archive` into the configured volume after `confirmation`.
    pub fn restore(&self, archive: &Path, confirmation: &str) -> crate::Result<RestoreState> {
        self.docker().ensure_available()?;

        let mut executor = RestoreExecutor::new(
            self.runner,
            self.sleeper,
            self.config.container.as_str(),
            self.config.volume.as_str(),
        )
        .with_container_owner(self.config.container_owner)
        .with_restart_policy(self.config.restart_policy());

        executor.run(archive, confirmation)
    }

    /// Checks an archive can be read completely before anything is stopped or deleted.
    pub fn verify_archive(&self, archive: &Path) -> crate::Result<()> {
        verify_integrity(archive)
    }

    /// Registers an unattended backup to `target` in the crontab.
    pub fn schedule(
        &self,
        frequency: Frequency,
        target: &BackupTarget,
        script: &Path,
    ) -> crate::Result<ScheduleEntry> {
        // cron starts in the home directory
        if !script.is_absolute() {
            return Err(Error::precondition(format!(
                "scheduled command {} is not an absolute path",
                script.display()
            )));
        }

        let destination = match target {
            BackupTarget::Local(dir) => {
                let dir = std::path::absolute(dir)?;
                dir.to_string_lossy().into_owned()
            }
            BackupTarget::Remote(address) => {
                // fail now instead of every night
                self.remote_share(address.clone()).test_access()?;
                address.to_string()
            }
        };
        schedule::register_periodic(self.runner, frequency, script, &destination)
    }

    pub fn status(&self) -> crate::Result<Status> {
        let volume_path = self.volume_path()?;
        let container = self.docker().container_state(&self.config.container)?;
        let companion = &self.config.companion;
        let companion = service::detect_mode(self.runner, &companion.container, &companion.process_name)?;
        let local_backups = list_backups(&self.config.backup_dir, Some(&self.config.backup_prefix()))?;

        Ok(Status {
            volume_path,
            container,
            companion,
            local_backups,
        })
    }

    /// Pulls new images, recreates the containers and waits for them to become healthy.
    pub fn update(&self, backup_first: bool) -> crate::Result<()> {
        let compose_file = self
            .config
            .update
            .compose_file
            .as_ref()
            .ok_or_else(|| Error::precondition("no compose_file configured in [update]"))?;
        let compose_file = compose_file.to_string_lossy();

        let docker = self.docker();
        docker.ensure_available()?;

        if backup_first {
            let record = self.backup(&BackupTarget::Local(self.config.backup_dir.clone()))?;
            log::info!("Backup before update: {}", record.destination_path.display());
        }

        docker.compose_pull(&compose_file)?;
        docker.compose_up(&compose_file)?;

        let policy = self.config.health_policy();
        service::wait_until_healthy(self.runner, self.sleeper, &policy, &self.config.container)?;

        let companion = &self.config.companion;
        match service::detect_mode(self.runner, &companion.container, &companion.process_name)? {
            ServiceMode::Container => {
                service::wait_until_healthy(self.runner, self.sleeper, &policy, &companion.container)?
            }
            ServiceMode::HostProcess => {
                log::info!("{} runs on the host, not managed by compose", companion.process_name)
            }
            ServiceMode::NotRunning => {
                log::warn!("{} is not running", companion.process_name)
            }
        }

        Ok(())
    }

    /// Applies the retention config to the local backups.
    ///
    /// Without a `[retention]` section nothing is pruned.
    pub fn prune(&self, dry_run: bool) -> crate::Result<Vec<BackupRecord>> {
        let retention = self
            .config
            .retention
            .ok_or_else(|| Error::precondition("no [retention] configured, nothing to prune"))?;
        prune_backups(
            &self.config.backup_dir,
            &self.config.backup_prefix(),
            retention,
            dry_run,
        )
    }
}
