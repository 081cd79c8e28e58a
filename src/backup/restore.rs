//! Restoring an archive over the live volume.

use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Duration;

use derive_more::Display;
use flate2::read::GzDecoder;

use crate::docker::{ContainerState, Docker};
use crate::process::CommandRunner;
use crate::util::{Owner, RetryPolicy, Sleep};
use crate::Error;

/// Waits before the first and second attempt to start the container again.
pub const DEFAULT_RESTART_DELAYS: [Duration; 2] = [Duration::from_secs(2), Duration::from_secs(5)];

/// Progress of a single restore attempt.
///
/// `Cancelled` is only reachable from `Idle`, `Failed` from every state after `Confirmed`.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum RestoreState {
    Idle,
    Confirmed,
    ContainerStopped,
    VolumeCleared,
    Extracted,
    OwnershipFixed,
    ContainerRestarted,
    Done,
    Cancelled,
    Failed,
}

/// Whether the operator's answer confirms a destructive action (`yes`/`y`, any case).
pub fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("yes") || answer.eq_ignore_ascii_case("y")
}

/// Manual steps printed when the container doesn't come back up.
pub fn restart_remediation(container: &str) -> String {
    format!(
        "The volume was restored but the container could not be started. Usually another process holds its port.\n\
         - Check for port conflicts: `docker ps --format '{{{{.Names}}}} {{{{.Ports}}}}'` and `sudo ss -tlnp`\n\
         - Inspect the container output: `docker logs --tail 50 {container}`\n\
         - Finish the restore manually once the port is free: `docker start {container}`"
    )
}

/// Restores archives into the volume of a container, stopping and restarting it around the restore.
pub struct RestoreExecutor<'a> {
    docker: Docker<'a>,
    runner: &'a dyn CommandRunner,
    sleeper: &'a dyn Sleep,
    container: String,
    volume: String,
    container_owner: Owner,
    restart_policy: RetryPolicy,
    history: Vec<RestoreState>,
}

impl<'a> RestoreExecutor<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        sleeper: &'a dyn Sleep,
        container: impl Into<String>,
        volume: impl Into<String>,
    ) -> Self {
        Self {
            docker: Docker::new(runner),
            runner,
            sleeper,
            container: container.into(),
            volume: volume.into(),
            container_owner: Owner::new(0, 0),
            restart_policy: RetryPolicy::with_delays(DEFAULT_RESTART_DELAYS.to_vec()),
            history: vec![RestoreState::Idle],
        }
    }

    /// Identity the container accesses its volume with.
    pub fn with_container_owner(mut self, owner: Owner) -> Self {
        self.container_owner = owner;
        self
    }

    pub fn with_restart_policy(mut self, policy: RetryPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    pub fn state(&self) -> RestoreState {
        self.history
            .last()
            .copied()
            .unwrap_or(RestoreState::Idle)
    }

    /// Every state passed through, starting with [RestoreState::Idle].
    pub fn history(&self) -> &[RestoreState] {
        &self.history
    }

    fn transition(&mut self, state: RestoreState) {
        log::debug!(target: "restore", "{} -> {state}", self.state());
        self.history.push(state);
    }

    /// Restores `archive` if `confirmation` is affirmative.
    ///
    /// Returns the terminal state, [RestoreState::Done] or [RestoreState::Cancelled].
    /// On error the executor is left in [RestoreState::Failed].
    ///
    /// <div class="warning">
    /// The volume is cleared before the archive is extracted. A failing
    /// extraction leaves the volume empty.
    /// </div>
    pub fn run(&mut self, archive: &Path, confirmation: &str) -> crate::Result<RestoreState> {
        if self.state() != RestoreState::Idle {
            return Err(Error::precondition("a restore executor runs only once"));
        }

        if !is_affirmative(confirmation) {
            log::info!(target: "restore", "Restore cancelled, volume {} untouched", self.volume);
            self.transition(RestoreState::Cancelled);
            return Ok(RestoreState::Cancelled);
        }
        self.transition(RestoreState::Confirmed);

        match self.restore(archive) {
            Ok(()) => {
                self.transition(RestoreState::Done);
                log::info!(target: "restore", "Restored {} into volume {}", archive.display(), self.volume);
                Ok(RestoreState::Done)
            }
            Err(e) => {
                self.transition(RestoreState::Failed);
                Err(e)
            }
        }
    }

    fn restore(&mut self, archive: &Path) -> crate::Result<()> {
        let was_running = match self.docker.container_state(&self.container)? {
            ContainerState::Running => {
                self.docker.stop_container(&self.container)?;
                true
            }
            ContainerState::Stopped => false,
            ContainerState::Absent => {
                log::warn!(target: "restore", "Container {} doesn't exist", self.container);
                false
            }
        };
        self.transition(RestoreState::ContainerStopped);

        if !self.docker.volume_exists(&self.volume)? {
            self.docker.create_volume(&self.volume)?;
        }
        let volume_path = self.docker.volume_mountpoint(&self.volume)?;
        let restore_failed = |what: &str, e: &dyn std::fmt::Display| Error::RestoreFailed {
            path: volume_path.clone(),
            reason: format!("{what}: {e}"),
        };

        log::info!(target: "restore", "Clearing {}", volume_path.display());
        clear_directory(&volume_path).map_err(|e| restore_failed("clearing the volume failed", &e))?;
        self.transition(RestoreState::VolumeCleared);

        log::info!(target: "restore", "Extracting {} into {}", archive.display(), volume_path.display());
        extract(archive, &volume_path).map_err(|e| restore_failed("extracting the archive failed", &e))?;
        self.transition(RestoreState::Extracted);

        self.container_owner
            .apply(self.runner, &volume_path, true)
            .map_err(|e| restore_failed("fixing ownership failed", &e))?;
        self.transition(RestoreState::OwnershipFixed);

        if was_running {
            self.restart()?;
            self.transition(RestoreState::ContainerRestarted);
        } else {
            log::info!(target: "restore", "Container {} wasn't running, not starting it", self.container);
        }

        Ok(())
    }

    fn restart(&self) -> crate::Result<()> {
        let docker = self.docker;
        let container = self.container.as_str();

        self.restart_policy
            .run(self.sleeper, |attempt| {
                log::info!(target: "restore", "Starting {container} (attempt {attempt}/{})", self.restart_policy.attempts());
                docker.start_container(container)
            })
            .map_err(|e| {
                log::error!(target: "restore", "Starting {container} failed: {e}");
                Error::RestartExhausted {
                    container: container.to_string(),
                    attempts: self.restart_policy.attempts(),
                    remediation: restart_remediation(container),
                }
            })
    }
}

/// Removes everything inside `dir`, keeping `dir` itself.
fn clear_directory(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

fn extract(archive: &Path, into: &Path) -> io::Result<()> {
    let file = File::open(archive)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);
    archive.unpack(into)
}
