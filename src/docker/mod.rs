//! Interaction with the container runtime using the `docker` CLI.

mod container;
mod volume;

pub use container::{ContainerHealth, ContainerState};

use crate::process::{command_line, CommandError, CommandOutput, CommandRunner};
use crate::Error;

const DOCKER: &str = "docker";

/// Thin wrapper around the `docker` command.
#[derive(Clone, Copy)]
pub struct Docker<'a> {
    runner: &'a dyn CommandRunner,
}

impl<'a> Docker<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self { runner }
    }

    /// Runs `docker <args>` without checking the exit status.
    fn execute(&self, args: &[&str]) -> Result<CommandOutput, CommandError> {
        self.runner.run(DOCKER, args)
    }

    /// Runs `docker <args>` and fails on non-zero exit.
    fn execute_checked(&self, args: &[&str]) -> Result<CommandOutput, CommandError> {
        self.execute(args)?.check(&command_line(DOCKER, args))
    }

    /// Checks that the docker CLI is installed and the daemon reachable.
    pub fn ensure_available(&self) -> crate::Result<()> {
        match self.execute(&["info", "--format", "{{.ServerVersion}}"]) {
            Ok(output) if output.success() => {
                log::debug!(target: "docker", "Docker daemon version {}", output.stdout.trim());
                Ok(())
            }
            Ok(output) => Err(Error::precondition(format!(
                "docker daemon not reachable: {}",
                output.stderr.trim()
            ))),
            Err(e) => Err(Error::precondition(format!("docker not available: {e}"))),
        }
    }

    /// `docker compose -f <file> pull`
    pub fn compose_pull(&self, compose_file: &str) -> crate::Result<()> {
        log::info!(target: "docker", "Pulling images of {compose_file}");
        self.execute_checked(&["compose", "-f", compose_file, "pull"])?;
        Ok(())
    }

    /// `docker compose -f <file> up -d`, recreating containers with new images.
    pub fn compose_up(&self, compose_file: &str) -> crate::Result<()> {
        log::info!(target: "docker", "Recreating containers of {compose_file}");
        self.execute_checked(&["compose", "-f", compose_file, "up", "-d"])?;
        Ok(())
    }
}
