//! Errors terminating a backup, restore or scheduling run.

use std::io;
use std::path::PathBuf;

use derive_more::{Display, Error, From};

use crate::process::CommandError;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Display, Error, From)]
/// Every failure is terminal for the current invocation.
pub enum Error {
    /// The container runtime is unavailable or a required container/setting is missing.
    #[display("Precondition failed: {reason}")]
    PreconditionFailed { reason: String },

    /// The named volume is not registered with the container runtime.
    #[display("Volume not found: {name}")]
    VolumeNotFound { name: String },

    /// The archive is missing or empty after creation.
    #[display("Backup verification failed for {}: {reason}", path.display())]
    BackupVerificationFailed { path: PathBuf, reason: String },

    /// Mounting, the write test or the read-back of the remote share failed.
    #[display("Remote share {share} not accessible: {reason}")]
    RemoteAccessFailed { share: String, reason: String },

    /// Clearing or extracting into the volume failed.
    #[display("Restore into {} failed: {reason}", path.display())]
    RestoreFailed { path: PathBuf, reason: String },

    /// The container didn't come back up after the bounded restart attempts.
    #[display("Container {container} failed to start after {attempts} attempts\n{remediation}")]
    RestartExhausted {
        container: String,
        attempts: usize,
        remediation: String,
    },

    /// The companion service never reported a healthy state.
    #[display("Service {service} not healthy after {attempts} checks")]
    HealthCheckExhausted { service: String, attempts: usize },

    /// Malformed share address, out-of-range menu selection, ...
    #[display("Invalid input: {_0}")]
    InvalidInput(#[error(ignore)] String),

    /// Reading or writing the configuration file failed.
    #[display("Configuration error: {_0}")]
    Config(#[error(ignore)] String),

    #[display("{_0}")]
    #[from]
    Command(CommandError),

    #[display("I/O error: {_0}")]
    #[from]
    Io(io::Error),
}

impl Error {
    pub(crate) fn precondition(reason: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }
}
