//! Backup and restore of a docker volume.
//!
//! Backups are gzip compressed tar archives of the volume's backing directory, stored in a local
//! directory or on an SMB/CIFS share. A restore replaces the volume contents while the container
//! using it is stopped, see [`backup::RestoreExecutor`].
//!
//! External programs (`docker`, `mount.cifs`, `crontab`, ...) are run through
//! [`process::CommandRunner`], all flows are composed in [`orchestrator::Context`].

#![forbid(unsafe_code)]

pub mod backup;
pub mod cli;
pub mod config;
pub mod docker;
mod error;
pub mod orchestrator;
pub mod process;
pub mod remote;
pub mod schedule;
pub mod service;
pub mod util;
pub mod wizard;

pub use error::{Error, Result};
