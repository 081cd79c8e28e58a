use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::LevelFilter;

use crate::config::DEFAULT_CONFIG_PATH;
use crate::schedule::Frequency;
use crate::util::Owner;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Verbosity of the command output.
    #[arg(long)]
    pub verbose: Option<LevelFilter>,

    /// Configuration file, created with defaults if missing.
    #[arg(long, env = "VOLUME_BACKUP_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Unattended backup to a directory or `//server/share`, used by cron.
    ///
    /// Takes precedence over any action.
    #[arg(long, value_name = "DEST")]
    pub auto_backup: Option<String>,

    /// User archives are handed over to.
    #[arg(long, env = "SUDO_UID", requires = "invoking_gid", hide_env_values = true)]
    pub invoking_uid: Option<u32>,

    /// Group archives are handed over to.
    #[arg(long, env = "SUDO_GID", requires = "invoking_uid", hide_env_values = true)]
    pub invoking_gid: Option<u32>,

    /// Interactive menu if omitted.
    #[command(subcommand)]
    pub action: Option<Action>,
}

impl Cli {
    pub fn invoking_user(&self) -> Option<Owner> {
        Some(Owner::new(self.invoking_uid?, self.invoking_gid?))
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Create a backup of the volume.
    Backup {
        /// Directory or `//server/share`, the configured backup directory if omitted.
        destination: Option<String>,
    },
    /// Restore the volume from a backup.
    Restore {
        /// Directory or `//server/share` to restore from.
        #[arg(long)]
        from: Option<String>,
        /// Archive to restore, chosen interactively if omitted.
        archive: Option<PathBuf>,
    },
    /// List available backups, most recent first.
    List {
        /// Directory or `//server/share`, the configured backup directory if omitted.
        #[arg(long)]
        from: Option<String>,
    },
    /// Register a periodic unattended backup in the crontab.
    Schedule {
        #[arg(value_enum)]
        frequency: Frequency,
        /// Directory or `//server/share`, the configured backup directory if omitted.
        destination: Option<String>,
    },
    /// Configure and test the remote share.
    Remote,
    /// Show volume, container and backup status.
    Check,
    /// Pull and recreate the containers.
    Update {
        /// Create a local backup first.
        #[arg(long)]
        backup_first: bool,
    },
    /// Delete old local backups according to the retention config.
    Prune {
        #[arg(long)]
        dry_run: bool,
    },
}
