use std::collections::HashSet;
use std::fs;
use std::path::Path;

use chrono::Datelike;

use crate::backup::{list_backups, BackupRecord};

/// Configure retention of backups.
///
/// If either value is [None] every backup of the type will be kept.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct RetentionConfig {
    /// Defines how many daily backups to keep.
    ///
    /// A daily backup is the newest backup of the day.
    pub daily: Option<usize>,

    /// Defines how many weekly backups to keep.
    ///
    /// A weekly backup is the newest backup of the ISO week.
    pub weekly: Option<usize>,

    /// Defines how many monthly backups to keep.
    pub monthly: Option<usize>,

    /// Defines how many yearly backups to keep.
    pub yearly: Option<usize>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            daily: Some(7),
            weekly: Some(4),
            monthly: Some(12),
            yearly: Some(0),
        }
    }
}

/// Decides backup by backup which to keep; feed it the newest backup first.
#[derive(Clone, Debug)]
pub struct Retention {
    pub config: RetentionConfig,
    daily: HashSet<(i32, u32)>,
    weekly: HashSet<(i32, u32)>,
    monthly: HashSet<(i32, u32)>,
    yearly: HashSet<i32>,
}

impl From<RetentionConfig> for Retention {
    fn from(config: RetentionConfig) -> Self {
        Self::new(config)
    }
}

impl Retention {
    pub fn new(config: RetentionConfig) -> Self {
        Self {
            config,
            daily: HashSet::new(),
            weekly: HashSet::new(),
            monthly: HashSet::new(),
            yearly: HashSet::new(),
        }
    }

    /// Returns if the backup from `date` is to be retained.
    pub fn retain(&mut self, date: impl Datelike) -> bool {
        let Self {
            config,
            daily,
            weekly,
            monthly,
            yearly,
        } = self;

        let new_daily = config
            .daily
            .is_none_or(|keep_daily| daily.len() < keep_daily)
            && daily.insert((date.year(), date.ordinal()));

        let new_weekly = config
            .weekly
            .is_none_or(|keep_weekly| weekly.len() < keep_weekly)
            && {
                let week = date.iso_week();
                weekly.insert((week.year(), week.week()))
            };

        let new_monthly = config
            .monthly
            .is_none_or(|keep_monthly| monthly.len() < keep_monthly)
            && monthly.insert((date.year(), date.month()));

        let new_yearly = config
            .yearly
            .is_none_or(|keep_yearly| yearly.len() < keep_yearly)
            && yearly.insert(date.year());

        new_daily || new_weekly || new_monthly || new_yearly
    }
}

/// Deletes the backups in `dir` with `prefix` that [Retention] doesn't keep.
///
/// Returns the pruned backups. On a dry run nothing is deleted.
pub fn prune_backups(
    dir: &Path,
    prefix: &str,
    config: RetentionConfig,
    dry_run: bool,
) -> crate::Result<Vec<BackupRecord>> {
    let mut retention = Retention::new(config);
    let mut pruned = Vec::new();

    // most recent first
    for backup in list_backups(dir, Some(prefix))? {
        if retention.retain(backup.created_at) {
            log::trace!(target: "retention", "Keeping {}", backup.name);
            continue;
        }

        if dry_run {
            log::info!(target: "retention", "Would delete {}", backup.name);
        } else {
            log::info!(target: "retention", "Deleting {}", backup.name);
            fs::remove_file(&backup.destination_path)?;
        }
        pruned.push(backup);
    }

    Ok(pruned)
}
