//! Configuration file of the tool.
//!
//! The configuration is read once at startup and handed to every flow explicitly.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backup::restore::DEFAULT_RESTART_DELAYS;
use crate::remote::{ShareAddress, DEFAULT_BACKUP_SUBDIR};
use crate::util::{Owner, RetentionConfig, RetryPolicy};
use crate::Error;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/volume-backup/config.toml";

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
/// Configuration of all flows.
pub struct Config {
    /// Container of the web application.
    pub container: String,

    /// Docker volume holding the data of [container](Self::container).
    pub volume: String,

    /// Prefix of archive names, `<volume>_backup` if unset.
    pub backup_prefix: Option<String>,

    /// Local directory backups are stored in.
    pub backup_dir: PathBuf,

    /// Local directory archives are written to before moving them to a share.
    pub staging_dir: PathBuf,

    /// `uid:gid` the container accesses its volume with.
    ///
    /// Restored files are handed over to this identity.
    pub container_owner: Owner,

    /// SMB/CIFS share for remote backups.
    pub remote: RemoteConfig,

    /// Restarting the container after a restore.
    pub restart: RestartConfig,

    /// The inference service the web application talks to.
    pub companion: CompanionConfig,

    pub update: UpdateConfig,

    /// Pruning of old backups after unattended runs, nothing is pruned if unset.
    pub retention: Option<RetentionConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            container: "open-webui".into(),
            volume: "open-webui".into(),
            backup_prefix: None,
            backup_dir: "/var/backups/volume-backup".into(),
            staging_dir: "/var/tmp/volume-backup".into(),
            container_owner: Owner::new(0, 0),
            remote: RemoteConfig::default(),
            restart: RestartConfig::default(),
            companion: CompanionConfig::default(),
            update: UpdateConfig::default(),
            retention: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// `//server/share`, remote backups are disabled if unset.
    pub address: Option<ShareAddress>,
    /// `mount.cifs` credentials file, see [Credentials](crate::remote::Credentials).
    pub credentials_file: PathBuf,
    /// Directory the share is temporarily mounted at.
    pub mount_point: PathBuf,
    /// Directory on the share backups are stored in.
    pub backup_subdir: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            address: None,
            credentials_file: "/etc/volume-backup/smb-credentials".into(),
            mount_point: "/mnt/volume-backup".into(),
            backup_subdir: DEFAULT_BACKUP_SUBDIR.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    /// Seconds to wait before each start attempt.
    pub delays_secs: Vec<u64>,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            delays_secs: DEFAULT_RESTART_DELAYS.iter().map(Duration::as_secs).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    /// Container name if the service runs in docker.
    pub container: String,
    /// Process name if the service runs on the host.
    pub process_name: String,
    pub health_attempts: usize,
    pub health_interval_secs: u64,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            container: "ollama".into(),
            process_name: "ollama".into(),
            health_attempts: 30,
            health_interval_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Compose file of the containers, required for updates.
    pub compose_file: Option<PathBuf>,
}

impl Config {
    /// Reads the config at `path`, writing and returning the defaults if it doesn't exist yet.
    pub fn load_or_init(path: &Path) -> crate::Result<Self> {
        match fs::read_to_string(path) {
            Ok(config_str) => toml::from_str(&config_str).map_err(|e| {
                Error::Config(format!("reading {} failed: {e}", path.display()))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!(
                    "Writing default config to {} because it doesn't exist yet",
                    path.display()
                );
                let default_config = Self::default();
                if let Err(e) = default_config.save(path) {
                    log::warn!("Writing default config to {} failed: {e}", path.display());
                }
                Ok(default_config)
            }
            Err(e) => Err(Error::Config(format!(
                "reading {} failed: {e}",
                path.display()
            ))),
        }
    }

    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let config_str = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("serializing config failed: {e}")))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, config_str)?;
        Ok(())
    }

    pub fn backup_prefix(&self) -> String {
        self.backup_prefix
            .clone()
            .unwrap_or_else(|| format!("{}_backup", self.volume))
    }

    pub fn restart_policy(&self) -> RetryPolicy {
        RetryPolicy::with_delays(
            self.restart
                .delays_secs
                .iter()
                .copied()
                .map(Duration::from_secs)
                .collect(),
        )
    }

    pub fn health_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.companion.health_attempts,
            Duration::from_secs(self.companion.health_interval_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_is_written_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc/config.toml");

        let config = Config::load_or_init(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.is_file());
        assert_eq!(Config::load_or_init(&path).unwrap(), config);
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
volume = "app-data"
container_owner = "1000:1000"

[remote]
address = '\\nas\backup'

[retention]
daily = 7
"#,
        )
        .unwrap();

        let config = Config::load_or_init(&path).unwrap();
        assert_eq!(config.backup_prefix(), "app-data_backup");
        assert_eq!(config.container_owner, Owner::new(1000, 1000));
        assert_eq!(config.remote.address.as_ref().unwrap().as_str(), "//nas/backup");
        assert_eq!(config.remote.backup_subdir, "backups");
        let retention = config.retention.unwrap();
        assert_eq!(retention.daily, Some(7));
        assert_eq!(retention.monthly, None);
        assert_eq!(config.restart_policy().attempts(), 2);
    }

    #[test]
    fn invalid_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[remote]\naddress = \"not a share\"\n").unwrap();

        assert!(matches!(Config::load_or_init(&path), Err(Error::Config(_))));
    }
}
