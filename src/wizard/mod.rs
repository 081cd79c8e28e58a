//! Menu driven interactive mode.

mod prompt;

pub use prompt::{Prompter, StdioPrompter};

use std::path::{Path, PathBuf};

use crate::backup::{BackupRecord, RestoreState};
use crate::config::Config;
use crate::orchestrator::{BackupTarget, Context, Status};
use crate::remote::{Credentials, ShareAddress};
use crate::schedule::Frequency;
use crate::Error;

/// Parses a 1-based menu choice out of `count` options into a 0-based index.
pub fn parse_selection(input: &str, count: usize) -> crate::Result<usize> {
    let input = input.trim();
    match input.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Ok(n - 1),
        _ => Err(Error::invalid_input(format!(
            "'{input}' is not a choice between 1 and {count}"
        ))),
    }
}

/// `1.5 MiB`, `512 B`, ...
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

pub fn describe_backup(record: &BackupRecord) -> String {
    format!(
        "{}  {}  ({})",
        record.name,
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        human_size(record.size_bytes)
    )
}

pub fn describe_status(config: &Config, status: &Status) -> Vec<String> {
    let mut lines = vec![
        format!("Volume {}: {}", config.volume, status.volume_path.display()),
        format!("Container {}: {:?}", config.container, status.container),
        format!(
            "Companion service {}: {}",
            config.companion.process_name, status.companion
        ),
        format!(
            "{} local backups in {}",
            status.local_backups.len(),
            config.backup_dir.display()
        ),
    ];
    if let Some(latest) = status.local_backups.first() {
        lines.push(format!("Latest: {}", describe_backup(latest)));
    }
    lines
}

const MENU: [&str; 7] = [
    "Create a backup now",
    "Restore a backup",
    "Schedule periodic backups",
    "Configure the remote share",
    "Show status",
    "Update containers",
    "Exit",
];

/// Interactive front end of the flows in [Context].
pub struct Wizard<'c, 'a, P> {
    ctx: &'c Context<'a>,
    prompter: P,
    config_path: PathBuf,
    /// Path cron invokes for unattended backups.
    script: PathBuf,
    /// The share configured in this session or in the config file.
    share: Option<ShareAddress>,
}

impl<'c, 'a, P: Prompter> Wizard<'c, 'a, P> {
    pub fn new(ctx: &'c Context<'a>, prompter: P, config_path: &Path, script: &Path) -> Self {
        Self {
            ctx,
            prompter,
            config_path: config_path.to_path_buf(),
            script: script.to_path_buf(),
            share: ctx.config.remote.address.clone(),
        }
    }

    fn ask(&mut self, question: &str) -> crate::Result<String> {
        Ok(self.prompter.ask(question)?)
    }

    /// Shows numbered `options` and returns the 0-based index of the choice.
    fn select(&mut self, title: &str, options: &[String]) -> crate::Result<usize> {
        self.prompter.say(title);
        for (i, option) in options.iter().enumerate() {
            self.prompter.say(&format!("  {}) {option}", i + 1));
        }
        let answer = self.ask(&format!("Choice [1-{}]:", options.len()))?;
        parse_selection(&answer, options.len())
    }

    /// Main menu, runs until the operator exits.
    pub fn run(&mut self) -> crate::Result<()> {
        let menu: Vec<String> = MENU.iter().map(|s| s.to_string()).collect();
        loop {
            self.prompter.say("");
            match self.select(&format!("Volume backup of {}", self.ctx.config.volume), &menu)? {
                0 => self.backup()?,
                1 => {
                    self.restore(None, None)?;
                }
                2 => self.schedule(None)?,
                3 => self.configure_remote()?,
                4 => self.status()?,
                5 => self.update()?,
                _ => return Ok(()),
            }
        }
    }

    /// Lets the operator pick local storage or the share.
    fn choose_target(&mut self, purpose: &str) -> crate::Result<BackupTarget> {
        let local = self.ctx.config.backup_dir.clone();
        let Some(share) = self.share.clone() else {
            return Ok(BackupTarget::Local(local));
        };

        let options = [
            format!("Local directory ({})", local.display()),
            format!("Remote share ({share})"),
        ];
        match self.select(purpose, &options)? {
            0 => Ok(BackupTarget::Local(local)),
            _ => Ok(BackupTarget::Remote(share)),
        }
    }

    pub fn backup(&mut self) -> crate::Result<()> {
        let target = self.choose_target("Where should the backup be stored?")?;
        let record = self.ctx.backup(&target)?;
        self.prompter.say(&format!(
            "Backup created: {} ({})",
            record.destination_path.display(),
            human_size(record.size_bytes)
        ));
        Ok(())
    }

    /// Restores `archive` (a file name in `target` or a path) or a backup chosen from a list.
    pub fn restore(
        &mut self,
        target: Option<BackupTarget>,
        archive: Option<PathBuf>,
    ) -> crate::Result<RestoreState> {
        let target = match target {
            Some(target) => target,
            None => self.choose_target("Restore from where?")?,
        };

        let ctx = self.ctx;
        let state = ctx.with_backups(&target, |dir, backups| {
            let archive = match archive {
                Some(archive) => dir.join(archive),
                None => {
                    if backups.is_empty() {
                        return Err(Error::precondition(format!(
                            "no backups found in {}",
                            dir.display()
                        )));
                    }
                    let options: Vec<String> = backups.iter().map(describe_backup).collect();
                    let choice = self.select("Available backups (most recent first):", &options)?;
                    backups[choice].destination_path.clone()
                }
            };

            ctx.verify_archive(&archive)?;

            self.prompter.say(&format!(
                "WARNING: all data in volume {} will be replaced by {}. Container {} will be stopped.",
                ctx.config.volume,
                archive.display(),
                ctx.config.container
            ));
            let confirmation = self.ask("Type 'yes' to continue:")?;
            ctx.restore(&archive, &confirmation)
        })?;

        match state {
            RestoreState::Cancelled => self.prompter.say("Restore cancelled, nothing was changed."),
            _ => self.prompter.say("Restore finished."),
        }
        Ok(state)
    }

    /// Registers an unattended backup, asking for the frequency if not given.
    pub fn schedule(&mut self, frequency: Option<Frequency>) -> crate::Result<()> {
        let frequency = match frequency {
            Some(frequency) => frequency,
            None => {
                let frequencies = [Frequency::Daily, Frequency::Weekly, Frequency::Monthly];
                let options: Vec<String> = frequencies
                    .iter()
                    .map(|f| format!("{f} ({})", f.cron_expression()))
                    .collect();
                frequencies[self.select("How often?", &options)?]
            }
        };
        let target = self.choose_target("Where should scheduled backups be stored?")?;

        let entry = self.ctx.schedule(frequency, &target, &self.script)?;
        self.prompter.say(&format!("Added to crontab: {entry}"));
        Ok(())
    }

    /// Asks for the share and its credentials, tests them and remembers the share.
    pub fn configure_remote(&mut self) -> crate::Result<()> {
        let address: ShareAddress = self.ask("Share address (//server/share):")?.parse()?;
        let username = self.ask("Username:")?;
        let password = self.ask("Password:")?;
        let domain = self.ask("Domain (empty for none):")?;
        let credentials = Credentials {
            username,
            password,
            domain: Some(domain.trim().to_string()).filter(|d| !d.is_empty()),
        };

        // the working credentials stay in place until the new ones are tested
        let credentials_file = &self.ctx.config.remote.credentials_file;
        let mut candidate = credentials_file.clone().into_os_string();
        candidate.push(".new");
        let candidate = PathBuf::from(candidate);
        credentials.write(&candidate)?;

        self.prompter.say(&format!("Testing write access to {address} ..."));
        let tested = self
            .ctx
            .remote_share_with_credentials(address.clone(), &candidate)
            .test_access();
        if let Err(e) = tested {
            if let Err(remove) = std::fs::remove_file(&candidate) {
                log::warn!(target: "remote", "Removing {} failed: {remove}", candidate.display());
            }
            return Err(e);
        }
        std::fs::rename(&candidate, credentials_file)?;
        self.prompter.say("Share is writable.");

        let mut config = self.ctx.config.clone();
        config.remote.address = Some(address.clone());
        config.save(&self.config_path)?;
        self.share = Some(address);
        self.prompter.say(&format!("Saved to {}", self.config_path.display()));

        Ok(())
    }

    pub fn status(&mut self) -> crate::Result<()> {
        let status = self.ctx.status()?;
        for line in describe_status(self.ctx.config, &status) {
            self.prompter.say(&line);
        }
        Ok(())
    }

    pub fn update(&mut self) -> crate::Result<()> {
        let answer = self.ask("Create a backup before updating? [Y/n]:")?;
        let backup_first = !matches!(answer.trim().to_ascii_lowercase().as_str(), "n" | "no");
        self.ctx.update(backup_first)?;
        self.prompter.say("Update finished.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::prompt::testing::ScriptedPrompter;
    use super::*;
    use crate::backup::ArchiveWriter;
    use crate::process::fake::{container_json, fail, ok, volume_json, FakeRunner};
    use crate::util::retry::testing::RecordingSleep;

    #[test]
    fn selections() {
        assert_eq!(parse_selection("1", 3).unwrap(), 0);
        assert_eq!(parse_selection(" 3\n", 3).unwrap(), 2);
        for input in ["0", "4", "", "two", "-1"] {
            assert!(matches!(parse_selection(input, 3), Err(Error::InvalidInput(_))), "{input:?}");
        }
    }

    #[test]
    fn sizes() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(10 * 1024 * 1024), "10.0 MiB");
        assert_eq!(human_size(1536), "1.5 KiB");
    }

    struct Setup {
        root: tempfile::TempDir,
        volume: tempfile::TempDir,
        config: Config,
    }

    fn setup() -> Setup {
        let root = tempfile::tempdir().unwrap();
        let volume = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.volume = "app-data".into();
        config.container = "app".into();
        config.backup_dir = root.path().join("backups");

        // two archives, the newer one holds "new"
        let runner = FakeRunner::succeeding();
        let writer = ArchiveWriter::new(config.backup_prefix(), &runner);
        for (content, second) in [("old", 1), ("new", 2)] {
            let source = tempfile::tempdir().unwrap();
            fs::write(source.path().join("state.txt"), content).unwrap();
            let ts = chrono::NaiveDate::from_ymd_opt(2025, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, second)
                .unwrap();
            writer
                .create_backup_at(source.path(), &config.backup_dir, ts)
                .unwrap();
        }
        fs::write(volume.path().join("state.txt"), "current").unwrap();

        Setup {
            root,
            volume,
            config,
        }
    }

    fn docker(volume: &Path) -> FakeRunner {
        let volume = volume.to_path_buf();
        FakeRunner::new(move |cmd, _| match cmd {
            "docker volume inspect app-data" => ok(&volume_json("app-data", &volume)),
            "docker container inspect app" => ok(&container_json(false, None)),
            _ => ok(""),
        })
    }

    #[test]
    fn restore_picks_most_recent_first_and_needs_yes() {
        let setup = setup();
        let runner = docker(setup.volume.path());
        let sleeper = RecordingSleep::default();
        let ctx = Context {
            config: &setup.config,
            runner: &runner,
            sleeper: &sleeper,
            invoking_user: None,
        };
        let config_path = setup.root.path().join("config.toml");

        // first entry is the newest backup, then refuse
        let mut wizard = Wizard::new(&ctx, ScriptedPrompter::new(["1", "no"]), &config_path, Path::new("/bin/vb"));
        assert_eq!(wizard.restore(None, None).unwrap(), RestoreState::Cancelled);
        assert_eq!(fs::read_to_string(setup.volume.path().join("state.txt")).unwrap(), "current");
        assert!(wizard.prompter.shown("nothing was changed"));

        let mut wizard = Wizard::new(&ctx, ScriptedPrompter::new(["1", "YES"]), &config_path, Path::new("/bin/vb"));
        assert_eq!(wizard.restore(None, None).unwrap(), RestoreState::Done);
        assert_eq!(fs::read_to_string(setup.volume.path().join("state.txt")).unwrap(), "new");
    }

    #[test]
    fn out_of_range_backup_choice_is_invalid() {
        let setup = setup();
        let runner = docker(setup.volume.path());
        let sleeper = RecordingSleep::default();
        let ctx = Context {
            config: &setup.config,
            runner: &runner,
            sleeper: &sleeper,
            invoking_user: None,
        };

        let mut wizard = Wizard::new(&ctx, ScriptedPrompter::new(["3"]), Path::new("/nonexistent"), Path::new("/bin/vb"));
        assert!(matches!(wizard.restore(None, None), Err(Error::InvalidInput(_))));
        assert_eq!(fs::read_to_string(setup.volume.path().join("state.txt")).unwrap(), "current");
        assert_eq!(runner.count("docker stop"), 0);
    }

    #[test]
    fn configure_remote_saves_share() {
        let setup = setup();
        let mut config = setup.config.clone();
        config.remote.credentials_file = setup.root.path().join("smb-credentials");
        config.remote.mount_point = setup.root.path().join("mnt");
        let runner = FakeRunner::succeeding();
        let sleeper = RecordingSleep::default();
        let ctx = Context {
            config: &config,
            runner: &runner,
            sleeper: &sleeper,
            invoking_user: None,
        };
        let config_path = setup.root.path().join("config.toml");

        let prompter = ScriptedPrompter::new([r"\\nas\backup", "backup", "secret", ""]);
        let mut wizard = Wizard::new(&ctx, prompter, &config_path, Path::new("/bin/vb"));
        wizard.configure_remote().unwrap();

        let saved = Config::load_or_init(&config_path).unwrap();
        assert_eq!(saved.remote.address.as_ref().unwrap().as_str(), "//nas/backup");
        let credentials = Credentials::read(&config.remote.credentials_file).unwrap();
        assert_eq!(credentials.username, "backup");
        assert_eq!(credentials.domain, None);
        assert_eq!(wizard.share.as_ref().unwrap().as_str(), "//nas/backup");
        assert!(!config.remote.mount_point.exists());
        assert!(!setup.root.path().join("smb-credentials.new").exists());
    }

    #[test]
    fn rejected_login_keeps_previous_credentials() {
        let setup = setup();
        let mut config = setup.config.clone();
        config.remote.credentials_file = setup.root.path().join("smb-credentials");
        config.remote.mount_point = setup.root.path().join("mnt");
        let working = Credentials::parse("username=backup\npassword=secret").unwrap();
        working.write(&config.remote.credentials_file).unwrap();

        let runner = FakeRunner::new(|cmd, _| {
            if cmd.starts_with("mount.cifs") {
                fail("mount error(13): Permission denied")
            } else {
                ok("")
            }
        });
        let sleeper = RecordingSleep::default();
        let ctx = Context {
            config: &config,
            runner: &runner,
            sleeper: &sleeper,
            invoking_user: None,
        };
        let config_path = setup.root.path().join("config.toml");

        let prompter = ScriptedPrompter::new(["//nas/backup", "backup", "typo", ""]);
        let mut wizard = Wizard::new(&ctx, prompter, &config_path, Path::new("/bin/vb"));
        let err = wizard.configure_remote().unwrap_err();

        assert!(matches!(err, Error::RemoteAccessFailed { .. }));
        assert!(runner.calls()[0].contains("smb-credentials.new"));
        assert_eq!(Credentials::read(&config.remote.credentials_file).unwrap(), working);
        assert!(!setup.root.path().join("smb-credentials.new").exists());
        assert!(!config_path.exists());
        assert_eq!(wizard.share, None);
    }

    #[test]
    fn malformed_share_address_is_rejected() {
        let setup = setup();
        let runner = FakeRunner::succeeding();
        let sleeper = RecordingSleep::default();
        let ctx = Context {
            config: &setup.config,
            runner: &runner,
            sleeper: &sleeper,
            invoking_user: None,
        };

        let prompter = ScriptedPrompter::new(["nas/backup"]);
        let mut wizard = Wizard::new(&ctx, prompter, Path::new("/nonexistent"), Path::new("/bin/vb"));
        assert!(matches!(wizard.configure_remote(), Err(Error::InvalidInput(_))));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn menu_exit() {
        let setup = setup();
        let runner = FakeRunner::succeeding();
        let sleeper = RecordingSleep::default();
        let ctx = Context {
            config: &setup.config,
            runner: &runner,
            sleeper: &sleeper,
            invoking_user: None,
        };

        let mut wizard = Wizard::new(&ctx, ScriptedPrompter::new(["7"]), Path::new("/x"), Path::new("/bin/vb"));
        wizard.run().unwrap();
        assert!(wizard.prompter.shown("Restore a backup"));
        assert!(runner.calls().is_empty());
    }
}
