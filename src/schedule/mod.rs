//! Registration of unattended backups in the user's crontab.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::ValueEnum;
use derive_more::{Display, Error};

use crate::process::CommandRunner;

/// Command line flag of the unattended backup entry point.
pub const AUTO_BACKUP_FLAG: &str = "--auto-backup";

/// How often the unattended backup runs. Every run starts at midnight.
#[derive(Copy, Clone, ValueEnum, Debug, Display, PartialEq, Eq)]
pub enum Frequency {
    /// Every day.
    #[display("daily")]
    Daily,
    /// Every Sunday.
    #[display("weekly")]
    Weekly,
    /// On the first of every month.
    #[display("monthly")]
    Monthly,
}

impl Frequency {
    pub fn cron_expression(self) -> &'static str {
        match self {
            Frequency::Daily => "0 0 * * *",
            Frequency::Weekly => "0 0 * * 0",
            Frequency::Monthly => "0 0 1 * *",
        }
    }
}

/// Frequency is unknown.
#[derive(Debug, Display, Error)]
#[display("Frequency is unknown: {_0}")]
pub struct UnknownFrequency(#[error(ignore)] String);

impl FromStr for Frequency {
    type Err = UnknownFrequency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(UnknownFrequency(other.to_string())),
        }
    }
}

/// A single line of the crontab.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{cron_expression} {invocation_command}")]
pub struct ScheduleEntry {
    pub cron_expression: String,
    pub invocation_command: String,
}

/// Characters cron or the shell would interpret inside the quoted command.
const UNSAFE_CHARS: [char; 6] = ['"', '%', '$', '`', '\\', '\n'];

impl ScheduleEntry {
    /// `<expr> <script> --auto-backup "<destination>"`
    ///
    /// Paths containing `"`, `%`, `$`, `` ` ``, `\` or a line break are rejected:
    /// cron turns `%` into a line break and the shell expands the others.
    /// The script path must not contain whitespace either.
    pub fn auto_backup(
        frequency: Frequency,
        script: &Path,
        destination: &str,
    ) -> crate::Result<Self> {
        let script = script.to_string_lossy();
        // the script path is not quoted
        let unusable = |value: &str, quoted: bool| {
            value.contains(UNSAFE_CHARS) || (!quoted && value.contains(char::is_whitespace))
        };
        if unusable(&script, false) || unusable(destination, true) {
            return Err(crate::Error::invalid_input(format!(
                "'{script}' with destination '{destination}' can't be used in a crontab entry"
            )));
        }

        Ok(Self {
            cron_expression: frequency.cron_expression().to_string(),
            invocation_command: format!("{script} {AUTO_BACKUP_FLAG} \"{destination}\""),
        })
    }
}

/// Absolute path of the running executable, the command cron invokes.
pub fn current_script() -> crate::Result<PathBuf> {
    let script = std::env::current_exe()
        .map_err(|e| crate::Error::precondition(format!("locating the running executable failed: {e}")))?;
    Ok(std::path::absolute(script)?)
}

/// Reads the current crontab, an absent crontab is empty.
pub fn read_crontab(runner: &dyn CommandRunner) -> crate::Result<String> {
    let output = runner.run("crontab", &["-l"])?;
    if !output.success() && output.stderr.contains("no crontab for") {
        // before the first entry
        log::debug!(target: "schedule", "No existing crontab: {}", output.stderr.trim());
        return Ok(String::new());
    }

    // anything else would make the rewrite drop the existing entries
    Ok(output.check("crontab -l")?.stdout)
}

/// Appends an unattended backup of `destination` to the crontab.
///
/// Existing entries are kept as they are, registering the same schedule twice
/// results in two entries.
pub fn register_periodic(
    runner: &dyn CommandRunner,
    frequency: Frequency,
    script: &Path,
    destination: &str,
) -> crate::Result<ScheduleEntry> {
    let entry = ScheduleEntry::auto_backup(frequency, script, destination)?;

    let mut table = read_crontab(runner)?;
    if !table.is_empty() && !table.ends_with('\n') {
        table.push('\n');
    }
    table.push_str(&entry.to_string());
    table.push('\n');

    runner
        .run_with_input("crontab", &["-"], &table)?
        .check("crontab -")?;
    log::info!(target: "schedule", "Scheduled {frequency} backup: {entry}");

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::process::fake::{fail, ok, FakeRunner};
    use crate::process::CommandError;

    /// Runner keeping the crontab in memory, starting with `initial` ([None]: no crontab).
    fn crontab_runner(initial: Option<&str>) -> (FakeRunner, Rc<RefCell<Option<String>>>) {
        let table = Rc::new(RefCell::new(initial.map(str::to_string)));
        let runner = {
            let table = table.clone();
            FakeRunner::new(move |cmd, input| match (cmd, input) {
                ("crontab -l", _) => match &*table.borrow() {
                    Some(t) => ok(t),
                    None => fail("no crontab for backup"),
                },
                ("crontab -", Some(input)) => {
                    *table.borrow_mut() = Some(input.to_string());
                    ok("")
                }
                _ => fail("unexpected command"),
            })
        };
        (runner, table)
    }

    #[test]
    fn frequencies_map_to_midnight_schedules() {
        assert_eq!(Frequency::Daily.cron_expression(), "0 0 * * *");
        assert_eq!(Frequency::Weekly.cron_expression(), "0 0 * * 0");
        assert_eq!(Frequency::Monthly.cron_expression(), "0 0 1 * *");
        assert_eq!("Weekly".parse::<Frequency>().unwrap(), Frequency::Weekly);
        assert!("hourly".parse::<Frequency>().is_err());
    }

    #[test]
    fn running_executable_is_absolute() {
        assert!(current_script().unwrap().is_absolute());
    }

    #[test]
    fn appends_to_existing_table() {
        let (runner, table) = crontab_runner(Some("30 2 * * * /usr/bin/certbot renew"));

        let entry = register_periodic(
            &runner,
            Frequency::Daily,
            Path::new("/usr/local/bin/volume-backup"),
            "/var/backups/open-webui",
        )
        .unwrap();

        assert_eq!(
            entry.to_string(),
            "0 0 * * * /usr/local/bin/volume-backup --auto-backup \"/var/backups/open-webui\""
        );
        assert_eq!(
            table.borrow().as_deref(),
            Some(
                "30 2 * * * /usr/bin/certbot renew\n\
                 0 0 * * * /usr/local/bin/volume-backup --auto-backup \"/var/backups/open-webui\"\n"
            )
        );
    }

    #[test]
    fn registering_twice_duplicates_the_entry() {
        let (runner, table) = crontab_runner(None);
        let script = Path::new("/usr/local/bin/volume-backup");

        register_periodic(&runner, Frequency::Weekly, script, "//nas/backup").unwrap();
        register_periodic(&runner, Frequency::Weekly, script, "//nas/backup").unwrap();

        let table = table.borrow().clone().unwrap();
        let line = "0 0 * * 0 /usr/local/bin/volume-backup --auto-backup \"//nas/backup\"";
        assert_eq!(table.lines().filter(|l| *l == line).count(), 2);
        assert_eq!(table.lines().count(), 2);
    }

    #[test]
    fn failing_crontab_write_is_an_error() {
        let runner = FakeRunner::new(|cmd, _| match cmd {
            "crontab -l" => ok(""),
            _ => fail("crontab: permission denied"),
        });

        assert!(register_periodic(&runner, Frequency::Monthly, Path::new("/bin/vb"), "/b").is_err());
    }

    #[test]
    fn unreadable_crontab_is_not_overwritten() {
        let table = Rc::new(RefCell::new("30 2 * * * /usr/bin/certbot renew\n".to_string()));
        let runner = {
            let table = table.clone();
            FakeRunner::new(move |cmd, input| match (cmd, input) {
                ("crontab -l", _) => fail("crontab: error reading /var/spool/cron/root: Permission denied"),
                ("crontab -", Some(input)) => {
                    *table.borrow_mut() = input.to_string();
                    ok("")
                }
                _ => fail("unexpected command"),
            })
        };

        let err = register_periodic(&runner, Frequency::Daily, Path::new("/usr/local/bin/vb"), "/b")
            .unwrap_err();

        assert!(matches!(err, crate::Error::Command(CommandError::Failed { .. })));
        assert_eq!(*table.borrow(), "30 2 * * * /usr/bin/certbot renew\n");
        assert_eq!(runner.calls(), ["crontab -l"]);
    }

    #[test]
    fn destinations_cron_would_mangle_are_rejected() {
        let (runner, table) = crontab_runner(None);
        let script = Path::new("/usr/local/bin/volume-backup");

        for destination in ["/srv/100%", "/srv/\"x\"", "/srv/$HOME", "/srv/`id`", "/srv/a\nb"] {
            let err = register_periodic(&runner, Frequency::Daily, script, destination).unwrap_err();
            assert!(matches!(err, crate::Error::InvalidInput(_)), "{destination:?}");
        }
        let err = register_periodic(&runner, Frequency::Daily, Path::new("/opt/my tools/vb"), "/b")
            .unwrap_err();
        assert!(matches!(err, crate::Error::InvalidInput(_)));
        assert!(runner.calls().is_empty());
        assert_eq!(*table.borrow(), None);

        // spaces are fine inside the quoted destination
        let entry = register_periodic(&runner, Frequency::Daily, script, "/srv/open webui").unwrap();
        assert!(entry.to_string().ends_with("--auto-backup \"/srv/open webui\""));
    }
}
