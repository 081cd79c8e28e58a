//! Execution of the external tools (`docker`, `mount.cifs`, `chown`, `crontab`, ...).
//!
//! Everything outside of this crate is reached through a [CommandRunner], so the
//! flows can be exercised against a scripted runner in tests.

use std::io::{self, Write};
use std::process::{Command, Stdio};

use derive_more::{Display, Error};

#[cfg(test)]
pub(crate) mod fake;

/// Captured result of an external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `-1` if terminated by a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Turns a non-zero exit status into [CommandError::Failed].
    pub fn check(self, command: &str) -> Result<Self, CommandError> {
        if self.success() {
            Ok(self)
        } else {
            Err(CommandError::Failed {
                command: command.to_string(),
                status: self.status,
                stderr: self.stderr.trim_end().to_string(),
            })
        }
    }
}

#[derive(Debug, Display, Error)]
/// Errors on running an external command.
pub enum CommandError {
    /// The program couldn't be spawned at all.
    #[display("Running `{command}` failed: {source}")]
    NotRun { command: String, source: io::Error },
    /// The program exited unsuccessfully.
    #[display("`{command}` exited with status {status}: {stderr}")]
    Failed {
        command: String,
        status: i32,
        stderr: String,
    },
}

/// Blocking execution of external programs.
pub trait CommandRunner {
    /// Runs `program` with `args` and captures its output.
    ///
    /// A non-zero exit status is *not* an error here, see [CommandOutput::check].
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError>;

    /// Like [run](Self::run) but feeds `input` to the standard input of the program.
    fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        input: &str,
    ) -> Result<CommandOutput, CommandError>;

    /// Runs the command and fails on a non-zero exit status.
    fn run_checked(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        self.run(program, args)?.check(&command_line(program, args))
    }
}

/// Renders the command for log and error messages.
pub fn command_line(program: &str, args: &[&str]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    line
}

/// [CommandRunner] spawning real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    fn execute(
        &self,
        program: &str,
        args: &[&str],
        input: Option<&str>,
    ) -> Result<CommandOutput, CommandError> {
        let command = command_line(program, args);
        log::trace!(target: "process", "Running: {command}");

        let not_run = |source| CommandError::NotRun {
            command: command.clone(),
            source,
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = cmd.spawn().map_err(not_run)?;
        if let Some(input) = input {
            // dropping stdin closes the pipe so the child sees EOF
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(input.as_bytes()).map_err(not_run)?;
            }
        }
        let output = child.wait_with_output().map_err(not_run)?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        // relay stderr of successful commands, failures are reported by the caller
        if output.status.success() && !stderr.trim().is_empty() {
            log::warn!(target: "process", "{program}: {}", stderr.trim_end());
        }

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout,
            stderr,
        })
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        self.execute(program, args, None)
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        input: &str,
    ) -> Result<CommandOutput, CommandError> {
        self.execute(program, args, Some(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_reports_failed_command() {
        let output = CommandOutput {
            status: 3,
            stdout: String::new(),
            stderr: "boom\n".into(),
        };

        let err = output.check("docker start app").unwrap_err();
        assert_eq!(
            err.to_string(),
            "`docker start app` exited with status 3: boom"
        );
    }

    #[test]
    fn system_runner_captures_output_and_status() {
        let output = SystemRunner.run("sh", &["-c", "echo hi; exit 4"]).unwrap();
        assert_eq!(output.stdout, "hi\n");
        assert_eq!(output.status, 4);
    }

    #[test]
    fn system_runner_feeds_stdin() {
        let output = SystemRunner.run_with_input("cat", &[], "table\n").unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "table\n");
    }

    #[test]
    fn missing_program_is_not_run() {
        let err = SystemRunner
            .run("definitely-not-a-real-program-xyz", &[])
            .unwrap_err();
        assert!(matches!(err, CommandError::NotRun { .. }));
    }
}
