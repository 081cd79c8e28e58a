//! Scripted [CommandRunner] for tests.

use std::cell::RefCell;

use super::{command_line, CommandError, CommandOutput, CommandRunner};

type Handler = dyn FnMut(&str, Option<&str>) -> CommandOutput;

/// Answers every command with the output of a handler closure and records the
/// command lines it has seen.
pub(crate) struct FakeRunner {
    handler: RefCell<Box<Handler>>,
    calls: RefCell<Vec<String>>,
}

impl FakeRunner {
    pub(crate) fn new(handler: impl FnMut(&str, Option<&str>) -> CommandOutput + 'static) -> Self {
        Self {
            handler: RefCell::new(Box::new(handler)),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Every command succeeds with empty output.
    pub(crate) fn succeeding() -> Self {
        Self::new(|_, _| ok(""))
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Number of recorded calls starting with `prefix`.
    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn answer(&self, program: &str, args: &[&str], input: Option<&str>) -> CommandOutput {
        let line = command_line(program, args);
        self.calls.borrow_mut().push(line.clone());
        let mut handler = self.handler.borrow_mut();
        (&mut **handler)(&line, input)
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, CommandError> {
        Ok(self.answer(program, args, None))
    }

    fn run_with_input(
        &self,
        program: &str,
        args: &[&str],
        input: &str,
    ) -> Result<CommandOutput, CommandError> {
        Ok(self.answer(program, args, Some(input)))
    }
}

pub(crate) fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        status: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub(crate) fn fail(stderr: &str) -> CommandOutput {
    CommandOutput {
        status: 1,
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// `docker volume inspect` JSON for a volume mounted at `mountpoint`.
pub(crate) fn volume_json(name: &str, mountpoint: &std::path::Path) -> String {
    serde_json::json!([{
        "Name": name,
        "Driver": "local",
        "Mountpoint": mountpoint,
    }])
    .to_string()
}

/// `docker inspect` JSON of a container.
pub(crate) fn container_json(running: bool, health: Option<&str>) -> String {
    let mut state = serde_json::json!({
        "Status": if running { "running" } else { "exited" },
        "Running": running,
    });
    if let Some(health) = health {
        state["Health"] = serde_json::json!({ "Status": health });
    }
    serde_json::json!([{ "State": state }]).to_string()
}
