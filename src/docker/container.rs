use serde_json::Value;

use super::Docker;

/// State of a container as far as the backup flows care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// No container with that name exists.
    Absent,
    Stopped,
    Running,
}

/// Health as reported by the container's healthcheck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerHealth {
    Healthy,
    Starting,
    Unhealthy,
    /// The image defines no healthcheck, only whether it runs is known.
    NoHealthcheck { running: bool },
}

impl ContainerHealth {
    pub fn is_ready(self) -> bool {
        matches!(
            self,
            ContainerHealth::Healthy | ContainerHealth::NoHealthcheck { running: true }
        )
    }
}

impl Docker<'_> {
    /// The `State` object of `docker container inspect`, [None] if the container doesn't exist.
    fn container_inspect_state(&self, name: &str) -> crate::Result<Option<Value>> {
        let output = self.execute(&["container", "inspect", name])?;
        if !output.success() {
            log::trace!(target: "docker", "container inspect {name}: {}", output.stderr.trim());
            return Ok(None);
        }

        let jsonout: Value = match serde_json::from_str(&output.stdout) {
            Ok(json) => json,
            Err(e) => {
                log::warn!(target: "docker", "Unexpected output of docker container inspect: {e}");
                return Ok(None);
            }
        };

        Ok(jsonout
            .as_array()
            .and_then(|containers| containers.first())
            .and_then(|container| container.get("State"))
            .cloned())
    }

    pub fn container_state(&self, name: &str) -> crate::Result<ContainerState> {
        let state = match self.container_inspect_state(name)? {
            None => ContainerState::Absent,
            Some(state) => {
                if state.get("Running").and_then(Value::as_bool).unwrap_or(false) {
                    ContainerState::Running
                } else {
                    ContainerState::Stopped
                }
            }
        };
        log::debug!(target: "docker", "Container {name} is {state:?}");

        Ok(state)
    }

    pub fn health(&self, name: &str) -> crate::Result<ContainerHealth> {
        let Some(state) = self.container_inspect_state(name)? else {
            return Ok(ContainerHealth::NoHealthcheck { running: false });
        };

        let running = state.get("Running").and_then(Value::as_bool).unwrap_or(false);
        let health = match state
            .get("Health")
            .and_then(|h| h.get("Status"))
            .and_then(Value::as_str)
        {
            Some("healthy") => ContainerHealth::Healthy,
            Some("starting") => ContainerHealth::Starting,
            Some(_) => ContainerHealth::Unhealthy,
            None => ContainerHealth::NoHealthcheck { running },
        };

        Ok(health)
    }

    pub fn stop_container(&self, name: &str) -> crate::Result<()> {
        log::info!(target: "docker", "Stopping container {name}");
        self.execute_checked(&["stop", name])?;
        Ok(())
    }

    pub fn start_container(&self, name: &str) -> crate::Result<()> {
        log::info!(target: "docker", "Starting container {name}");
        self.execute_checked(&["start", name])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::fake::{container_json, fail, ok, FakeRunner};

    #[test]
    fn container_states() {
        let runner = FakeRunner::new(|cmd, _| match cmd {
            "docker container inspect web" => ok(&container_json(true, None)),
            "docker container inspect idle" => ok(&container_json(false, None)),
            _ => fail("Error: No such container"),
        });
        let docker = Docker::new(&runner);

        assert_eq!(docker.container_state("web").unwrap(), ContainerState::Running);
        assert_eq!(docker.container_state("idle").unwrap(), ContainerState::Stopped);
        assert_eq!(docker.container_state("gone").unwrap(), ContainerState::Absent);
    }

    #[test]
    fn health_falls_back_to_running_state() {
        let runner = FakeRunner::new(|cmd, _| match cmd {
            "docker container inspect checked" => ok(&container_json(true, Some("starting"))),
            _ => ok(&container_json(true, None)),
        });
        let docker = Docker::new(&runner);

        let checked = docker.health("checked").unwrap();
        assert_eq!(checked, ContainerHealth::Starting);
        assert!(!checked.is_ready());

        let plain = docker.health("plain").unwrap();
        assert_eq!(plain, ContainerHealth::NoHealthcheck { running: true });
        assert!(plain.is_ready());
    }
}
