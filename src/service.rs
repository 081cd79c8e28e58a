//! Detection and health of the companion inference service.
//!
//! The service either runs as a container or directly on the host.

use derive_more::Display;

use crate::docker::{ContainerState, Docker};
use crate::process::CommandRunner;
use crate::util::{RetryPolicy, Sleep};
use crate::Error;

/// Where the companion service runs.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    #[display("container")]
    Container,
    #[display("host process")]
    HostProcess,
    #[display("not running")]
    NotRunning,
}

/// Checks for a running container named `container` first, then for a host process.
pub fn detect_mode(
    runner: &dyn CommandRunner,
    container: &str,
    process_name: &str,
) -> crate::Result<ServiceMode> {
    if Docker::new(runner).container_state(container)? == ContainerState::Running {
        return Ok(ServiceMode::Container);
    }

    let mode = if runner.run("pgrep", &["-x", process_name])?.success() {
        ServiceMode::HostProcess
    } else {
        ServiceMode::NotRunning
    };
    log::debug!(target: "service", "{process_name} runs as {mode}");

    Ok(mode)
}

/// Polls the health of `container` until it is ready or `policy` is exhausted.
pub fn wait_until_healthy(
    runner: &dyn CommandRunner,
    sleeper: &dyn Sleep,
    policy: &RetryPolicy,
    container: &str,
) -> crate::Result<()> {
    let docker = Docker::new(runner);
    policy
        .run(sleeper, |attempt| {
            let health = docker.health(container)?;
            log::debug!(target: "service", "{container} health check {attempt}/{}: {health:?}", policy.attempts());
            if health.is_ready() {
                Ok(())
            } else {
                Err(Error::HealthCheckExhausted {
                    service: container.to_string(),
                    attempts: attempt,
                })
            }
        })
        .map_err(|e| match e {
            Error::HealthCheckExhausted { .. } => Error::HealthCheckExhausted {
                service: container.to_string(),
                attempts: policy.attempts(),
            },
            other => other,
        })?;

    log::info!(target: "service", "{container} is healthy");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::process::fake::{container_json, fail, ok, FakeRunner};
    use crate::util::retry::testing::RecordingSleep;

    #[test]
    fn container_takes_precedence() {
        let runner = FakeRunner::new(|cmd, _| match cmd {
            "docker container inspect ollama" => ok(&container_json(true, None)),
            _ => ok(""),
        });
        assert_eq!(
            detect_mode(&runner, "ollama", "ollama").unwrap(),
            ServiceMode::Container
        );
        assert_eq!(runner.count("pgrep"), 0);
    }

    #[test]
    fn falls_back_to_host_process() {
        let host = FakeRunner::new(|cmd, _| match cmd {
            "pgrep -x ollama" => ok("4242\n"),
            _ => fail("Error: No such container: ollama"),
        });
        assert_eq!(
            detect_mode(&host, "ollama", "ollama").unwrap(),
            ServiceMode::HostProcess
        );

        let nothing = FakeRunner::new(|_, _| fail(""));
        assert_eq!(
            detect_mode(&nothing, "ollama", "ollama").unwrap(),
            ServiceMode::NotRunning
        );
    }

    #[test]
    fn waits_for_healthy() {
        let mut checks = 0;
        let runner = FakeRunner::new(move |_, _| {
            checks += 1;
            let status = if checks < 3 { "starting" } else { "healthy" };
            ok(&container_json(true, Some(status)))
        });
        let sleeper = RecordingSleep::default();
        let policy = RetryPolicy::fixed(5, Duration::from_secs(2));

        wait_until_healthy(&runner, &sleeper, &policy, "open-webui").unwrap();
        assert_eq!(sleeper.slept.borrow().len(), 2);
    }

    #[test]
    fn gives_up_after_bounded_checks() {
        let runner = FakeRunner::new(|_, _| ok(&container_json(true, Some("unhealthy"))));
        let sleeper = RecordingSleep::default();
        let policy = RetryPolicy::fixed(4, Duration::from_secs(1));

        let err = wait_until_healthy(&runner, &sleeper, &policy, "open-webui").unwrap_err();
        assert!(matches!(err, Error::HealthCheckExhausted { attempts: 4, .. }));
        assert_eq!(runner.calls().len(), 4);
    }
}
