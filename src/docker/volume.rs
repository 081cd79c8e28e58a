use std::path::PathBuf;

use serde_json::Value;

use super::Docker;
use crate::Error;

impl Docker<'_> {
    /// Resolves the backing directory of the volume `name`.
    ///
    /// Fails with [Error::VolumeNotFound] if docker doesn't know the volume.
    pub fn volume_mountpoint(&self, name: &str) -> crate::Result<PathBuf> {
        let output = self.execute(&["volume", "inspect", name])?;
        if !output.success() {
            log::debug!(target: "docker", "volume inspect {name}: {}", output.stderr.trim());
            return Err(Error::VolumeNotFound {
                name: name.to_string(),
            });
        }

        let jsonout: Value = serde_json::from_str(&output.stdout).map_err(|e| {
            Error::precondition(format!("unexpected output of docker volume inspect: {e}"))
        })?;

        let mountpoint = jsonout
            .as_array()
            .and_then(|volumes| volumes.first())
            .and_then(|volume| volume.get("Mountpoint"))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::VolumeNotFound {
                name: name.to_string(),
            })?;
        log::trace!(target: "docker", "Volume {name} is mounted at {mountpoint}");

        Ok(PathBuf::from(mountpoint))
    }

    pub fn volume_exists(&self, name: &str) -> crate::Result<bool> {
        match self.volume_mountpoint(name) {
            Ok(_) => Ok(true),
            Err(Error::VolumeNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn create_volume(&self, name: &str) -> crate::Result<()> {
        log::info!(target: "docker", "Creating volume {name}");
        self.execute_checked(&["volume", "create", name])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::process::fake::{fail, ok, volume_json, FakeRunner};

    #[test]
    fn resolves_mountpoint() {
        let runner = FakeRunner::new(|cmd, _| {
            assert_eq!(cmd, "docker volume inspect app-data");
            ok(&volume_json(
                "app-data",
                Path::new("/var/lib/docker/volumes/app-data/_data"),
            ))
        });

        let path = Docker::new(&runner).volume_mountpoint("app-data").unwrap();
        assert_eq!(path, Path::new("/var/lib/docker/volumes/app-data/_data"));
    }

    #[test]
    fn unknown_volume() {
        let runner = FakeRunner::new(|_, _| fail("Error: No such volume: nope"));
        let docker = Docker::new(&runner);

        let err = docker.volume_mountpoint("nope").unwrap_err();
        assert!(matches!(err, Error::VolumeNotFound { ref name } if name == "nope"));
        assert!(!docker.volume_exists("nope").unwrap());
    }
}
