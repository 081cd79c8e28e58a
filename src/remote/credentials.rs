use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::Path;

use crate::Error;

/// Login for the share, stored as a `mount.cifs` credentials file:
///
/// ```text
/// username=backup
/// password=secret
/// domain=WORKGROUP
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("domain", &self.domain)
            .finish()
    }
}

impl Credentials {
    pub fn parse(contents: &str) -> crate::Result<Self> {
        let mut username = None;
        let mut password = None;
        let mut domain = None;

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                log::warn!(target: "remote", "Ignoring malformed credentials line");
                continue;
            };
            match key.trim() {
                "username" | "user" => username = Some(value.to_string()),
                "password" | "pass" => password = Some(value.to_string()),
                "domain" | "dom" if !value.is_empty() => domain = Some(value.to_string()),
                _ => {}
            }
        }

        Ok(Self {
            username: username
                .ok_or_else(|| Error::invalid_input("credentials lack a username"))?,
            password: password
                .ok_or_else(|| Error::invalid_input("credentials lack a password"))?,
            domain,
        })
    }

    pub fn to_file_contents(&self) -> String {
        let mut contents = format!("username={}\npassword={}\n", self.username, self.password);
        if let Some(domain) = &self.domain {
            contents.push_str(&format!("domain={domain}\n"));
        }
        contents
    }

    /// Writes the credentials readable by the owner only.
    pub fn write(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        // mode only applies to newly created files
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
        file.write_all(self.to_file_contents().as_bytes())?;
        file.sync_all()?;

        log::info!(target: "remote", "Saved share credentials to {}", path.display());
        Ok(())
    }

    pub fn read(path: &Path) -> crate::Result<Self> {
        let metadata = fs::metadata(path)?;
        if metadata.permissions().mode() & 0o077 != 0 {
            log::warn!(
                target: "remote",
                "Credentials file {} is readable by others, it should have mode 600",
                path.display()
            );
        }
        Self::parse(&fs::read_to_string(path)?)
    }
}
