use std::path::Path;
use std::str::FromStr;

use derive_more::Display;

use crate::process::CommandRunner;
use crate::Error;

/// Numeric `uid:gid` pair files are handed over to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, serde::Serialize, serde::Deserialize)]
#[display("{uid}:{gid}")]
#[serde(try_from = "String", into = "String")]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

impl Owner {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    /// `chown <uid>:<gid> <path>`, recursing into directories if `recursive`.
    pub fn apply(
        &self,
        runner: &dyn CommandRunner,
        path: &Path,
        recursive: bool,
    ) -> crate::Result<()> {
        let owner = self.to_string();
        let path = path.to_string_lossy();
        if recursive {
            runner.run_checked("chown", &["-R", owner.as_str(), &*path])?;
        } else {
            runner.run_checked("chown", &[owner.as_str(), &*path])?;
        }
        Ok(())
    }
}

impl FromStr for Owner {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::invalid_input(format!("owner must be <uid>:<gid>, got '{s}'"));

        let (uid, gid) = s.trim().split_once(':').ok_or_else(invalid)?;
        let uid = uid.parse().map_err(|_| invalid())?;
        let gid = gid.parse().map_err(|_| invalid())?;

        Ok(Self { uid, gid })
    }
}

impl TryFrom<String> for Owner {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Owner> for String {
    fn from(owner: Owner) -> Self {
        owner.to_string()
    }
}
