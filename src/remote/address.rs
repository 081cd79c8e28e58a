use std::str::FromStr;
use std::sync::LazyLock;

use derive_more::Display;
use regex::Regex;

use crate::Error;

static SHARE_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^//(?<server>[^/\s]+)/(?<share>[^/]+)(?<path>/.*)?$").expect("regex should be valid")
});

/// Address of an SMB/CIFS share: `//server/share[/sub/path]`.
#[derive(Debug, Clone, PartialEq, Eq, Display, serde::Serialize, serde::Deserialize)]
#[display("{address}")]
#[serde(try_from = "String", into = "String")]
pub struct ShareAddress {
    address: String,
    server_len: usize,
}

impl ShareAddress {
    /// Host name or IP of the file server.
    pub fn server(&self) -> &str {
        &self.address[2..2 + self.server_len]
    }

    pub fn as_str(&self) -> &str {
        &self.address
    }
}

impl FromStr for ShareAddress {
    type Err = Error;

    /// Accepts the Windows notation `\\server\share` as well.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('\\', "/");
        let normalized = normalized.trim_end_matches('/');

        let captures = SHARE_ADDRESS.captures(normalized).ok_or_else(|| {
            Error::invalid_input(format!(
                "'{s}' is not a share address, expected //server/share"
            ))
        })?;
        let server_len = captures.name("server").map_or(0, |m| m.len());

        Ok(Self {
            address: normalized.to_string(),
            server_len,
        })
    }
}

impl TryFrom<String> for ShareAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ShareAddress> for String {
    fn from(address: ShareAddress) -> Self {
        address.address
    }
}
