use std::{fmt, time::Duration};

use crate::{ServerProfileBuilder, listing};

pub const DEFAULT_PORT: u16 = 21;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Where and how to reach one FTP server.
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct ServerProfile {
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: Option<String>,
    pub host: String,
    #[cfg_attr(feature = "serde", serde(default = "default_port"))]
    pub port: u16,
    #[cfg_attr(feature = "serde", serde(default))]
    pub username: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub password: String,
    #[cfg_attr(feature = "serde", serde(default = "default_root_path"))]
    pub root_path: String,
    #[cfg_attr(feature = "serde", serde(default = "default_passive"))]
    pub passive: bool,
    #[cfg_attr(
        feature = "serde",
        serde(rename = "timeout", default = "default_timeout_secs")
    )]
    pub timeout_secs: u64,
}

pub(crate) fn default_port() -> u16 {
    DEFAULT_PORT
}

pub(crate) fn default_root_path() -> String {
    "/".to_string()
}

pub(crate) fn default_passive() -> bool {
    true
}

pub(crate) fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ServerProfile {
    pub fn builder(host: impl Into<String>) -> ServerProfileBuilder {
        ServerProfileBuilder::new(host)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    /// Display name, falling back to `host:port`.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}:{}", self.host, self.port),
        }
    }

    /// Resolves a caller-supplied path against `root_path`: empty means the
    /// root path itself, relative paths are joined onto it, absolute paths
    /// are taken as they are.
    pub fn resolve_path(&self, path: &str) -> String {
        let path = path.trim();
        if path.is_empty() {
            listing::normalize_path(&self.root_path)
        } else if path.starts_with('/') {
            listing::normalize_path(path)
        } else {
            listing::join_path(&self.root_path, path)
        }
    }
}

impl fmt::Debug for ServerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerProfile")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"****")
            .field("root_path", &self.root_path)
            .field("passive", &self.passive)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}
