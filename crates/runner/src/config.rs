use std::path::Path;

use anyhow::{Context, anyhow};
use ftpbrowse::ServerProfile;
use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_CONFIG_FILE: &str = "/etc/ftpbrowser/server.json";

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Config {
    #[serde(default)]
    pub(crate) ftp_servers: Vec<ServerProfile>,
}

/// What `servers` prints for each entry. Never carries the password.
#[derive(Debug, Serialize)]
pub(crate) struct ServerSummary<'a> {
    pub(crate) id: usize,
    pub(crate) name: String,
    pub(crate) host: &'a str,
    pub(crate) port: u16,
    pub(crate) username: &'a str,
    pub(crate) root_path: &'a str,
}

impl Config {
    pub(crate) async fn load(path: &Path) -> anyhow::Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub(crate) fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(content)?;
        tracing::debug!(servers = config.ftp_servers.len(), "config loaded");
        Ok(config)
    }

    pub(crate) fn server(&self, id: usize) -> anyhow::Result<&ServerProfile> {
        self.ftp_servers
            .get(id)
            .ok_or_else(|| anyhow!("no server with id {id} ({} configured)", self.ftp_servers.len()))
    }

    pub(crate) fn summaries(&self) -> Vec<ServerSummary<'_>> {
        self.ftp_servers
            .iter()
            .enumerate()
            .map(|(id, profile)| ServerSummary {
                id,
                name: profile.display_name(),
                host: &profile.host,
                port: profile.port,
                username: &profile.username,
                root_path: &profile.root_path,
            })
            .collect()
    }
}
