//! Resolves a server key to an MCP server [`Config`]. The core only ever
//! reads `cmd` / `share_process` / `key`; where the value came from (a YAML
//! file, a remote API) is this crate's concern, not the core's.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use mr_types::{RouterError, RouterResult};
use serde::Deserialize;

/// Immutable once handed to the core.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    pub cmd: String,
    #[serde(default, rename = "share_process")]
    pub share_process: bool,
    #[serde(default)]
    pub key: String,
}

/// Resolves a server key to its `Config`, or `None` if it isn't known.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn get_config(&self, key: &str) -> RouterResult<Option<Config>>;
}

#[derive(Debug, Deserialize)]
struct FileLayout {
    #[serde(default)]
    mcp_servers: HashMap<String, FileEntry>,
    #[serde(default)]
    remote_api: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    cmd: String,
    #[serde(default)]
    share_process: bool,
}

/// Loads `mcp_servers.<key>` from a YAML file (mirroring the original's
/// `mapstructure:"mcp_server_configs.<key>"` viper key), falling back to a
/// remote HTTP lookup when the key is absent locally and `remote_api` is
/// configured.
pub struct FileConfigProvider {
    servers: HashMap<String, FileEntry>,
    remote_api: Option<String>,
    http: reqwest::Client,
}

impl FileConfigProvider {
    pub fn load(path: impl AsRef<Path>) -> RouterResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| RouterError::Config(format!("reading {}: {e}", path.as_ref().display())))?;
        let layout: FileLayout = serde_yaml::from_str(&text)
            .map_err(|e| RouterError::Config(format!("parsing {}: {e}", path.as_ref().display())))?;
        Ok(Self {
            servers: layout.mcp_servers,
            remote_api: layout.remote_api,
            http: reqwest::Client::new(),
        })
    }

    async fn fetch_remote(&self, key: &str) -> RouterResult<Option<Config>> {
        let Some(url) = &self.remote_api else {
            return Ok(None);
        };
        let resp = self
            .http
            .post(url)
            .json(&serde_json::json!({ "server_key": key }))
            .send()
            .await
            .map_err(|e| RouterError::Config(format!("remote config lookup for {key}: {e}")))?;
        if !resp.status().is_success() {
            tracing::warn!(key, status = %resp.status(), "remote config lookup failed");
            return Ok(None);
        }
        let body: RemoteResponse = resp
            .json()
            .await
            .map_err(|e| RouterError::Config(format!("decoding remote config for {key}: {e}")))?;
        Ok(body.data.map(|d| Config {
            cmd: d.server_command,
            share_process: d.share_process,
            key: key.to_string(),
        }))
    }
}

#[derive(Debug, Deserialize)]
struct RemoteResponse {
    data: Option<RemoteData>,
}

#[derive(Debug, Deserialize)]
struct RemoteData {
    server_command: String,
    #[serde(default)]
    share_process: bool,
}

#[async_trait]
impl ConfigProvider for FileConfigProvider {
    async fn get_config(&self, key: &str) -> RouterResult<Option<Config>> {
        if let Some(entry) = self.servers.get(key) {
            return Ok(Some(Config {
                cmd: entry.cmd.clone(),
                share_process: entry.share_process,
                key: key.to_string(),
            }));
        }
        self.fetch_remote(key).await
    }
}
