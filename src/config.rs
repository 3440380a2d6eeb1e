use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared secret checked on every /block request. Must be non-empty.
    #[serde(default)]
    pub api_key: String,

    #[serde(default)]
    pub block_type: BlockType,

    /// Directory holding the blocklist file.
    #[serde(default = "default_blocklist_root")]
    pub blocklist_root: PathBuf,

    /// Comment header re-emitted at the top of the file and every rendering.
    /// Newlines split it into multiple comment lines.
    #[serde(default = "default_blocklist_header")]
    pub blocklist_header: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// How a submitted URL is reduced to a blocklist entry.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    /// Keep only the host component of the URL.
    Hostname,
    /// Keep the submitted string as-is, trimmed. Unrecognized config
    /// values also land here.
    #[serde(other)]
    Raw,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_blocklist_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_blocklist_header() -> String {
    "Personal blocklist served by blockdrop\nOne entry per line; lines starting with '#' are ignored".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: String::new(),
            block_type: BlockType::default(),
            blocklist_root: default_blocklist_root(),
            blocklist_header: default_blocklist_header(),
            log_level: default_log_level(),
        }
    }
}

impl Default for BlockType {
    fn default() -> Self {
        BlockType::Hostname
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .await
            .context("Failed to read config file")?;
        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Rejects configurations that would leave /block open to anyone.
    pub fn ensure_api_key(&self) -> Result<()> {
        if self.api_key.is_empty() {
            bail!("api_key is not set; add api_key = \"<secret>\" to the config file");
        }
        Ok(())
    }
}
