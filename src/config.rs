use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Environment variable naming an optional YAML configuration file.
pub const CONFIG_ENV: &str = "QUAY_CONFIG";
/// Environment variable overriding `server.listen_addr`.
pub const LISTEN_ENV: &str = "LISTEN";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub static_files: StaticFilesConfig,
}

/// Process limits and the listen address.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Number of worker threads.
    pub workers: usize,
    /// Maximum number of read-ready connections waiting for a worker.
    pub queue_capacity: usize,
    /// Maximum number of simultaneously open client connections.
    pub max_connections: usize,
    /// Events fetched per `epoll_wait` call.
    pub max_events: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            workers: 8,
            queue_capacity: 10_000,
            max_connections: 65_535,
            max_events: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Directory served as `/`.
    pub root: PathBuf,
    /// File served for directory requests.
    pub index: String,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./public"),
            index: "index.html".to_string(),
        }
    }
}

impl Config {
    /// Loads the file named by `QUAY_CONFIG` (defaults when unset), then
    /// applies the `LISTEN` override.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };

        if let Ok(addr) = std::env::var(LISTEN_ENV) {
            cfg.server.listen_addr = addr;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(raw)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let server = &self.server;
        anyhow::ensure!(server.workers > 0, "server.workers must be at least 1");
        anyhow::ensure!(
            server.queue_capacity > 0,
            "server.queue_capacity must be at least 1"
        );
        anyhow::ensure!(
            server.max_connections > 0,
            "server.max_connections must be at least 1"
        );
        anyhow::ensure!(server.max_events > 0, "server.max_events must be at least 1");
        anyhow::ensure!(
            !self.static_files.index.is_empty(),
            "static_files.index must not be empty"
        );
        Ok(())
    }
}
