//! Runtime configuration (spec.md §6 "Environment").
//!
//! Mirrors the builder-then-construct shape the rest of this workspace
//! uses: a [`Config`] with sensible defaults, overridable field-by-field
//! through [`ConfigBuilder`], plus a `key=value` file parser for the single
//! config file spec.md names.

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

/// Default listening port for the peer protocol (spec.md §6).
pub const DEFAULT_LISTEN_PORT: u16 = 9567;
/// Default port the JSON-RPC surface listens on.
pub const DEFAULT_RPC_PORT: u16 = 9568;
pub const DEFAULT_MAX_PEERS: usize = 125;
pub const DEFAULT_MIN_PEERS: usize = 1;

/// Runtime configuration shared across the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub datadir: PathBuf,
    pub listen_port: u16,
    pub rpc_port: u16,
    pub max_peers: usize,
    pub min_peers: usize,
    pub seed_nodes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        let datadir = dirs_home().join(".thunderbolt");
        Self {
            datadir,
            listen_port: DEFAULT_LISTEN_PORT,
            rpc_port: DEFAULT_RPC_PORT,
            max_peers: DEFAULT_MAX_PEERS,
            min_peers: DEFAULT_MIN_PEERS,
            seed_nodes: Vec::new(),
        }
    }
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Fluent builder for [`Config`].
pub struct ConfigBuilder {
    inner: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self { inner: Config::default() }
    }

    pub fn datadir(mut self, path: impl Into<PathBuf>) -> Self {
        self.inner.datadir = path.into();
        self
    }

    pub fn listen_port(mut self, port: u16) -> Self {
        self.inner.listen_port = port;
        self
    }

    pub fn rpc_port(mut self, port: u16) -> Self {
        self.inner.rpc_port = port;
        self
    }

    pub fn max_peers(mut self, n: usize) -> Self {
        self.inner.max_peers = n;
        self
    }

    pub fn min_peers(mut self, n: usize) -> Self {
        self.inner.min_peers = n;
        self
    }

    pub fn seed_nodes(mut self, nodes: Vec<String>) -> Self {
        self.inner.seed_nodes = nodes;
        self
    }

    /// Applies every recognized `key=value` line in `text`, overriding
    /// whatever was set so far. Unrecognized keys are ignored (matching
    /// spec.md §6's "recognized keys" framing — a config file predating a
    /// new key must keep loading).
    pub fn apply_file(mut self, text: &str) -> Result<Self, ConfigError> {
        for (key, value) in parse_kv(text) {
            self = self.apply_one(&key, &value)?;
        }
        Ok(self)
    }

    fn apply_one(self, key: &str, value: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidValue { key: key.to_string(), value: value.to_string() };
        Ok(match key {
            "datadir" => self.datadir(value),
            "listenPort" => self.listen_port(value.parse().map_err(|_| invalid())?),
            "rpcPort" => self.rpc_port(value.parse().map_err(|_| invalid())?),
            "maxPeers" => self.max_peers(value.parse().map_err(|_| invalid())?),
            "minPeers" => self.min_peers(value.parse().map_err(|_| invalid())?),
            "seedNodes" => self.seed_nodes(value.split(',').map(|s| s.trim().to_string()).collect()),
            _ => self,
        })
    }

    pub fn finish(self) -> Config {
        self.inner
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_kv(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}
