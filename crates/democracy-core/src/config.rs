//! Configuration system for Democracy.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $DEMOCRACY_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/democracy/config.toml
//!   3. ~/.config/democracy/config.toml
//!
//! [`DemocracyConfig`] is the on-disk form. [`NodeConfig`] is the resolved,
//! immutable runtime form handed to the node at startup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::identity::{generate_short_id, random_weight, IdError};

pub const DEFAULT_SOURCE: &str = "127.0.0.1:12345";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DemocracyConfig {
    pub node: NodeSection,
    pub election: ElectionConfig,
    pub transport: TransportConfig,
    /// Peer addresses (`host:port`) announcements are sent to.
    pub peers: Vec<String>,
    /// Topics this node subscribes to.
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    /// Node id. Empty = generate at startup.
    pub id: String,
    /// Address the datagram socket binds to.
    pub source: String,
    /// Fixed weight. Absent = draw a random weight at startup.
    pub weight: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    /// Poll interval between announcement triggers.
    pub interval_ms: u64,
    /// How long a candidate waits for a higher-ranked announcement.
    pub timeout_ms: u64,
    /// Peers not heard from within this window are dropped.
    pub peer_ttl_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Maximum payload bytes per chunk, before JSON framing.
    pub max_chunk_size: usize,
    /// Receive buffer size. Datagrams larger than this are truncated.
    pub recv_buffer_size: usize,
    /// Poll intervals an incomplete chunk group may go untouched
    /// before it is evicted.
    pub reassembly_windows: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            id: String::new(),
            source: DEFAULT_SOURCE.to_string(),
            weight: None,
        }
    }
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            timeout_ms: 3000,
            peer_ttl_ms: 10_000,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 2,
            recv_buffer_size: 65536,
            reassembly_windows: 3,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("democracy")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid setting {0}: {1}")]
    Invalid(&'static str, String),
    #[error(transparent)]
    Identity(#[from] IdError),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl DemocracyConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            DemocracyConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("DEMOCRACY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&DemocracyConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply DEMOCRACY_* env var overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("DEMOCRACY_NODE__ID") {
            self.node.id = v;
        }
        if let Some(v) = lookup("DEMOCRACY_NODE__SOURCE") {
            self.node.source = v;
        }
        if let Some(v) = lookup("DEMOCRACY_NODE__WEIGHT") {
            if let Ok(w) = v.parse() {
                self.node.weight = Some(w);
            }
        }
        if let Some(v) = lookup("DEMOCRACY_ELECTION__INTERVAL_MS") {
            if let Ok(ms) = v.parse() {
                self.election.interval_ms = ms;
            }
        }
        if let Some(v) = lookup("DEMOCRACY_ELECTION__TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                self.election.timeout_ms = ms;
            }
        }
        if let Some(v) = lookup("DEMOCRACY_TRANSPORT__MAX_CHUNK_SIZE") {
            if let Ok(n) = v.parse() {
                self.transport.max_chunk_size = n;
            }
        }
        if let Some(v) = lookup("DEMOCRACY_PEERS") {
            self.peers = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
        }
    }
}

// ── Runtime config ────────────────────────────────────────────────────────────

/// Resolved per-node configuration. Built once at startup, never mutated
/// while the node runs.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub id: String,
    pub weight: u64,
    pub source: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub peer_ttl: Duration,
    pub max_chunk_size: usize,
    pub recv_buffer_size: usize,
    pub reassembly_windows: usize,
    pub peers: Vec<String>,
    pub channels: Vec<String>,
}

impl NodeConfig {
    /// Defaults with a freshly generated id and random weight.
    pub fn new() -> Result<Self, ConfigError> {
        Self::try_from(&DemocracyConfig::default())
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_weight(mut self, weight: u64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_peer_ttl(mut self, ttl: Duration) -> Self {
        self.peer_ttl = ttl;
        self
    }

    /// Values below 1 are clamped to 1.
    pub fn with_max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size.max(1);
        self
    }

    pub fn with_peers<I, S>(mut self, peers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.peers = peers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }
}

impl TryFrom<&DemocracyConfig> for NodeConfig {
    type Error = ConfigError;

    fn try_from(config: &DemocracyConfig) -> Result<Self, Self::Error> {
        if config.transport.max_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "transport.max_chunk_size",
                "must be at least 1".to_string(),
            ));
        }
        if config.election.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "election.interval_ms",
                "must be positive".to_string(),
            ));
        }
        if config.node.source.is_empty() {
            return Err(ConfigError::Invalid("node.source", "empty address".to_string()));
        }

        let id = if config.node.id.is_empty() {
            generate_short_id()?
        } else {
            config.node.id.clone()
        };

        Ok(Self {
            id,
            weight: config.node.weight.unwrap_or_else(random_weight),
            source: config.node.source.clone(),
            interval: Duration::from_millis(config.election.interval_ms),
            timeout: Duration::from_millis(config.election.timeout_ms),
            peer_ttl: Duration::from_millis(config.election.peer_ttl_ms),
            max_chunk_size: config.transport.max_chunk_size,
            recv_buffer_size: config.transport.recv_buffer_size.max(1),
            reassembly_windows: config.transport.reassembly_windows.max(1),
            peers: config.peers.clone(),
            channels: config.channels.clone(),
        })
    }
}
