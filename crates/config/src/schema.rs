//! Config schema. Every field is optional in the file; defaults match the
//! daemon's documented behavior (pits in ./pits, 30 minute TTL, 5 minute
//! sweep).

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WellConfig {
    pub server: ServerConfig,
    pub pits: PitsConfig,
}

/// HTTP/WebSocket listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

/// Pit persistence and lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PitsConfig {
    /// Directory holding pit snapshots and metadata sidecars.
    pub dir: String,
    /// Idle time after which an unconnected pit is evicted.
    pub ttl_ms: u64,
    /// How often the eviction sweeper runs.
    pub cleanup_interval_ms: u64,
}

impl Default for PitsConfig {
    fn default() -> Self {
        Self {
            dir: "./pits".into(),
            ttl_ms: 30 * 60 * 1000,
            cleanup_interval_ms: 5 * 60 * 1000,
        }
    }
}
