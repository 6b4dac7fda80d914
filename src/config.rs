//! Configuration management for RDT-UDP.
//!
//! This module holds the protocol timing constants and the TOML
//! configuration for both the server and client components. Configuration
//! is stored in TOML format; a missing file is created with defaults.

use crate::error::TransferError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;
use std::time::Duration;

// Protocol timing constants
/// How long a sender waits for an acknowledgment before retransmitting.
/// Also the receive timeout of both event loops.
pub const RETRANSMIT_TIMEOUT: Duration = Duration::from_secs(2);
/// Idle time after which the server reaps a session (five retransmission
/// timeouts).
pub const STALE_SESSION_TIMEOUT: Duration = Duration::from_secs(10);
/// How long the server keeps re-acknowledging FINs of a finished upload.
pub const FIN_GRACE_PERIOD: Duration = Duration::from_secs(10);
/// Transmissions of the final FIN before the client gives up.
pub const MAX_FIN_ATTEMPTS: u32 = 5;

// Handshake constants
/// Session identifiers are drawn uniformly from this range.
pub const SESSION_ID_RANGE: RangeInclusive<u32> = 1..=10_000;
/// Initial sequence numbers are drawn uniformly from this range.
pub const INITIAL_SEQ_RANGE: RangeInclusive<u32> = 1..=100;

// Endpoint defaults
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_STORAGE_DIR: &str = "server_data";
/// Prefix prepended to the local name of a downloaded file.
pub const DOWNLOAD_PREFIX: &str = "downloaded_";

/// Main configuration structure containing both endpoint configurations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server-specific configuration.
    pub server: ServerConfig,
    /// Client-specific configuration.
    pub client: ClientConfig,
}

/// Configuration for the transfer server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub storage_directory: String,
    /// Percentage of incoming datagrams to drop, for loss testing.
    pub drop_rate_percent: u8,
}

/// Configuration for the transfer client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server_address: String,
    pub server_port: u16,
    /// Directory downloaded files are written into.
    pub download_directory: String,
    pub progress_bar_enabled: bool,
}

impl Config {
    /// Loads configuration from a file, or creates a new default
    /// configuration if the file doesn't exist.
    pub fn load_or_create(path: &Path) -> Result<Self, TransferError> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to a file in TOML format.
    pub fn save(&self, path: &Path) -> Result<(), TransferError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            storage_directory: DEFAULT_STORAGE_DIR.to_string(),
            drop_rate_percent: 0,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            server_port: DEFAULT_PORT,
            download_directory: ".".to_string(),
            progress_bar_enabled: true,
        }
    }
}
