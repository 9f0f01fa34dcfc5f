//! Configuration for cedarkv
//!
//! Centralized configuration with sensible defaults.

/// Default maximum key/value token length in bytes
pub const DEFAULT_MAX_TOKEN_LEN: usize = 256;

/// Main configuration for a cedarkv server instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    // -------------------------------------------------------------------------
    // Store Configuration
    // -------------------------------------------------------------------------
    /// Max length of a key or value token (in bytes); longer tokens are
    /// rejected before they reach the tree
    pub max_token_len: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:4000".to_string(),
            max_token_len: DEFAULT_MAX_TOKEN_LEN,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum key/value token length (in bytes)
    pub fn max_token_len(mut self, len: usize) -> Self {
        self.config.max_token_len = len;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
