//! Configuration for scriptkv
//!
//! Centralized configuration with sensible defaults. The library core
//! (`ScriptKv`) needs none of this; it is consumed by the TCP pool and the
//! development server.

use std::time::Duration;

use crate::error::{Result, ScriptKvError};

/// Main configuration for clients and the development server
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Client Configuration
    // -------------------------------------------------------------------------
    /// Address of the store to connect to (host:port)
    pub store_addr: String,

    /// Max idle connections kept by `TcpPool`
    pub pool_size: usize,

    /// TCP connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// Connection read timeout (milliseconds, 0 = none)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Dev Server Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_addr: "127.0.0.1:6379".to_string(),
            pool_size: 16,
            connect_timeout_ms: 3000,
            read_timeout_ms: 5000,
            write_timeout_ms: 5000,
            listen_addr: "127.0.0.1:6379".to_string(),
            max_connections: 1024,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the pool or server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(ScriptKvError::Config("pool_size must be at least 1".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ScriptKvError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ScriptKvError::Config(
                "connect_timeout_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the store address clients connect to
    pub fn store_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.store_addr = addr.into();
        self
    }

    /// Set the number of idle connections the pool keeps
    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size;
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
