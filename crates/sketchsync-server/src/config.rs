//! Server configuration.

use std::net::SocketAddr;

use crate::error::ConfigError;

/// Well-known port for the line protocol.
pub const DEFAULT_PORT: u16 = 4242;
/// Port for the HTTP status endpoints.
pub const DEFAULT_HTTP_PORT: u16 = 4243;
/// Longest accepted protocol line in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;
/// Pending outbound lines per connection before it is evicted.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

pub const ENV_ADDR: &str = "SKETCHSYNC_ADDR";
pub const ENV_HTTP_ADDR: &str = "SKETCHSYNC_HTTP_ADDR";
pub const ENV_MAX_LINE: &str = "SKETCHSYNC_MAX_LINE";
pub const ENV_QUEUE: &str = "SKETCHSYNC_QUEUE";

/// Runtime settings for [`crate::SketchServer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address for the line protocol.
    pub addr: SocketAddr,
    /// Address for the HTTP status router, `None` to disable it.
    pub http_addr: Option<SocketAddr>,
    pub max_line_length: usize,
    pub queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            http_addr: Some(SocketAddr::from(([0, 0, 0, 0], DEFAULT_HTTP_PORT))),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `SKETCHSYNC_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`ServerConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_ADDR) {
            config.addr = parse_addr(ENV_ADDR, &value)?;
        }
        if let Some(value) = lookup(ENV_HTTP_ADDR) {
            config.http_addr = match value.trim() {
                "off" | "" => None,
                other => Some(parse_addr(ENV_HTTP_ADDR, other)?),
            };
        }
        if let Some(value) = lookup(ENV_MAX_LINE) {
            config.max_line_length = parse_positive(ENV_MAX_LINE, &value)?;
        }
        if let Some(value) = lookup(ENV_QUEUE) {
            config.queue_capacity = parse_positive(ENV_QUEUE, &value)?;
        }

        Ok(config)
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_http_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.http_addr = addr;
        self
    }

    pub fn with_max_line_length(mut self, len: usize) -> Self {
        self.max_line_length = len;
        self
    }

    /// Set the per-connection queue length, at least one.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Loopback on ephemeral ports, HTTP disabled.
    pub fn local() -> Self {
        Self::default()
            .with_addr(SocketAddr::from(([127, 0, 0, 1], 0)))
            .with_http_addr(None)
    }
}

fn parse_addr(var: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    let value = value.trim();
    // A bare port binds every interface.
    if let Ok(port) = value.parse::<u16>() {
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }
    value.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_positive(var: &'static str, value: &str) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: e.to_string(),
        }),
    }
}
