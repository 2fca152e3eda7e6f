// MIT License - Copyright (c) 2021 TJForc

use std::time::Duration;

use crate::constants::{
    DEFAULT_HOSTNAME, DEFAULT_PORT, DEFAULT_RECONNECT_INTERVAL_MS, EVENT_CHANNEL_CAPACITY,
};

/// Configuration for connecting to a CasparCG server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server hostname or IP address (empty means `localhost`)
    pub hostname: String,
    /// AMCP TCP port (default: 5250)
    pub port: u16,
    /// Whether to keep reconnecting after the link drops
    pub auto_connect: bool,
    /// Fixed delay between reconnection attempts in milliseconds (default: 5000)
    pub reconnect_interval_ms: u64,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_string(),
            port: DEFAULT_PORT,
            auto_connect: false,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            event_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// The hostname to dial, substituting `localhost` for an empty value.
    pub fn effective_hostname(&self) -> &str {
        resolve_hostname(&self.hostname)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

pub(crate) fn resolve_hostname(hostname: &str) -> &str {
    if hostname.trim().is_empty() {
        DEFAULT_HOSTNAME
    } else {
        hostname
    }
}

/// Builder for ClientConfig.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.config.hostname = hostname.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn auto_connect(mut self, auto_connect: bool) -> Self {
        self.config.auto_connect = auto_connect;
        self
    }

    pub fn reconnect_interval_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_interval_ms = ms;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
