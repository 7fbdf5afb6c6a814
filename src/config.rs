// MIT License

/// Configuration for connecting to a Caseta Smart Bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Bridge host name or IP address
    pub host: String,
    /// Telnet port (default: 23)
    pub port: u16,
    /// Integration account user (default: lutron)
    pub username: String,
    /// Integration account password (default: integration)
    pub password: String,
    /// Keepalive ping interval in seconds (default: 60)
    pub keepalive_interval_secs: u64,
    /// Base delay between failed reconnect cycles in milliseconds
    /// (doubled per consecutive failure, capped by `max_backoff_shift`)
    pub reconnect_delay_ms: u64,
    /// Cap on the backoff doubling exponent (default: 4, so at most 16x base)
    pub max_backoff_shift: u32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 23,
            username: "lutron".to_string(),
            password: "integration".to_string(),
            keepalive_interval_secs: 60,
            reconnect_delay_ms: 1000,
            max_backoff_shift: 4,
        }
    }
}

impl BridgeConfig {
    /// Create a config for the given host with default credentials.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Create a new config builder starting from defaults.
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }
}

/// Builder for BridgeConfig.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.config.username = username.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    pub fn keepalive_interval_secs(mut self, secs: u64) -> Self {
        self.config.keepalive_interval_secs = secs;
        self
    }

    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    pub fn max_backoff_shift(mut self, shift: u32) -> Self {
        self.config.max_backoff_shift = shift;
        self
    }

    pub fn build(self) -> BridgeConfig {
        self.config
    }
}
