// MIT License

//! One connection per bridge host, shared by every adapter in the process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::bridge::BridgeConnection;
use crate::config::BridgeConfig;

/// Lifecycle-scoped map of host address to its shared connection.
///
/// The embedding program creates one registry and hands it to every adapter;
/// adapters asking for the same host always receive the same connection (and
/// therefore the same session and dispatcher), however they race at startup.
#[derive(Default)]
pub struct BridgeRegistry {
    connections: Mutex<HashMap<String, Arc<BridgeConnection>>>,
}

impl BridgeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or lazily create the connection for `host` with default settings.
    pub async fn get(&self, host: &str) -> Arc<BridgeConnection> {
        self.get_with(BridgeConfig::new(host)).await
    }

    /// Get or lazily create with explicit settings. Settings are honored on
    /// first creation only; later callers share whatever already exists for
    /// the host.
    pub async fn get_with(&self, config: BridgeConfig) -> Arc<BridgeConnection> {
        let mut connections = self.connections.lock().await;
        if let Some(existing) = connections.get(&config.host) {
            return existing.clone();
        }
        debug!("Creating connection for bridge {}", config.host);
        let connection = Arc::new(BridgeConnection::new(config.clone()));
        connections.insert(config.host, connection.clone());
        connection
    }
}
