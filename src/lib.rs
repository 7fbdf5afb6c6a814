// MIT License

//! # caseta-lip-bridge
//!
//! Telnet/LIP communication with the Lutron Caseta Smart Bridge Pro.
//!
//! One authenticated telnet session per bridge host carries every logical
//! device. The session parses the bridge's `~MODE,INTEGRATION,ACTION,VALUE`
//! event stream, fans events out to registered subscribers, serializes
//! concurrent outbound commands, and reconnects in place when the bridge
//! drops the link, so long-lived subscriptions survive connection loss.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use caseta_lip_bridge::protocol::{self, Action};
//! use caseta_lip_bridge::{BridgeEvent, BridgeRegistry, EventSubscriber};
//!
//! struct Printer;
//!
//! #[async_trait::async_trait]
//! impl EventSubscriber for Printer {
//!     async fn handle_event(
//!         &self,
//!         event: &BridgeEvent,
//!     ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!         println!("{} {} -> {}", event.mode, event.integration_id, event.value);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = BridgeRegistry::new();
//!     let bridge = registry.get("192.168.1.50").await;
//!     bridge.open().await?;
//!
//!     let printer = Arc::new(Printer);
//!     bridge.register(&printer).await;
//!     bridge.start();
//!
//!     // Full brightness on integration id 5
//!     bridge
//!         .write_command(protocol::OUTPUT, 5, Action::Set, 100.0, &[])
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod protocol;
pub mod registry;
pub mod session;

// Re-exports for convenience
pub use bridge::BridgeConnection;
pub use catalog::{DeviceCatalog, DeviceKind, DeviceSpec};
pub use config::{BridgeConfig, BridgeConfigBuilder};
pub use dispatch::{Dispatcher, EventSubscriber, SubscriptionHandle};
pub use error::{BridgeError, Result};
pub use event::BridgeEvent;
pub use registry::BridgeRegistry;
pub use session::{ConnectParams, Session, SessionState};
