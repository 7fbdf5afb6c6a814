// MIT License
// Console monitor for a Caseta bridge

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::{debug, info, warn};

use caseta_lip_bridge::protocol::{self, Action, Button};
use caseta_lip_bridge::{
    BridgeConfig, BridgeEvent, BridgeRegistry, DeviceCatalog, DeviceKind, DeviceSpec,
    EventSubscriber,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "caseta-monitor")]
#[command(about = "Watch and exercise a Lutron Caseta bridge over LIP")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    bridge: BridgeToml,
    /// Path to a bridge-exported integration report (JSON)
    #[serde(default)]
    integration_report: Option<String>,
    /// Per-device entries, patched over the report
    #[serde(default)]
    devices: Vec<DeviceSpec>,
}

#[derive(Debug, Deserialize)]
struct BridgeToml {
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_username")]
    username: String,
    #[serde(default = "default_password")]
    password: String,
    #[serde(default = "default_keepalive")]
    keepalive_interval_secs: u64,
    #[serde(default = "default_reconnect_delay")]
    reconnect_delay_ms: u64,
}

fn default_port() -> u16 {
    23
}
fn default_username() -> String {
    "lutron".to_string()
}
fn default_password() -> String {
    "integration".to_string()
}
fn default_keepalive() -> u64 {
    60
}
fn default_reconnect_delay() -> u64 {
    1000
}

// ---------------------------------------------------------------------------
// Event logging
// ---------------------------------------------------------------------------

/// Logs every event with the device's display name from the catalogue.
struct EventLogger {
    catalog: DeviceCatalog,
}

#[async_trait::async_trait]
impl EventSubscriber for EventLogger {
    async fn handle_event(
        &self,
        event: &BridgeEvent,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let name = self
            .catalog
            .get(event.integration_id)
            .map(|d| d.name.as_str())
            .unwrap_or("<unknown>");

        match event.mode.as_str() {
            protocol::OUTPUT if event.action == u32::from(Action::Set) => {
                info!("{} ({}) level {:.1}%", name, event.integration_id, event.value);
            }
            protocol::DEVICE => match Button::from_value(event.value) {
                Some(Button::Down) => {
                    info!("{} ({}) button {} down", name, event.integration_id, event.action);
                }
                Some(Button::Up) => {
                    info!("{} ({}) button {} up", name, event.integration_id, event.action);
                }
                None => {
                    debug!(
                        "{} ({}) action {} value {}",
                        name, event.integration_id, event.action, event.value
                    );
                }
            },
            _ => debug!("Unhandled event: {:?}", event),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or
    // RUST_LOG=caseta_lip_bridge=trace). Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();

    let config_text =
        std::fs::read_to_string(&cli.config).context("Failed to read config file")?;
    let config: Config = toml::from_str(&config_text).context("Failed to parse config file")?;

    // Device catalogue: integration report (if any) patched by config entries
    let mut catalog = match &config.integration_report {
        Some(path) => {
            let report = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read integration report {path}"))?;
            DeviceCatalog::from_integration_report(&report)
                .context("Failed to parse integration report")?
        }
        None => DeviceCatalog::new(),
    };
    catalog.merge(config.devices.clone());
    info!("Catalogue holds {} devices", catalog.devices().len());

    let bridge_config = BridgeConfig::builder()
        .host(&config.bridge.host)
        .port(config.bridge.port)
        .username(&config.bridge.username)
        .password(&config.bridge.password)
        .keepalive_interval_secs(config.bridge.keepalive_interval_secs)
        .reconnect_delay_ms(config.bridge.reconnect_delay_ms)
        .build();

    let registry = BridgeRegistry::new();
    let bridge = registry.get_with(bridge_config).await;

    info!(
        "Connecting to bridge at {}:{}",
        config.bridge.host, config.bridge.port
    );
    bridge.open().await.context("Failed to open bridge session")?;

    let logger = Arc::new(EventLogger {
        catalog: catalog.clone(),
    });
    bridge.register(&logger).await;
    bridge.start();

    // Ask for current levels so the log starts from known state
    for device in catalog.devices() {
        if matches!(device.kind, DeviceKind::Dimmer | DeviceKind::Switch)
            && !bridge.query(protocol::OUTPUT, device.id, Action::Set).await?
        {
            warn!("Query declined for device {} (session not open)", device.id);
        }
    }

    info!("Monitoring. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}
