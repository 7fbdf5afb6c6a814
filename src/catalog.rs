// MIT License

//! Device metadata for the adapter layer.
//!
//! The Smart Bridge Pro exports an "integration report", a JSON document
//! listing every paired device with its integration id: `Zones` hold the
//! outputs (lights), `Devices` hold the button remotes, and device 1 is the
//! bridge itself. Adapters combine that report with per-device configuration
//! overrides to label and classify what the event stream refers to only by
//! number.

use serde::Deserialize;
use tracing::debug;

use crate::error::Result;

/// How a logical device behaves on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Dimmable light: OUTPUT mode, level 0-100
    Dimmer,
    /// On/off only: OUTPUT mode, level 0 or 100
    Switch,
    /// Multi-button Pico remote: DEVICE mode
    Remote,
}

/// One logical device behind the bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSpec {
    pub id: u32,
    pub name: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: DeviceKind,
    /// Button numbers, populated for remotes
    #[serde(default)]
    pub buttons: Vec<u32>,
}

fn default_kind() -> DeviceKind {
    DeviceKind::Dimmer
}

// Integration report shape, only the parts we read

#[derive(Deserialize)]
struct IntegrationReport {
    #[serde(rename = "LIPIdList")]
    lip_id_list: Option<LipIdList>,
}

#[derive(Deserialize)]
struct LipIdList {
    #[serde(rename = "Zones", default)]
    zones: Vec<ReportZone>,
    #[serde(rename = "Devices", default)]
    devices: Vec<ReportDevice>,
}

#[derive(Deserialize)]
struct ReportZone {
    #[serde(rename = "ID")]
    id: u32,
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Deserialize)]
struct ReportDevice {
    #[serde(rename = "ID")]
    id: u32,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Buttons", default)]
    buttons: Vec<ReportButton>,
}

#[derive(Deserialize)]
struct ReportButton {
    #[serde(rename = "Number")]
    number: u32,
}

/// The merged device catalogue for one bridge.
#[derive(Debug, Clone, Default)]
pub struct DeviceCatalog {
    devices: Vec<DeviceSpec>,
}

impl DeviceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a bridge-exported integration report.
    ///
    /// Zones come back as dimmers (a configuration override downgrades the
    /// non-dimming ones to switches); Devices with buttons come back as
    /// remotes. Device 1 is the bridge itself and is skipped, as are
    /// buttonless devices.
    pub fn from_integration_report(json: &str) -> Result<Self> {
        let report: IntegrationReport = serde_json::from_str(json)?;
        let mut catalog = Self::new();
        let Some(list) = report.lip_id_list else {
            return Ok(catalog);
        };

        for zone in list.zones {
            catalog.devices.push(DeviceSpec {
                id: zone.id,
                name: zone.name,
                kind: DeviceKind::Dimmer,
                buttons: Vec::new(),
            });
        }
        for device in list.devices {
            if device.id == 1 || device.buttons.is_empty() {
                continue;
            }
            catalog.devices.push(DeviceSpec {
                id: device.id,
                name: device.name,
                kind: DeviceKind::Remote,
                buttons: device.buttons.iter().map(|b| b.number).collect(),
            });
        }

        debug!("Integration report yielded {} devices", catalog.devices.len());
        Ok(catalog)
    }

    /// Apply configuration overrides: an entry with a known id replaces the
    /// reported device, an unknown id is appended.
    pub fn merge(&mut self, overrides: impl IntoIterator<Item = DeviceSpec>) {
        for spec in overrides {
            match self.devices.iter_mut().find(|d| d.id == spec.id) {
                Some(existing) => *existing = spec,
                None => self.devices.push(spec),
            }
        }
    }

    pub fn get(&self, id: u32) -> Option<&DeviceSpec> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn devices(&self) -> &[DeviceSpec] {
        &self.devices
    }
}
