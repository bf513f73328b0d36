//! This module gathers device diagnostics as ordered label/value rows.
//!
//! # Usage
//!
//! ```
//! use deviceinfo::{DeviceInfo, ProbeConfig, Tab};
//!
//! let info = DeviceInfo::new(ProbeConfig::default());
//! for section in info.sections(Tab::Memory) {
//!     for property in &section.properties {
//!         println!("{}: {}", property.label, property.value);
//!     }
//! }
//! ```

pub mod battery;
pub mod bluetooth;
pub mod camera;
pub mod config;
pub mod device;
pub mod edid;
pub mod memory;
pub mod procfs;
pub mod property;
pub mod screen;
pub mod soc;
pub mod units;

use anyhow::Result;
use config::ProbeConfig;
use property::Section;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// The groups of diagnostics, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tab {
    Device,
    Soc,
    Memory,
    Screen,
    Battery,
    Bluetooth,
    Camera,
}

impl Tab {
    pub const ALL: [Tab; 7] = [
        Tab::Device,
        Tab::Soc,
        Tab::Memory,
        Tab::Screen,
        Tab::Battery,
        Tab::Bluetooth,
        Tab::Camera,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Device => "Device",
            Tab::Soc => "SOC",
            Tab::Memory => "Memory",
            Tab::Screen => "Screen",
            Tab::Battery => "Battery",
            Tab::Bluetooth => "Bluetooth",
            Tab::Camera => "Camera",
        }
    }

    /// Message shown when a tab has nothing to display.
    pub fn empty_message(self) -> &'static str {
        match self {
            Tab::Device => "No device info available",
            Tab::Soc => "CPU information unavailable",
            Tab::Memory => "No memory or storage info available",
            Tab::Screen => "No screen info available",
            Tab::Battery => "No battery info available",
            Tab::Bluetooth => "No bluetooth info available",
            Tab::Camera => "No cameras detected",
        }
    }

    /// Runs this tab's collector.
    pub fn gather(self, config: &ProbeConfig) -> Vec<Section> {
        debug!(tab = %self, "gathering");
        match self {
            Tab::Device => device::gather_device_info(config),
            Tab::Soc => soc::gather_soc_info(config),
            Tab::Memory => memory::gather_memory_info(config),
            Tab::Screen => screen::gather_screen_info(config),
            Tab::Battery => battery::gather_battery_info(config),
            Tab::Bluetooth => bluetooth::gather_bluetooth_info(config),
            Tab::Camera => camera::gather_camera_info(config),
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "device" => Ok(Tab::Device),
            "soc" | "cpu" => Ok(Tab::Soc),
            "memory" | "storage" => Ok(Tab::Memory),
            "screen" | "display" => Ok(Tab::Screen),
            "battery" => Ok(Tab::Battery),
            "bluetooth" => Ok(Tab::Bluetooth),
            "camera" => Ok(Tab::Camera),
            other => Err(format!(
                "unknown tab '{}', expected one of: device, soc, memory, screen, battery, bluetooth, camera",
                other
            )),
        }
    }
}

/// Memoizing view over the collectors: each tab is gathered on first access
/// and reused for the lifetime of the handle.
#[derive(Debug)]
pub struct DeviceInfo {
    config: ProbeConfig,
    tabs: [OnceCell<Vec<Section>>; Tab::ALL.len()],
}

impl DeviceInfo {
    pub fn new(config: ProbeConfig) -> Self {
        Self {
            config,
            tabs: Default::default(),
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn sections(&self, tab: Tab) -> &[Section] {
        self.tabs[tab.index()].get_or_init(|| tab.gather(&self.config))
    }

    pub fn report(&self, tabs: &[Tab]) -> DeviceReport {
        DeviceReport {
            tabs: tabs
                .iter()
                .map(|&tab| TabReport {
                    tab,
                    sections: self.sections(tab).to_vec(),
                })
                .collect(),
            extra: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabReport {
    pub tab: Tab,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceReport {
    pub tabs: Vec<TabReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl DeviceReport {
    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }
}

/// Gathers every tab once.
pub fn get_device_report(config: &ProbeConfig) -> Result<DeviceReport> {
    Ok(DeviceInfo::new(config.clone()).report(&Tab::ALL))
}
