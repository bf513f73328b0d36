use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::config::{read_attr, ProbeConfig};
use super::property::{yes_no, yes_no_unknown, Property, Section, UNKNOWN};

const BLUETOOTH_CLASS: &str = "class/bluetooth";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterState {
    Off,
    TurningOn,
    On,
    TurningOff,
    Unknown,
}

impl AdapterState {
    pub fn from_code(code: i32) -> Self {
        match code {
            10 => Self::Off,
            11 => Self::TurningOn,
            12 => Self::On,
            13 => Self::TurningOff,
            _ => Self::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::TurningOn => "Turning On",
            Self::On => "On",
            Self::TurningOff => "Turning Off",
            Self::Unknown => UNKNOWN,
        }
    }
}

/// Tri-state answer to "is this feature supported".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureSupport {
    Supported,
    NotSupported,
    Unknown,
}

impl FeatureSupport {
    pub fn from_code(code: i32) -> Self {
        match code {
            10 => Self::Supported,
            11 => Self::NotSupported,
            _ => Self::Unknown,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Self::Supported => Some(true),
            Self::NotSupported => Some(false),
            Self::Unknown => None,
        }
    }

    pub fn label(self) -> &'static str {
        yes_no_unknown(self.as_bool())
    }
}

/// Adapter capabilities. `None` flags are ones the platform does not report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BluetoothSnapshot {
    pub state: AdapterState,
    pub enabled: bool,
    pub le_audio: FeatureSupport,
    pub le_coded_phy: Option<bool>,
    pub le_extended_advertising: Option<bool>,
    pub le_periodic_advertising: Option<bool>,
    pub multiple_advertisement: Option<bool>,
    pub offloaded_filtering: Option<bool>,
    pub offloaded_scan_batching: Option<bool>,
}

impl BluetoothSnapshot {
    /// Lowest Bluetooth Core version implied by the advertised LE features.
    pub fn version(&self) -> &'static str {
        let flags = [
            self.le_audio.as_bool(),
            self.le_periodic_advertising,
            self.le_extended_advertising,
            self.multiple_advertisement,
        ];
        if flags.iter().all(Option::is_none) {
            return UNKNOWN;
        }

        let has = |flag: Option<bool>| flag.unwrap_or(false);
        if has(self.le_audio.as_bool()) {
            "5.2 (or higher)"
        } else if has(self.le_periodic_advertising) {
            "5.1 (or higher)"
        } else if has(self.le_extended_advertising) {
            "5.0 (or higher)"
        } else if has(self.multiple_advertisement) {
            "4.1 or 4.2"
        } else {
            "4.0 or lower"
        }
    }
}

pub fn bluetooth_properties(adapter: Option<&BluetoothSnapshot>) -> Vec<Property> {
    let Some(adapter) = adapter else {
        return vec![Property::new("Bluetooth", "Not supported on this device")];
    };

    vec![
        Property::new("State", adapter.state.label()),
        Property::new("Enabled", yes_no(adapter.enabled)),
        Property::new("LE Support", adapter.le_audio.label()),
        Property::new("Bluetooth Version", adapter.version()),
        Property::new("Long Range", yes_no_unknown(adapter.le_coded_phy)),
        Property::new(
            "LE Extended Advertising",
            yes_no_unknown(adapter.le_extended_advertising),
        ),
        Property::new(
            "LE Periodic Advertising",
            yes_no_unknown(adapter.le_periodic_advertising),
        ),
        Property::new(
            "Multiple Advertisement",
            yes_no_unknown(adapter.multiple_advertisement),
        ),
        Property::new("Offloaded Filtering", yes_no_unknown(adapter.offloaded_filtering)),
        Property::new(
            "Offloaded Scan Batching",
            yes_no_unknown(adapter.offloaded_scan_batching),
        ),
    ]
}

pub fn gather_bluetooth_info(config: &ProbeConfig) -> Vec<Section> {
    let adapter = read_adapter(config);
    vec![Section::new("Bluetooth", bluetooth_properties(adapter.as_ref()))]
}

/// Snapshot of the first HCI adapter, or `None` without Bluetooth hardware.
///
/// The kernel exposes the rfkill switch through sysfs but not the LE
/// feature set, so those flags stay unknown.
pub fn read_adapter(config: &ProbeConfig) -> Option<BluetoothSnapshot> {
    let class_dir = config.sys_path(BLUETOOTH_CLASS);
    let hci = first_child(&class_dir, "hci")?;

    let state = match first_child(&hci, "rfkill") {
        Some(rfkill) => rfkill_state(&rfkill),
        None => {
            debug!(adapter = %hci.display(), "adapter has no rfkill switch");
            AdapterState::On
        }
    };

    Some(BluetoothSnapshot {
        state,
        enabled: state == AdapterState::On,
        le_audio: FeatureSupport::Unknown,
        le_coded_phy: None,
        le_extended_advertising: None,
        le_periodic_advertising: None,
        multiple_advertisement: None,
        offloaded_filtering: None,
        offloaded_scan_batching: None,
    })
}

fn rfkill_state(rfkill: &Path) -> AdapterState {
    let blocked = |name: &str| read_attr(rfkill.join(name)).map(|v| v == "1");
    match (blocked("soft"), blocked("hard")) {
        (Some(true), _) | (_, Some(true)) => AdapterState::Off,
        (Some(false), Some(false)) | (Some(false), None) | (None, Some(false)) => AdapterState::On,
        (None, None) => AdapterState::Unknown,
    }
}

/// First entry of `dir` (by name) whose name starts with `prefix`.
fn first_child(dir: &Path, prefix: &str) -> Option<PathBuf> {
    let mut matches: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
        .map(|entry| entry.path())
        .collect();
    matches.sort();
    matches.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_info::config::write_fixture;
    use anyhow::Result;

    fn adapter() -> BluetoothSnapshot {
        BluetoothSnapshot {
            state: AdapterState::On,
            enabled: true,
            le_audio: FeatureSupport::NotSupported,
            le_coded_phy: Some(true),
            le_extended_advertising: Some(true),
            le_periodic_advertising: Some(false),
            multiple_advertisement: Some(true),
            offloaded_filtering: Some(false),
            offloaded_scan_batching: None,
        }
    }

    #[test]
    fn test_state_and_feature_codes() {
        assert_eq!(AdapterState::from_code(12).label(), "On");
        assert_eq!(AdapterState::from_code(11).label(), "Turning On");
        assert_eq!(AdapterState::from_code(0).label(), "Unknown");
        assert_eq!(FeatureSupport::from_code(10).label(), "Yes");
        assert_eq!(FeatureSupport::from_code(11).label(), "No");
        assert_eq!(FeatureSupport::from_code(-1).label(), "Unknown");
    }

    #[test]
    fn test_version_from_features() {
        let mut bt = adapter();
        assert_eq!(bt.version(), "5.0 (or higher)");

        bt.le_audio = FeatureSupport::Supported;
        assert_eq!(bt.version(), "5.2 (or higher)");

        bt.le_audio = FeatureSupport::Unknown;
        bt.le_extended_advertising = Some(false);
        assert_eq!(bt.version(), "4.1 or 4.2");

        bt.multiple_advertisement = None;
        assert_eq!(bt.version(), "4.0 or lower");

        bt.le_extended_advertising = None;
        bt.le_periodic_advertising = None;
        assert_eq!(bt.version(), "Unknown");
    }

    #[test]
    fn test_properties_order() {
        let labels: Vec<_> = bluetooth_properties(Some(&adapter()))
            .into_iter()
            .map(|p| p.label)
            .collect();
        assert_eq!(
            labels,
            [
                "State",
                "Enabled",
                "LE Support",
                "Bluetooth Version",
                "Long Range",
                "LE Extended Advertising",
                "LE Periodic Advertising",
                "Multiple Advertisement",
                "Offloaded Filtering",
                "Offloaded Scan Batching",
            ]
        );
    }

    #[test]
    fn test_no_adapter() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let sections = gather_bluetooth_info(&ProbeConfig::rooted_at(dir.path()));
        assert_eq!(
            sections[0].properties,
            vec![Property::new("Bluetooth", "Not supported on this device")]
        );
        Ok(())
    }

    #[test]
    fn test_soft_blocked_adapter_is_off() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_fixture(dir.path(), "sys/class/bluetooth/hci0/rfkill1/soft", "1\n");
        write_fixture(dir.path(), "sys/class/bluetooth/hci0/rfkill1/hard", "0\n");
        let config = ProbeConfig::rooted_at(dir.path());

        let sections = gather_bluetooth_info(&config);
        let bluetooth = &sections[0];
        assert_eq!(bluetooth.get("State"), Some("Off"));
        assert_eq!(bluetooth.get("Enabled"), Some("No"));
        assert_eq!(bluetooth.get("LE Support"), Some("Unknown"));
        assert_eq!(bluetooth.get("Bluetooth Version"), Some("Unknown"));
        Ok(())
    }

    #[test]
    fn test_unblocked_adapter_is_on() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_fixture(dir.path(), "sys/class/bluetooth/hci0/rfkill0/soft", "0\n");
        write_fixture(dir.path(), "sys/class/bluetooth/hci0/rfkill0/hard", "0\n");
        let adapter = read_adapter(&ProbeConfig::rooted_at(dir.path())).unwrap();
        assert_eq!(adapter.state, AdapterState::On);
        assert!(adapter.enabled);
        Ok(())
    }
}
