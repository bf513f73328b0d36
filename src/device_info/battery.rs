use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::config::{read_attr, ProbeConfig};
use super::procfs::parse_key_values;
use super::property::{Property, Section, UNKNOWN};
use super::units::{format_celsius, format_percent};

const POWER_SUPPLY_CLASS: &str = "class/power_supply";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatteryHealth {
    Good,
    Overheat,
    Dead,
    OverVoltage,
    UnspecifiedFailure,
    Cold,
    Unknown,
}

impl BatteryHealth {
    pub fn from_code(code: i32) -> Self {
        match code {
            2 => Self::Good,
            3 => Self::Overheat,
            4 => Self::Dead,
            5 => Self::OverVoltage,
            6 => Self::UnspecifiedFailure,
            7 => Self::Cold,
            _ => Self::Unknown,
        }
    }

    /// Parses the kernel's `POWER_SUPPLY_HEALTH` text.
    pub fn from_sysfs(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "good" => Self::Good,
            "overheat" | "hot" => Self::Overheat,
            "dead" => Self::Dead,
            "over voltage" => Self::OverVoltage,
            "unspecified failure" => Self::UnspecifiedFailure,
            "cold" => Self::Cold,
            _ => Self::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Good => "Good",
            Self::Overheat => "Overheat",
            Self::Dead => "Dead",
            Self::OverVoltage => "Over Voltage",
            Self::UnspecifiedFailure => "Unspecified Failure",
            Self::Cold => "Cold",
            Self::Unknown => UNKNOWN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatteryStatus {
    Charging,
    Discharging,
    NotCharging,
    Full,
    Unknown,
}

impl BatteryStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            2 => Self::Charging,
            3 => Self::Discharging,
            4 => Self::NotCharging,
            5 => Self::Full,
            _ => Self::Unknown,
        }
    }

    pub fn from_sysfs(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "charging" => Self::Charging,
            "discharging" => Self::Discharging,
            "not charging" => Self::NotCharging,
            "full" => Self::Full,
            _ => Self::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Charging => "Charging",
            Self::Discharging => "Discharging",
            Self::NotCharging => "Not Charging",
            Self::Full => "Full",
            Self::Unknown => UNKNOWN,
        }
    }
}

/// What the device draws power from. `None` in a snapshot means unplugged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlugType {
    Ac,
    Usb,
    Wireless,
}

impl PlugType {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Ac),
            2 => Some(Self::Usb),
            4 => Some(Self::Wireless),
            _ => None,
        }
    }

    /// Maps a `power_supply` `TYPE` attribute to a plug type.
    pub fn from_supply_type(value: &str) -> Option<Self> {
        match value.trim() {
            "Mains" => Some(Self::Ac),
            t if t.starts_with("USB") => Some(Self::Usb),
            "Wireless" => Some(Self::Wireless),
            _ => None,
        }
    }

    pub fn label(plug: Option<Self>) -> &'static str {
        match plug {
            Some(Self::Ac) => "AC",
            Some(Self::Usb) => "USB",
            Some(Self::Wireless) => "Wireless",
            None => "Not Plugged In",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatterySnapshot {
    pub level: Option<i64>,
    pub scale: Option<i64>,
    pub health: BatteryHealth,
    pub status: BatteryStatus,
    pub plugged: Option<PlugType>,
    pub technology: Option<String>,
    /// Tenths of a degree Celsius.
    pub temperature: Option<i32>,
    pub voltage_mv: Option<i64>,
    /// Design capacity. Best-effort only.
    pub capacity_mah: Option<f64>,
}

pub fn battery_properties(battery: &BatterySnapshot) -> Vec<Property> {
    let mut props = Vec::new();

    if let Some(level) = battery
        .level
        .zip(battery.scale)
        .and_then(|(level, scale)| format_percent(level, scale))
    {
        props.push(Property::new("Charge Level", level));
    }
    props.push(Property::new("Health", battery.health.label()));
    props.push(Property::new("Status", battery.status.label()));
    props.push(Property::new("Plugged Into", PlugType::label(battery.plugged)));
    if let Some(technology) = &battery.technology {
        props.push(Property::new("Technology", technology.clone()));
    }
    if let Some(tenths) = battery.temperature {
        props.push(Property::new("Temperature", format_celsius(tenths)));
    }
    if let Some(mv) = battery.voltage_mv {
        props.push(Property::new("Voltage", format!("{} mV", mv)));
    }
    props.push(Property::new(
        "Capacity",
        battery
            .capacity_mah
            .map(|mah| format!("{:.0} mAh", mah))
            .unwrap_or_else(|| UNKNOWN.to_string()),
    ));
    props
}

pub fn gather_battery_info(config: &ProbeConfig) -> Vec<Section> {
    match read_battery(config) {
        Some(battery) => vec![Section::new("Battery", battery_properties(&battery))],
        None => Vec::new(),
    }
}

/// Snapshot of the first battery under `power_supply`, if any.
pub fn read_battery(config: &ProbeConfig) -> Option<BatterySnapshot> {
    let supplies = list_supplies(&config.sys_path(POWER_SUPPLY_CLASS));
    let battery = supplies
        .iter()
        .find(|supply| supply_type(supply).as_deref() == Some("Battery"))?;
    let props = read_uevent(battery);
    let get = |key: &str| {
        props
            .iter()
            .find(|(k, _)| k.strip_prefix("POWER_SUPPLY_") == Some(key))
            .map(|(_, v)| v.clone())
            .filter(|v| !v.is_empty())
    };
    let get_int = |key: &str| get(key).and_then(|v| v.parse::<i64>().ok());

    let status = get("STATUS")
        .map(|s| BatteryStatus::from_sysfs(&s))
        .unwrap_or(BatteryStatus::Unknown);
    let plugged = supplies
        .iter()
        .filter(|supply| *supply != battery)
        .filter(|supply| read_attr(supply.join("online")).as_deref() == Some("1"))
        .find_map(|supply| supply_type(supply).and_then(|t| PlugType::from_supply_type(&t)));

    Some(BatterySnapshot {
        level: get_int("CAPACITY"),
        scale: get_int("CAPACITY").map(|_| 100),
        health: get("HEALTH")
            .map(|h| BatteryHealth::from_sysfs(&h))
            .unwrap_or(BatteryHealth::Unknown),
        status,
        plugged,
        technology: get("TECHNOLOGY").filter(|t| t != "Unknown"),
        temperature: get_int("TEMP").and_then(|t| i32::try_from(t).ok()),
        voltage_mv: get_int("VOLTAGE_NOW").map(|uv| uv / 1000),
        capacity_mah: design_capacity_mah(
            get_int("CHARGE_FULL_DESIGN"),
            get_int("ENERGY_FULL_DESIGN"),
            get_int("VOLTAGE_MIN_DESIGN"),
        ),
    })
}

/// Design capacity in mAh from the charge counter (µAh), or from the energy
/// counter (µWh) divided by the design minimum voltage (µV).
fn design_capacity_mah(
    charge_uah: Option<i64>,
    energy_uwh: Option<i64>,
    voltage_min_uv: Option<i64>,
) -> Option<f64> {
    if let Some(uah) = charge_uah.filter(|uah| *uah > 0) {
        return Some(uah as f64 / 1000.0);
    }
    let uwh = energy_uwh.filter(|uwh| *uwh > 0)?;
    let uv = voltage_min_uv.filter(|uv| *uv > 0)?;
    Some(uwh as f64 / uv as f64 * 1000.0)
}

fn list_supplies(class_dir: &Path) -> Vec<PathBuf> {
    let mut supplies: Vec<PathBuf> = match fs::read_dir(class_dir) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(e) => {
            debug!(path = %class_dir.display(), error = %e, "no power_supply class");
            Vec::new()
        }
    };
    supplies.sort();
    supplies
}

fn supply_type(supply: &Path) -> Option<String> {
    read_attr(supply.join("type"))
}

fn read_uevent(supply: &Path) -> Vec<(String, String)> {
    fs::read_to_string(supply.join("uevent"))
        .map(|content| parse_key_values(&content, '='))
        .unwrap_or_default()
}
