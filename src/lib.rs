//! A library for retrieving device diagnostics.
//!
//! This crate gathers what a device-info screen shows, grouped into tabs:
//! device identity, SoC and per-core CPU details, memory and storage,
//! displays, battery, Bluetooth adapter and cameras. Every value is reported
//! as an ordered, human-readable label/value row.
//!
//! # Platform Support
//! - **Linux**: Values are read from procfs, sysfs (DMI, cpufreq, power_supply, drm, video4linux, rfkill), `uname(2)`, `statvfs(3)` and `libudev`.
//!
//! # Dependencies
//! - **Linux**: Requires `libudev` for disk serial number retrieval. Ensure `libudev` is installed on the system.
//!     - On Debian/Ubuntu: `sudo apt-get install libudev-dev`
//!     - On Fedora/Red Hat: `sudo dnf install systemd-devel`
//!
//! # Environment Setup
//! - All filesystem roots live in [`ProbeConfig`], so a copied `/proc` and `/sys` tree can be inspected offline.
//! - Unreadable sources never fail a tab: the row shows `Unknown`, or the tab is left empty.

pub mod device_info;

pub use device_info::config::ProbeConfig;
pub use device_info::property::{Property, Section};
pub use device_info::{get_device_report, DeviceInfo, DeviceReport, Tab, TabReport};
