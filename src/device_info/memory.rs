use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::config::ProbeConfig;
use super::procfs::read_table;
use super::property::{Property, Section, UNKNOWN};
use super::units::{format_gb, format_size};

const MEMINFO_LABELS: &[(&str, &str)] = &[
    ("MemTotal", "Total Memory"),
    ("MemFree", "Free Memory"),
    ("MemAvailable", "Available Memory"),
    ("Buffers", "Buffers"),
    ("Cached", "Cached"),
    ("SwapTotal", "Total Swap"),
    ("SwapFree", "Free Swap"),
];

/// Filesystem statistics of the storage mount, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    pub block_size: u64,
    pub total_bytes: u64,
    pub available_bytes: u64,
    pub free_bytes: u64,
}

/// "Memory" from `/proc/meminfo` and "Storage" from the configured mount.
/// Sections with no rows are left out.
pub fn gather_memory_info(config: &ProbeConfig) -> Vec<Section> {
    [
        Section::new("Memory", gather_meminfo(config)),
        Section::new("Storage", gather_storage(config)),
    ]
    .into_iter()
    .filter(|section| !section.is_empty())
    .collect()
}

pub fn gather_meminfo(config: &ProbeConfig) -> Vec<Property> {
    read_table(config.proc_path("meminfo"), MEMINFO_LABELS)
}

pub fn gather_storage(config: &ProbeConfig) -> Vec<Property> {
    let mut props = match storage_stats(&config.storage_path) {
        Ok(stats) => vec![
            Property::new("Total Storage", format_gb(stats.total_bytes)),
            Property::new("Available Storage", format_gb(stats.available_bytes)),
            Property::new(
                "Used Storage",
                format_size(stats.total_bytes.saturating_sub(stats.free_bytes)),
            ),
            Property::new("Block Size", format_size(stats.block_size)),
        ],
        Err(e) => {
            debug!(path = %config.storage_path.display(), error = %e, "statvfs failed");
            Vec::new()
        }
    };

    match backing_device(&config.proc_path("mounts"), &config.storage_path) {
        Ok(device) => {
            let serial = get_serial_number(&device).unwrap_or_else(|e| {
                debug!(device = %device, error = %e, "disk serial unavailable");
                UNKNOWN.to_string()
            });
            props.push(Property::new("Storage Device", device));
            props.push(Property::new("Storage Serial", serial));
        }
        Err(e) => debug!(error = %e, "backing device unavailable"),
    }
    props
}

pub fn storage_stats(path: &Path) -> Result<StorageStats> {
    let c_path = CString::new(path.as_os_str().as_bytes())?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) } != 0 {
        return Err(io::Error::last_os_error())
            .with_context(|| format!("statvfs({}) failed", path.display()));
    }

    let fragment = stat.f_frsize as u64;
    Ok(StorageStats {
        block_size: stat.f_bsize as u64,
        total_bytes: stat.f_blocks as u64 * fragment,
        available_bytes: stat.f_bavail as u64 * fragment,
        free_bytes: stat.f_bfree as u64 * fragment,
    })
}

/// Finds the `/dev` device mounted at the longest prefix of `path`,
/// returned without the `/dev/` prefix.
pub fn backing_device(mounts: &Path, path: &Path) -> Result<String> {
    let content = fs::read_to_string(mounts)
        .with_context(|| format!("Failed to read {}", mounts.display()))?;

    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?.strip_prefix("/dev/")?;
            let mount_point = PathBuf::from(fields.next()?);
            path.starts_with(&mount_point)
                .then(|| (mount_point.components().count(), device.to_string()))
        })
        // Later mounts shadow earlier ones at the same depth.
        .max_by_key(|(depth, _)| *depth)
        .map(|(_, device)| device)
        .ok_or_else(|| anyhow!("No block device mounted at {}", path.display()))
}

#[cfg(target_os = "linux")]
pub fn get_serial_number(device_name: &str) -> Result<String> {
    use libudev_sys as udev;
    use std::ffi::CStr;

    let sysname = CString::new(device_name)?;

    unsafe {
        let context = udev::udev_new();
        if context.is_null() {
            return Err(anyhow!("Failed to create udev context"));
        }

        let dev =
            udev::udev_device_new_from_subsystem_sysname(context, c"block".as_ptr(), sysname.as_ptr());
        if dev.is_null() {
            udev::udev_unref(context);
            return Err(anyhow!("No udev block device named {}", device_name));
        }

        // Partitions carry no serial of their own; the parent disk does.
        let parent =
            udev::udev_device_get_parent_with_subsystem_devtype(dev, c"block".as_ptr(), c"disk".as_ptr());
        let source = if parent.is_null() { dev } else { parent };

        let serial = udev::udev_device_get_property_value(source, c"ID_SERIAL".as_ptr());
        let result = if serial.is_null() {
            Err(anyhow!("Serial number not found for {}", device_name))
        } else {
            Ok(CStr::from_ptr(serial).to_string_lossy().into_owned())
        };

        udev::udev_device_unref(dev);
        udev::udev_unref(context);
        result
    }
}

#[cfg(not(target_os = "linux"))]
pub fn get_serial_number(device_name: &str) -> Result<String> {
    Err(anyhow!("Disk serial lookup is not supported for {}", device_name))
}
