use anyhow::{anyhow, Context, Result};
use pnet::datalink::{self, MacAddr};
use serde::{Deserialize, Serialize};
use std::ffi::CStr;
use std::fs;
use std::path::Path;
use tracing::debug;

use super::config::{read_attr, ProbeConfig};
use super::procfs::parse_key_values;
use super::property::{Property, Section, UNKNOWN};
use super::screen;

const BIOS_ENTRY: &str = "firmware/dmi/entries/0-0/raw";
const SYSTEM_ENTRY: &str = "firmware/dmi/entries/1-0/raw";
const DMI_ID_DIR: &str = "class/dmi/id";
const DEVICE_TREE_MODEL: &str = "firmware/devicetree/base/model";

/// SMBIOS type 0 structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BiosInfo {
    pub vendor: String,
    pub version: String,
    pub release_date: String,
}

/// SMBIOS type 1 structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub manufacturer: String,
    pub product_name: String,
    pub serial_number: String,
    pub uuid: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uname {
    pub sysname: String,
    pub nodename: String,
    pub release: String,
    pub version: String,
    pub machine: String,
}

pub fn gather_device_info(config: &ProbeConfig) -> Vec<Section> {
    let system = read_system_info(config.sys_path(SYSTEM_ENTRY)).unwrap_or_else(|e| {
        debug!(error = %e, "SMBIOS system entry unavailable");
        SystemInfo::default()
    });
    let bios = read_bios_info(config.sys_path(BIOS_ENTRY)).unwrap_or_else(|e| {
        debug!(error = %e, "SMBIOS BIOS entry unavailable");
        BiosInfo::default()
    });
    let uname = get_uname().unwrap_or_else(|e| {
        debug!(error = %e, "uname failed");
        Uname::default()
    });
    let dmi_id = |name: &str| read_attr(config.sys_path(DMI_ID_DIR).join(name));

    let manufacturer = non_empty(system.manufacturer).or_else(|| dmi_id("sys_vendor"));
    let model = non_empty(system.product_name)
        .or_else(|| dmi_id("product_name"))
        .or_else(|| read_device_tree_string(&config.sys_path(DEVICE_TREE_MODEL)));
    let serial = non_empty(system.serial_number).or_else(|| dmi_id("product_serial"));
    let uuid = non_empty(system.uuid).or_else(|| dmi_id("product_uuid"));
    let bootloader = non_empty(format_bios(&bios)).or_else(|| {
        let version = dmi_id("bios_version")?;
        Some(match dmi_id("bios_vendor") {
            Some(vendor) => format!("{} {}", vendor, version),
            None => version,
        })
    });

    let kernel = if uname.release.is_empty() {
        None
    } else {
        Some(format!("{} {}", uname.release, uname.version).trim().to_string())
    };
    let os = read_os_release(&config.etc_path("os-release"))
        .and_then(|fields| os_pretty_name(&fields));
    let screen = screen::gather_displays(config)
        .first()
        .map(|display| display.summary())
        .unwrap_or_else(|| UNKNOWN.to_string());
    let machine_id = read_attr(config.etc_path("machine-id"));
    let virtualization = match detect_virtualization(config) {
        Some(kind) => format!("Yes ({})", kind),
        None => "No".to_string(),
    };
    let mac_addresses = get_mac_addresses();

    let or_unknown = |value: Option<String>| value.unwrap_or_else(|| UNKNOWN.to_string());

    vec![Section::new(
        "Device",
        vec![
            Property::new("Manufacturer", or_unknown(manufacturer)),
            Property::new("Model", or_unknown(model)),
            Property::new("Serial Number", or_unknown(serial)),
            Property::new("UUID", or_unknown(uuid)),
            Property::new("Bootloader", or_unknown(bootloader)),
            Property::new("Hostname", or_unknown(non_empty(uname.nodename))),
            Property::new("Kernel", or_unknown(kernel)),
            Property::new("OS", or_unknown(os)),
            Property::new("ABIs", or_unknown(non_empty(supported_abis(&uname.machine)))),
            Property::new("Screen", screen),
            Property::new("Machine ID", or_unknown(machine_id)),
            Property::new("Virtual Machine", virtualization),
            Property::new(
                "MAC Addresses",
                or_unknown(non_empty(mac_addresses.join(", "))),
            ),
        ],
    )]
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn format_bios(bios: &BiosInfo) -> String {
    let mut out = [bios.vendor.as_str(), bios.version.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    if !bios.release_date.is_empty() && !out.is_empty() {
        out.push_str(&format!(" ({})", bios.release_date));
    }
    out
}

/// Maps a kernel machine name to the ABIs it can execute, primary first.
pub fn supported_abis(machine: &str) -> String {
    let abis: &[&str] = match machine {
        "x86_64" => &["x86_64", "x86"],
        "i386" | "i486" | "i586" | "i686" => &["x86"],
        "aarch64" | "arm64" => &["arm64-v8a", "armeabi-v7a", "armeabi"],
        m if m.starts_with("armv7") || m.starts_with("armv8l") => &["armeabi-v7a", "armeabi"],
        m if m.starts_with("arm") => &["armeabi"],
        "riscv64" => &["riscv64"],
        "" => &[],
        other => return other.to_string(),
    };
    abis.join(", ")
}

pub fn get_uname() -> Result<Uname> {
    let utsname = unsafe {
        let mut info: libc::utsname = std::mem::zeroed();
        if libc::uname(&mut info) != 0 {
            return Err(anyhow!("Failed to get uname information"));
        }
        info
    };

    let to_string = |field: &[libc::c_char]| {
        unsafe { CStr::from_ptr(field.as_ptr()) }
            .to_str()
            .map(String::from)
            .context("Invalid UTF-8 in uname field")
    };

    Ok(Uname {
        sysname: to_string(&utsname.sysname)?,
        nodename: to_string(&utsname.nodename)?,
        release: to_string(&utsname.release)?,
        version: to_string(&utsname.version)?,
        machine: to_string(&utsname.machine)?,
    })
}

/// Parses `/etc/os-release` into unquoted `KEY=VALUE` pairs.
pub fn read_os_release(path: &Path) -> Option<Vec<(String, String)>> {
    let content = fs::read_to_string(path)
        .map_err(|e| debug!(path = %path.display(), error = %e, "os-release unavailable"))
        .ok()?;
    Some(
        parse_key_values(&content, '=')
            .into_iter()
            .filter(|(key, _)| !key.starts_with('#'))
            .map(|(key, value)| (key, value.trim_matches(&['"', '\''][..]).to_string()))
            .collect(),
    )
}

fn os_pretty_name(fields: &[(String, String)]) -> Option<String> {
    let get = |key: &str| {
        fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .filter(|v| !v.is_empty())
    };
    get("PRETTY_NAME").or_else(|| match (get("NAME"), get("VERSION")) {
        (Some(name), Some(version)) => Some(format!("{} {}", name, version)),
        (name, _) => name,
    })
}

fn read_device_tree_string(path: &Path) -> Option<String> {
    let raw = fs::read(path).ok()?;
    let text = String::from_utf8_lossy(&raw);
    non_empty(text.trim_end_matches('\0').to_string())
}

/// Returns the kind of virtualization detected, if any.
pub fn detect_virtualization(config: &ProbeConfig) -> Option<String> {
    if let Some(name) = hypervisor_name() {
        return Some(name.to_string());
    }

    if let Some(kind) = read_attr(config.sys_path("hypervisor/type")) {
        return Some(kind);
    }

    if let Ok(cpuinfo) = fs::read_to_string(config.proc_path("cpuinfo")) {
        let has_flag = parse_key_values(&cpuinfo, ':')
            .iter()
            .filter(|(key, _)| key == "flags" || key == "Features")
            .any(|(_, value)| value.split_whitespace().any(|f| f == "hypervisor"));
        if has_flag {
            return Some("Hypervisor".to_string());
        }
    }

    let init_cgroup = fs::read_to_string(config.proc_path("1/cgroup")).unwrap_or_default();
    container_marker(&init_cgroup)
}

/// Names the container runtime visible in init's cgroup paths.
fn container_marker(init_cgroup: &str) -> Option<String> {
    ["docker", "lxc", "kubepods", "containerd"]
        .iter()
        .find(|marker| init_cgroup.contains(*marker))
        .map(|marker| format!("Container: {}", marker))
}

#[cfg(target_arch = "x86_64")]
fn hypervisor_name() -> Option<&'static str> {
    use std::arch::x86_64::__cpuid;

    // Leaf 1 ECX bit 31 is the hypervisor-present bit.
    let basic = unsafe { __cpuid(1) };
    if basic.ecx & (1 << 31) == 0 {
        return None;
    }

    // Leaf 0x40000000 returns the hypervisor signature in EBX, ECX and EDX.
    let leaf = unsafe { __cpuid(0x40000000) };
    let signature = [leaf.ebx, leaf.ecx, leaf.edx];

    Some(match &signature {
        [0x56_4D_77_61, 0x72_65_56_4D, 0x77_61_72_65] => "VMware",
        [0x4D_69_63_72, 0x6F_73_6F_66, 0x74_20_48_76] => "Microsoft Hyper-V",
        [0x4B_56_4D_4B, 0x56_4D_4B_56, 0x4D_4B_56_4D] => "KVM",
        [0x58_65_6E_56, 0x4D_4D_58_65, 0x6E_56_4D_4D] => "Xen",
        _ => "Hypervisor",
    })
}

#[cfg(not(target_arch = "x86_64"))]
fn hypervisor_name() -> Option<&'static str> {
    None
}

/// Hardware addresses of all interfaces, skipping all-zero ones (loopback).
pub fn get_mac_addresses() -> Vec<String> {
    datalink::interfaces()
        .into_iter()
        .filter_map(|iface| iface.mac)
        .filter(|mac| *mac != MacAddr::zero())
        .map(|mac| mac.to_string())
        .collect()
}

pub fn read_bios_info<P: AsRef<Path>>(path: P) -> Result<BiosInfo> {
    let buffer = read_smbios_entry(path.as_ref())?;
    let strings = unformatted_section(&buffer)?;

    Ok(BiosInfo {
        vendor: extract_string(strings, byte_at(&buffer, 0x04)?)?,
        version: extract_string(strings, byte_at(&buffer, 0x05)?)?,
        release_date: extract_string(strings, byte_at(&buffer, 0x08)?)?,
    })
}

pub fn read_system_info<P: AsRef<Path>>(path: P) -> Result<SystemInfo> {
    let buffer = read_smbios_entry(path.as_ref())?;
    let strings = unformatted_section(&buffer)?;

    Ok(SystemInfo {
        manufacturer: extract_string(strings, byte_at(&buffer, 0x04)?)?,
        product_name: extract_string(strings, byte_at(&buffer, 0x05)?)?,
        serial_number: extract_string(strings, byte_at(&buffer, 0x07)?)?,
        uuid: buffer
            .get(0x08..0x18)
            .map(format_smbios_uuid)
            .unwrap_or_default(),
    })
}

fn read_smbios_entry(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn byte_at(buffer: &[u8], offset: usize) -> Result<u8> {
    buffer
        .get(offset)
        .copied()
        .ok_or_else(|| anyhow!("SMBIOS structure too short for offset {:#x}", offset))
}

/// The string table that follows the formatted area of a structure.
fn unformatted_section(buffer: &[u8]) -> Result<&[u8]> {
    let length = byte_at(buffer, 1)? as usize;
    buffer
        .get(length..)
        .ok_or_else(|| anyhow!("SMBIOS length {} exceeds structure size", length))
}

fn extract_string(unformatted: &[u8], index: u8) -> Result<String> {
    if index == 0 {
        return Ok(String::new());
    }

    unformatted
        .split(|&b| b == 0)
        .nth(index as usize - 1)
        .map(|s| String::from_utf8_lossy(s).trim().to_string())
        .ok_or_else(|| anyhow!("String {} not found", index))
}

/// Formats a 16 byte SMBIOS UUID. The first three fields are little-endian.
/// All-zero and all-ones UUIDs mean "not present".
fn format_smbios_uuid(b: &[u8]) -> String {
    if b.iter().all(|&x| x == 0) || b.iter().all(|&x| x == 0xff) {
        return String::new();
    }
    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        b[3], b[2], b[1], b[0],
        b[5], b[4],
        b[7], b[6],
        b[8], b[9],
        b[10], b[11], b[12], b[13], b[14], b[15]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_info::config::write_fixture;

    fn system_entry() -> Vec<u8> {
        let mut raw = vec![0u8; 0x1b];
        raw[0] = 1;
        raw[1] = 0x1b;
        raw[0x04] = 1;
        raw[0x05] = 2;
        raw[0x07] = 3;
        for (i, byte) in (0x08..0x18).zip(0u8..) {
            raw[i] = byte;
        }
        raw.extend_from_slice(b"ACME\0Rocket 9000\0SN-42\0\0");
        raw
    }

    #[test]
    fn test_read_system_info() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_fixture(dir.path(), "raw", system_entry());

        let info = read_system_info(dir.path().join("raw"))?;
        assert_eq!(info.manufacturer, "ACME");
        assert_eq!(info.product_name, "Rocket 9000");
        assert_eq!(info.serial_number, "SN-42");
        assert_eq!(info.uuid, "03020100-0504-0706-0809-0a0b0c0d0e0f");
        Ok(())
    }

    #[test]
    fn test_read_bios_info_rejects_truncated_entry() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_fixture(dir.path(), "raw", [0u8, 0x18, 0, 0]);
        assert!(read_bios_info(dir.path().join("raw")).is_err());
        assert!(read_bios_info(dir.path().join("missing")).is_err());
        Ok(())
    }

    #[test]
    fn test_extract_string() -> Result<()> {
        let section = b"first\0second\0\0";
        assert_eq!(extract_string(section, 0)?, "");
        assert_eq!(extract_string(section, 2)?, "second");
        assert!(extract_string(section, 5).is_err());
        Ok(())
    }

    #[test]
    fn test_absent_uuid_is_empty() {
        assert_eq!(format_smbios_uuid(&[0xff; 16]), "");
        assert_eq!(format_smbios_uuid(&[0; 16]), "");
    }

    #[test]
    fn test_supported_abis() {
        assert_eq!(supported_abis("x86_64"), "x86_64, x86");
        assert_eq!(supported_abis("aarch64"), "arm64-v8a, armeabi-v7a, armeabi");
        assert_eq!(supported_abis("armv7l"), "armeabi-v7a, armeabi");
        assert_eq!(supported_abis("s390x"), "s390x");
        assert_eq!(supported_abis(""), "");
    }

    #[test]
    fn test_os_release_pretty_name() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_fixture(
            dir.path(),
            "os-release",
            "# comment\nNAME=\"Debian GNU/Linux\"\nVERSION='12 (bookworm)'\n",
        );
        let fields = read_os_release(&dir.path().join("os-release")).unwrap();
        assert_eq!(
            os_pretty_name(&fields).as_deref(),
            Some("Debian GNU/Linux 12 (bookworm)")
        );

        write_fixture(dir.path(), "os-release", "PRETTY_NAME=\"Fedora Linux 40\"\n");
        let fields = read_os_release(&dir.path().join("os-release")).unwrap();
        assert_eq!(os_pretty_name(&fields).as_deref(), Some("Fedora Linux 40"));
        Ok(())
    }

    #[test]
    fn test_container_marker_from_init_cgroup() {
        assert_eq!(
            container_marker("0::/kubepods/besteffort/pod1\n").as_deref(),
            Some("Container: kubepods")
        );
        assert_eq!(
            container_marker("12:pids:/docker/4f3c\n").as_deref(),
            Some("Container: docker")
        );
        assert_eq!(container_marker("0::/init.scope\n"), None);
        assert_eq!(container_marker(""), None);
    }

    #[test]
    fn test_hypervisor_flag_in_cpuinfo() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_fixture(dir.path(), "proc/cpuinfo", "processor\t: 0\nflags\t: fpu hypervisor sse\n");
        let config = ProbeConfig::rooted_at(dir.path());
        // CPUID may already report a hypervisor on the test host.
        assert!(detect_virtualization(&config).is_some());
        Ok(())
    }

    #[test]
    fn test_device_section_uses_fixture_tree() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_fixture(dir.path(), "sys/firmware/dmi/entries/1-0/raw", system_entry());
        write_fixture(dir.path(), "sys/class/dmi/id/bios_vendor", "ACME BIOS\n");
        write_fixture(dir.path(), "sys/class/dmi/id/bios_version", "1.2.3\n");
        write_fixture(dir.path(), "etc/os-release", "PRETTY_NAME=\"Test OS\"\n");
        write_fixture(dir.path(), "etc/machine-id", "abc123\n");
        let config = ProbeConfig::rooted_at(dir.path());

        let sections = gather_device_info(&config);
        assert_eq!(sections.len(), 1);
        let device = &sections[0];
        assert_eq!(device.get("Manufacturer"), Some("ACME"));
        assert_eq!(device.get("Model"), Some("Rocket 9000"));
        assert_eq!(device.get("Bootloader"), Some("ACME BIOS 1.2.3"));
        assert_eq!(device.get("OS"), Some("Test OS"));
        assert_eq!(device.get("Machine ID"), Some("abc123"));
        assert_eq!(device.get("Screen"), Some("Unknown"));
        Ok(())
    }

    #[test]
    fn test_get_uname() -> Result<()> {
        let uname = get_uname()?;
        assert!(!uname.sysname.is_empty());
        assert!(!uname.machine.is_empty());
        Ok(())
    }
}
