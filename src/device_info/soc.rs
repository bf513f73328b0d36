use anyhow::{Context, Result};
use std::fs;
use std::thread;
use tracing::debug;

use super::config::{read_attr, read_trimmed, ProbeConfig};
use super::device::{get_uname, supported_abis};
use super::procfs::{find_value, parse_cpu_blocks, CpuCore};
use super::property::{Property, Section, UNKNOWN};
use super::units::format_mhz;

const CPUINFO: &str = "cpuinfo";

#[derive(Debug, Clone, Copy)]
enum FrequencyBound {
    Min,
    Max,
}

impl FrequencyBound {
    fn file_name(self) -> &'static str {
        match self {
            Self::Min => "cpuinfo_min_freq",
            Self::Max => "cpuinfo_max_freq",
        }
    }
}

/// General SoC section followed by one section per logical CPU.
pub fn gather_soc_info(config: &ProbeConfig) -> Vec<Section> {
    let cpuinfo = fs::read_to_string(config.proc_path(CPUINFO)).unwrap_or_else(|e| {
        debug!(error = %e, "cpuinfo unavailable");
        String::new()
    });

    let mut sections = vec![Section::new(
        "System Information",
        general_properties(config, &cpuinfo),
    )];
    sections.extend(
        cores_with_speeds(config, parse_cpu_blocks(&cpuinfo))
            .into_iter()
            .map(|core| Section::new(format!("Core {}", core.processor), core.properties)),
    );
    sections
}

/// Parses `/proc/cpuinfo` and prepends each core's frequency bounds.
pub fn gather_cpu_cores(config: &ProbeConfig) -> Vec<CpuCore> {
    match fs::read_to_string(config.proc_path(CPUINFO)) {
        Ok(cpuinfo) => cores_with_speeds(config, parse_cpu_blocks(&cpuinfo)),
        Err(e) => {
            debug!(error = %e, "cpuinfo unavailable");
            Vec::new()
        }
    }
}

fn cores_with_speeds(config: &ProbeConfig, cores: Vec<CpuCore>) -> Vec<CpuCore> {
    cores
        .into_iter()
        .map(|mut core| {
            let index = core.processor.parse::<u32>().unwrap_or(0);
            let mut properties = vec![
                Property::new("Min Speed", cpu_speed(config, index, FrequencyBound::Min)),
                Property::new("Max Speed", cpu_speed(config, index, FrequencyBound::Max)),
            ];
            properties.append(&mut core.properties);
            core.properties = properties;
            core
        })
        .collect()
}

fn cpu_speed(config: &ProbeConfig, cpu: u32, bound: FrequencyBound) -> String {
    read_cpu_khz(config, cpu, bound)
        .map(format_mhz)
        .unwrap_or_else(|e| {
            debug!(cpu, error = %e, "cpu frequency unavailable");
            UNKNOWN.to_string()
        })
}

fn read_cpu_khz(config: &ProbeConfig, cpu: u32, bound: FrequencyBound) -> Result<u64> {
    let path = config.sys_path(format!(
        "devices/system/cpu/cpu{}/cpufreq/{}",
        cpu,
        bound.file_name()
    ));
    let raw = read_trimmed(&path)?;
    raw.parse()
        .with_context(|| format!("Invalid frequency {:?} in {}", raw, path.display()))
}

fn general_properties(config: &ProbeConfig, cpuinfo: &str) -> Vec<Property> {
    let soc = |name: &str| read_attr(config.sys_path("devices/soc0").join(name));
    let dmi = |name: &str| read_attr(config.sys_path("class/dmi/id").join(name));
    let device_tree_model = || {
        fs::read(config.sys_path("firmware/devicetree/base/model"))
            .ok()
            .map(|raw| String::from_utf8_lossy(&raw).trim_end_matches('\0').trim().to_string())
            .filter(|model| !model.is_empty())
    };

    let machine = get_uname().map(|uname| uname.machine).unwrap_or_default();
    let cores = thread::available_parallelism()
        .map(|n| n.get().to_string())
        .unwrap_or_else(|_| UNKNOWN.to_string());

    let rows = [
        (
            "Hardware",
            find_value(cpuinfo, "Hardware").or_else(|| find_value(cpuinfo, "model name")),
        ),
        ("SOC Model", soc("machine").or_else(|| soc("soc_id"))),
        ("SOC Manufacturer", soc("family")),
        ("Board", dmi("board_name").or_else(device_tree_model)),
        ("Brand", dmi("sys_vendor").or_else(|| dmi("board_vendor"))),
        ("Device", dmi("product_name")),
        ("Product", dmi("product_family").or_else(|| dmi("product_version"))),
        ("Architecture", Some(machine.clone()).filter(|m| !m.is_empty())),
        (
            "Supported ABIs",
            Some(supported_abis(&machine)).filter(|abis| !abis.is_empty()),
        ),
        ("CPU Cores", Some(cores)),
    ];

    rows.into_iter()
        .map(|(label, value)| Property::new(label, value.unwrap_or_else(|| UNKNOWN.to_string())))
        .collect()
}
