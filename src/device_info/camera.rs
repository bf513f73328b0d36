use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::config::{read_attr, ProbeConfig};
use super::property::{yes_no_unknown, Property, Section, UNKNOWN};

const VIDEO4LINUX_CLASS: &str = "class/video4linux";
const AF_MODE_OFF: i32 = 0;
const OIS_MODE_OFF: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LensFacing {
    Front,
    Back,
    External,
    Unknown,
}

impl LensFacing {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Front,
            1 => Self::Back,
            2 => Self::External,
            _ => Self::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Front => "Front",
            Self::Back => "Back",
            Self::External => "External",
            Self::Unknown => UNKNOWN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardwareLevel {
    Limited,
    Full,
    Legacy,
    Level3,
    External,
    Unknown,
}

impl HardwareLevel {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Limited,
            1 => Self::Full,
            2 => Self::Legacy,
            3 => Self::Level3,
            4 => Self::External,
            _ => Self::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Limited => "Limited",
            Self::Full => "Full",
            Self::Legacy => "Legacy",
            Self::Level3 => "Level 3",
            Self::External => "External",
            Self::Unknown => UNKNOWN,
        }
    }
}

/// Camera characteristics as reported by the platform. Empty or `None`
/// fields are ones the platform did not report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSnapshot {
    pub id: String,
    pub name: Option<String>,
    pub lens_facing: LensFacing,
    pub hardware_level: HardwareLevel,
    pub flash_available: Option<bool>,
    pub sensor_orientation: Option<u32>,
    pub focal_lengths: Vec<f32>,
    pub af_modes: Option<Vec<i32>>,
    pub max_digital_zoom: Option<f32>,
    pub ois_modes: Option<Vec<i32>>,
}

pub fn camera_properties(camera: &CameraSnapshot) -> Vec<Property> {
    let flash = match camera.flash_available {
        Some(true) => "Available",
        Some(false) => "Not available",
        None => UNKNOWN,
    };
    let orientation = camera
        .sensor_orientation
        .map(|degrees| format!("{}°", degrees))
        .unwrap_or_else(|| "N/A".to_string());
    let any_enabled = |modes: &Option<Vec<i32>>, off: i32| {
        modes.as_ref().map(|modes| modes.iter().any(|&mode| mode != off))
    };

    let mut props = vec![
        Property::new("Direction", camera.lens_facing.label()),
        Property::new("Hardware Level", camera.hardware_level.label()),
        Property::new("Flash", flash),
        Property::new("Sensor Orientation", orientation),
    ];
    if let Some(focal) = camera.focal_lengths.first() {
        props.push(Property::new("Focal Length", format!("{}mm", focal)));
    }
    props.push(Property::new(
        "Autofocus",
        yes_no_unknown(any_enabled(&camera.af_modes, AF_MODE_OFF)),
    ));
    props.push(Property::new(
        "Max Zoom",
        format!("{:.1}x", camera.max_digital_zoom.unwrap_or(1.0)),
    ));
    props.push(Property::new(
        "OIS",
        yes_no_unknown(any_enabled(&camera.ois_modes, OIS_MODE_OFF)),
    ));
    if let Some(name) = &camera.name {
        props.push(Property::new("Name", name.clone()));
    }
    props
}

pub fn gather_camera_info(config: &ProbeConfig) -> Vec<Section> {
    read_cameras(config)
        .iter()
        .map(|camera| Section::new(format!("Camera {}", camera.id), camera_properties(camera)))
        .collect()
}

/// V4L2 capture devices, one per `videoN` node with stream index 0.
pub fn read_cameras(config: &ProbeConfig) -> Vec<CameraSnapshot> {
    let class_dir = config.sys_path(VIDEO4LINUX_CLASS);
    let entries = match fs::read_dir(&class_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(path = %class_dir.display(), error = %e, "no video4linux class");
            return Vec::new();
        }
    };

    let mut nodes: Vec<(u32, std::path::PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name();
            let index = name.to_str()?.strip_prefix("video")?.parse().ok()?;
            Some((index, entry.path()))
        })
        .collect();
    nodes.sort();

    nodes
        .into_iter()
        .filter(|(_, path)| read_attr(path.join("index")).map_or(true, |index| index == "0"))
        .map(|(index, path)| read_camera(index, &path))
        .collect()
}

fn read_camera(index: u32, node: &Path) -> CameraSnapshot {
    let device = node.join("device");
    let is_usb = fs::read_link(device.join("subsystem"))
        .ok()
        .and_then(|target| target.file_name().map(|name| name == "usb"))
        .unwrap_or(false);

    let of_node = device.join("of_node");
    let (lens_facing, hardware_level) = if is_usb {
        (LensFacing::External, HardwareLevel::External)
    } else {
        let facing = read_be_u32(&of_node.join("orientation"))
            .map(|code| LensFacing::from_code(code as i32))
            .unwrap_or(LensFacing::Unknown);
        (facing, HardwareLevel::Unknown)
    };

    CameraSnapshot {
        id: index.to_string(),
        name: read_attr(node.join("name")),
        lens_facing,
        hardware_level,
        flash_available: None,
        sensor_orientation: read_be_u32(&of_node.join("rotation")),
        focal_lengths: Vec::new(),
        af_modes: None,
        max_digital_zoom: None,
        ois_modes: None,
    }
}

/// Reads a single-cell device-tree property (big-endian u32).
fn read_be_u32(path: &Path) -> Option<u32> {
    let raw = fs::read(path).ok()?;
    let cell: [u8; 4] = raw.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(cell))
}
