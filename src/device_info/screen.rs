use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::config::{read_attr, ProbeConfig};
use super::edid::{parse_edid, DetailedTiming};
use super::property::{Property, Section, NOT_SUPPORTED, UNKNOWN};

const DRM_CLASS: &str = "class/drm";
const MM_PER_INCH: f64 = 25.4;
const CM_PER_INCH: f64 = 2.54;
/// Connector types wired to a built-in panel.
const INTERNAL_CONNECTORS: [&str; 3] = ["eDP", "LVDS", "DSI"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HdrType {
    DolbyVision,
    Hdr10,
    Hlg,
    Hdr10Plus,
}

impl HdrType {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::DolbyVision),
            2 => Some(Self::Hdr10),
            3 => Some(Self::Hlg),
            4 => Some(Self::Hdr10Plus),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::DolbyVision => "Dolby Vision",
            Self::Hdr10 => "HDR10",
            Self::Hlg => "HLG",
            Self::Hdr10Plus => "HDR10+",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    pub refresh_rate: Option<f64>,
    pub interlaced: bool,
}

impl DisplayMode {
    /// "1920x1080", "1920x1080i", or with the refresh rate appended.
    pub fn label(&self) -> String {
        let scan = if self.interlaced { "i" } else { "" };
        match self.refresh_rate {
            Some(hz) => format!("{}x{}{} @ {:.2} Hz", self.width, self.height, scan, hz),
            None => format!("{}x{}{}", self.width, self.height, scan),
        }
    }
}

impl From<&DetailedTiming> for DisplayMode {
    fn from(timing: &DetailedTiming) -> Self {
        Self {
            width: timing.width,
            height: timing.height,
            refresh_rate: Some(timing.refresh_hz),
            interlaced: timing.interlaced,
        }
    }
}

/// Everything the screen rows are computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplaySnapshot {
    pub name: String,
    pub width_px: u32,
    pub height_px: u32,
    pub physical_size_mm: Option<(f64, f64)>,
    pub refresh_rate: Option<f64>,
    pub modes: Vec<DisplayMode>,
    pub hdr_types: Vec<HdrType>,
}

impl DisplaySnapshot {
    fn size_inches(&self) -> Option<(f64, f64)> {
        self.physical_size_mm
            .filter(|(w, h)| *w > 0.0 && *h > 0.0)
            .map(|(w, h)| (w / MM_PER_INCH, h / MM_PER_INCH))
    }

    pub fn xdpi(&self) -> Option<f64> {
        self.size_inches().map(|(w, _)| self.width_px as f64 / w)
    }

    pub fn ydpi(&self) -> Option<f64> {
        self.size_inches().map(|(_, h)| self.height_px as f64 / h)
    }

    pub fn density_dpi(&self) -> Option<u32> {
        Some(((self.xdpi()? + self.ydpi()?) / 2.0).round() as u32)
    }

    pub fn diagonal_inches(&self) -> Option<f64> {
        let (w, h) = self.size_inches()?;
        Some(w.hypot(h))
    }

    pub fn ppi(&self) -> Option<f64> {
        let diagonal_px = (self.width_px as f64).hypot(self.height_px as f64);
        self.diagonal_inches()
            .filter(|inches| *inches > 0.0)
            .map(|inches| diagonal_px / inches)
    }

    /// One-line form used on the device overview.
    pub fn summary(&self) -> String {
        match self.density_dpi() {
            Some(dpi) => format!("{}x{} @ {}dpi", self.width_px, self.height_px, dpi),
            None => format!("{}x{}", self.width_px, self.height_px),
        }
    }
}

/// Android-style density bucket for a DPI value.
pub fn density_qualifier(dpi: u32) -> &'static str {
    match dpi {
        0..=139 => "ldpi",
        140..=199 => "mdpi",
        200..=279 => "hdpi",
        280..=399 => "xhdpi",
        400..=559 => "xxhdpi",
        560..=639 => "xxxhdpi",
        _ => "nodpi",
    }
}

pub fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

pub fn aspect_ratio(width: u32, height: u32) -> String {
    match gcd(width, height) {
        0 => UNKNOWN.to_string(),
        divisor => format!("{}:{}", width / divisor, height / divisor),
    }
}

pub fn orientation(width: u32, height: u32) -> &'static str {
    if width > height {
        "Landscape"
    } else if height > width {
        "Portrait"
    } else {
        "Square"
    }
}

/// Lists the supported HDR formats in a fixed order.
pub fn hdr_summary(types: &[HdrType]) -> String {
    if types.is_empty() {
        return NOT_SUPPORTED.to_string();
    }
    [
        HdrType::DolbyVision,
        HdrType::Hdr10,
        HdrType::Hlg,
        HdrType::Hdr10Plus,
    ]
    .into_iter()
    .filter(|t| types.contains(t))
    .map(|t| t.label())
    .collect::<Vec<_>>()
    .join(", ")
}

pub fn screen_properties(display: &DisplaySnapshot) -> Vec<Property> {
    let (width, height) = (display.width_px, display.height_px);
    let unknown = || UNKNOWN.to_string();

    let density = display
        .density_dpi()
        .map(|dpi| format!("{} dpi ({})", dpi, density_qualifier(dpi)))
        .unwrap_or_else(unknown);
    let ppi = display
        .ppi()
        .map(|ppi| format!("{:.1} ppi", ppi))
        .unwrap_or_else(unknown);
    let size = display
        .diagonal_inches()
        .map(|inches| format!("{:.1} inches", inches))
        .unwrap_or_else(unknown);
    let dimensions = display
        .size_inches()
        .map(|(w, h)| format!("{:.1} × {:.1} cm", h * CM_PER_INCH, w * CM_PER_INCH))
        .unwrap_or_else(unknown);
    let refresh = display
        .refresh_rate
        .map(|hz| format!("{:.2} Hz", hz))
        .unwrap_or_else(unknown);
    let dolby_vision = if display.hdr_types.contains(&HdrType::DolbyVision) {
        "Supported"
    } else {
        NOT_SUPPORTED
    };

    let mut props = vec![
        Property::new("Resolution", format!("{} x {} pixels", width, height)),
        Property::new("Density", density),
        Property::new("PPI", ppi),
        Property::new("Size", size),
        Property::new("Height × Width", dimensions),
        Property::new("Refresh Rate", refresh),
        Property::new("Orientation", orientation(width, height)),
        Property::new("Aspect Ratio", aspect_ratio(width, height)),
        Property::new("Available Display Modes", display.modes.len().to_string()),
    ];
    props.extend(
        display
            .modes
            .iter()
            .enumerate()
            .map(|(index, mode)| Property::new(format!("- Mode {}", index + 1), mode.label())),
    );
    props.push(Property::new("Dolby Vision Support", dolby_vision));
    props.push(Property::new("HDR", hdr_summary(&display.hdr_types)));
    props
}

pub fn gather_screen_info(config: &ProbeConfig) -> Vec<Section> {
    gather_displays(config)
        .iter()
        .map(|display| Section::new(format!("Screen {}", display.name), screen_properties(display)))
        .collect()
}

/// Connected DRM connectors: built-in panels first, then by connector name.
pub fn gather_displays(config: &ProbeConfig) -> Vec<DisplaySnapshot> {
    let drm = config.sys_path(DRM_CLASS);
    let mut connectors: Vec<_> = match fs::read_dir(&drm) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("card") && name.contains('-'))
            })
            .collect(),
        Err(e) => {
            debug!(path = %drm.display(), error = %e, "no DRM class");
            return Vec::new();
        }
    };
    connectors.sort_by_cached_key(|path| {
        let external = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(connector_name)
            .map_or(true, |name| !is_internal_connector(name));
        (external, path.clone())
    });

    connectors
        .iter()
        .filter(|path| read_attr(path.join("status")).as_deref() == Some("connected"))
        .filter_map(|path| read_connector(path))
        .collect()
}

/// "card0-eDP-1" -> "eDP-1"
fn connector_name(file_name: &str) -> &str {
    file_name
        .split_once('-')
        .map(|(_, connector)| connector)
        .unwrap_or(file_name)
}

fn is_internal_connector(name: &str) -> bool {
    INTERNAL_CONNECTORS
        .iter()
        .any(|kind| name.strip_prefix(kind).is_some_and(|rest| rest.is_empty() || rest.starts_with('-')))
}

fn read_connector(path: &Path) -> Option<DisplaySnapshot> {
    let name = connector_name(path.file_name()?.to_str()?).to_string();

    let listed_modes = fs::read_to_string(path.join("modes"))
        .map(|content| parse_modes(&content))
        .unwrap_or_default();

    let edid = fs::read(path.join("edid"))
        .ok()
        .filter(|raw| !raw.is_empty())
        .and_then(|raw| {
            parse_edid(&raw)
                .map_err(|e| debug!(connector = %name, error = %e, "unusable EDID"))
                .ok()
        });

    // Blank descriptor slots leave the EDID without timings; the kernel's
    // mode list still knows the resolution.
    let mut modes: Vec<DisplayMode> = edid
        .iter()
        .flat_map(|edid| edid.timings.iter())
        .map(DisplayMode::from)
        .collect();
    if modes.is_empty() {
        modes = listed_modes;
    }
    let preferred = modes.first()?.clone();

    Some(DisplaySnapshot {
        width_px: preferred.width,
        height_px: preferred.height,
        physical_size_mm: edid.as_ref().and_then(|edid| edid.physical_size_mm()),
        refresh_rate: preferred.refresh_rate,
        hdr_types: edid.map(|edid| edid.hdr_types).unwrap_or_default(),
        modes,
        name,
    })
}

/// Parses a connector's `modes` attribute ("1920x1080" or "1920x1080i" per
/// line), dropping duplicates while keeping the kernel's order.
fn parse_modes(content: &str) -> Vec<DisplayMode> {
    let mut modes: Vec<DisplayMode> = Vec::new();
    for line in content.lines() {
        let Some((w, h)) = line.trim().split_once('x') else {
            continue;
        };
        let digits = h.trim_end_matches(|c: char| !c.is_ascii_digit());
        let interlaced = h[digits.len()..].contains('i');
        if let (Ok(width), Ok(height)) = (w.parse(), digits.parse()) {
            let mode = DisplayMode {
                width,
                height,
                refresh_rate: None,
                interlaced,
            };
            if !modes.contains(&mode) {
                modes.push(mode);
            }
        }
    }
    modes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_info::config::write_fixture;
    use crate::device_info::edid::tests::sample_edid;
    use anyhow::Result;

    fn laptop_panel() -> DisplaySnapshot {
        DisplaySnapshot {
            name: "eDP-1".to_string(),
            width_px: 1920,
            height_px: 1080,
            physical_size_mm: Some((344.0, 194.0)),
            refresh_rate: Some(60.0),
            modes: vec![
                DisplayMode {
                    width: 1920,
                    height: 1080,
                    refresh_rate: Some(60.0),
                    interlaced: false,
                },
                DisplayMode {
                    width: 1280,
                    height: 720,
                    refresh_rate: None,
                    interlaced: false,
                },
            ],
            hdr_types: vec![HdrType::Hdr10],
        }
    }

    #[test]
    fn test_density_qualifier_boundaries() {
        assert_eq!(density_qualifier(120), "ldpi");
        assert_eq!(density_qualifier(139), "ldpi");
        assert_eq!(density_qualifier(140), "mdpi");
        assert_eq!(density_qualifier(159), "mdpi");
        assert_eq!(density_qualifier(160), "mdpi");
        assert_eq!(density_qualifier(200), "hdpi");
        assert_eq!(density_qualifier(280), "xhdpi");
        assert_eq!(density_qualifier(400), "xxhdpi");
        assert_eq!(density_qualifier(560), "xxxhdpi");
        assert_eq!(density_qualifier(640), "nodpi");
    }

    #[test]
    fn test_aspect_ratio() {
        assert_eq!(aspect_ratio(1920, 1080), "16:9");
        assert_eq!(aspect_ratio(2560, 1600), "8:5");
        assert_eq!(aspect_ratio(1080, 2400), "9:20");
        assert_eq!(aspect_ratio(0, 0), "Unknown");
    }

    #[test]
    fn test_orientation() {
        assert_eq!(orientation(1920, 1080), "Landscape");
        assert_eq!(orientation(1080, 1920), "Portrait");
        assert_eq!(orientation(1000, 1000), "Square");
    }

    #[test]
    fn test_hdr_summary_uses_fixed_order() {
        assert_eq!(hdr_summary(&[]), "Not supported");
        assert_eq!(
            hdr_summary(&[HdrType::Hdr10Plus, HdrType::Hlg, HdrType::DolbyVision]),
            "Dolby Vision, HLG, HDR10+"
        );
        assert_eq!(HdrType::from_code(2), Some(HdrType::Hdr10));
        assert_eq!(HdrType::from_code(9), None);
    }

    #[test]
    fn test_screen_properties_rows() {
        let props = screen_properties(&laptop_panel());
        let section = Section::new("Screen", props.clone());

        assert_eq!(props[0], Property::new("Resolution", "1920 x 1080 pixels"));
        assert_eq!(section.get("Density"), Some("142 dpi (mdpi)"));
        assert_eq!(section.get("Size"), Some("15.5 inches"));
        assert_eq!(section.get("Height × Width"), Some("19.4 × 34.4 cm"));
        assert_eq!(section.get("Refresh Rate"), Some("60.00 Hz"));
        assert_eq!(section.get("Aspect Ratio"), Some("16:9"));
        assert_eq!(section.get("Available Display Modes"), Some("2"));
        assert_eq!(section.get("- Mode 1"), Some("1920x1080 @ 60.00 Hz"));
        assert_eq!(section.get("- Mode 2"), Some("1280x720"));
        assert_eq!(section.get("Dolby Vision Support"), Some("Not supported"));
        assert_eq!(props.last(), Some(&Property::new("HDR", "HDR10")));
    }

    #[test]
    fn test_unknown_physical_size() {
        let mut panel = laptop_panel();
        panel.physical_size_mm = None;
        let section = Section::new("Screen", screen_properties(&panel));
        assert_eq!(section.get("Density"), Some("Unknown"));
        assert_eq!(section.get("PPI"), Some("Unknown"));
        assert_eq!(section.get("Size"), Some("Unknown"));
        assert_eq!(panel.summary(), "1920x1080");
    }

    #[test]
    fn test_gather_displays_from_drm_tree() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();
        write_fixture(root, "sys/class/drm/card0-eDP-1/status", "connected\n");
        write_fixture(root, "sys/class/drm/card0-eDP-1/edid", sample_edid(true));
        write_fixture(root, "sys/class/drm/card0-HDMI-A-1/status", "connected\n");
        write_fixture(root, "sys/class/drm/card0-HDMI-A-1/edid", "");
        write_fixture(
            root,
            "sys/class/drm/card0-HDMI-A-1/modes",
            "3840x2160\n3840x2160\n1920x1080i\n",
        );
        write_fixture(root, "sys/class/drm/card0-DP-1/status", "disconnected\n");
        write_fixture(root, "sys/class/drm/version", "drm 1.1.0\n");
        let config = ProbeConfig::rooted_at(root);

        let displays = gather_displays(&config);
        assert_eq!(displays.len(), 2);

        // The built-in panel comes first even though "HDMI" sorts before "eDP".
        let panel = &displays[0];
        assert_eq!(panel.name, "eDP-1");
        assert_eq!(panel.summary(), "1920x1080 @ 142dpi");
        assert_eq!(
            panel.hdr_types,
            vec![HdrType::DolbyVision, HdrType::Hdr10, HdrType::Hlg]
        );

        let external = &displays[1];
        assert_eq!(external.name, "HDMI-A-1");
        assert_eq!((external.width_px, external.height_px), (3840, 2160));
        assert_eq!(external.modes.len(), 2);
        assert!(external.modes[1].interlaced);
        assert_eq!(external.physical_size_mm, None);

        let sections = gather_screen_info(&config);
        assert_eq!(sections[0].title, "Screen eDP-1");
        assert_eq!(sections[0].get("Dolby Vision Support"), Some("Supported"));
        assert_eq!(sections[0].get("HDR"), Some("Dolby Vision, HDR10, HLG"));
        assert_eq!(sections[1].get("- Mode 2"), Some("1920x1080i"));
        Ok(())
    }

    #[test]
    fn test_internal_connectors_sort_first() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();
        for connector in ["card0-DP-2", "card0-HDMI-A-1", "card1-DSI-1", "card0-LVDS-1"] {
            write_fixture(root, &format!("sys/class/drm/{}/status", connector), "connected\n");
            write_fixture(root, &format!("sys/class/drm/{}/modes", connector), "1280x800\n");
        }

        let names: Vec<_> = gather_displays(&ProbeConfig::rooted_at(root))
            .into_iter()
            .map(|display| display.name)
            .collect();
        assert_eq!(names, ["LVDS-1", "DSI-1", "DP-2", "HDMI-A-1"]);
        assert!(!is_internal_connector("eDPX-1"));
        Ok(())
    }

    #[test]
    fn test_edid_without_timings_uses_listed_modes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();
        let mut edid = sample_edid(false);
        edid[54..90].fill(0);
        write_fixture(root, "sys/class/drm/card0-DP-1/status", "connected\n");
        write_fixture(root, "sys/class/drm/card0-DP-1/edid", edid);
        write_fixture(root, "sys/class/drm/card0-DP-1/modes", "2560x1440\n1920x1080\n");
        let config = ProbeConfig::rooted_at(root);

        let displays = gather_displays(&config);
        assert_eq!(displays.len(), 1);
        let display = &displays[0];
        assert_eq!((display.width_px, display.height_px), (2560, 1440));
        assert_eq!(display.refresh_rate, None);
        assert_eq!(display.modes.len(), 2);
        // Size comes from the base block's centimetre fields.
        assert_eq!(display.physical_size_mm, Some((340.0, 190.0)));
        Ok(())
    }

    #[test]
    fn test_parse_modes_keeps_interlaced_apart() {
        let modes = parse_modes("1920x1080\n1920x1080i\n1920x1080\nbogus\n");
        let labels: Vec<_> = modes.iter().map(DisplayMode::label).collect();
        assert_eq!(labels, ["1920x1080", "1920x1080i"]);
    }

    #[test]
    fn test_no_drm_class_is_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(gather_screen_info(&ProbeConfig::rooted_at(dir.path())).is_empty());
        Ok(())
    }
}
