//! Fixed arithmetic conversions from raw counters to display strings.

const KIB: f64 = 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Converts a `"<n> kB"` value to whole megabytes, rounding down.
///
/// Values without the `kB` suffix, or with a non-numeric prefix, are
/// returned unchanged.
pub fn kb_to_mb(value: &str) -> String {
    value
        .strip_suffix("kB")
        .and_then(|kb| kb.trim().parse::<u64>().ok())
        .map(|kb| format!("{} MB", kb / 1024))
        .unwrap_or_else(|| value.to_string())
}

/// Formats a byte count as gibibytes with two decimals, labelled "GB".
pub fn format_gb(bytes: u64) -> String {
    format!("{:.2} GB", bytes as f64 / GIB)
}

/// Formats a byte count with the largest binary unit that keeps it >= 1.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= KIB && unit < UNITS.len() - 1 {
        value /= KIB;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

pub fn format_mhz(khz: u64) -> String {
    format!("{:.2} MHz", khz as f64 / 1000.0)
}

/// Formats a temperature given in tenths of a degree Celsius.
pub fn format_celsius(tenths: i32) -> String {
    format!("{:.1} °C", tenths as f64 / 10.0)
}

/// Formats `level / scale` as a percentage. Returns `None` for a zero scale.
pub fn format_percent(level: i64, scale: i64) -> Option<String> {
    (scale > 0).then(|| format!("{:.1}%", level as f64 / scale as f64 * 100.0))
}
