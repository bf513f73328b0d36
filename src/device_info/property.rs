use serde::{Deserialize, Serialize};

/// Placeholder for a value that could not be determined.
pub const UNKNOWN: &str = "Unknown";
/// Placeholder for a capability the device does not have.
pub const NOT_SUPPORTED: &str = "Not supported";

/// A single label/value display row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub label: String,
    pub value: String,
}

impl Property {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// A named, ordered group of properties (one per CPU core, camera, display...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub properties: Vec<Property>,
}

impl Section {
    pub fn new(title: impl Into<String>, properties: Vec<Property>) -> Self {
        Self {
            title: title.into(),
            properties,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Returns the value of the first property with the given label.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.label == label)
            .map(|p| p.value.as_str())
    }
}

/// Formats a yes/no flag.
pub fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

/// Formats an optional yes/no flag, falling back to [`UNKNOWN`].
pub fn yes_no_unknown(flag: Option<bool>) -> &'static str {
    flag.map(yes_no).unwrap_or(UNKNOWN)
}
