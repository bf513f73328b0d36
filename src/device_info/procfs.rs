//! Parsers for the colon-delimited text tables exposed under `/proc`.
//!
//! Parsing is split from reading so every parser can be tested with string
//! inputs. Readers never fail: an unreadable file is treated as an empty one.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::property::Property;
use super::units::kb_to_mb;

/// One logical CPU parsed from a `/proc/cpuinfo` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuCore {
    pub processor: String,
    pub properties: Vec<Property>,
}

/// Splits each line at the first `delimiter` into a trimmed key/value pair.
///
/// Lines without the delimiter are skipped.
pub fn parse_key_values(content: &str, delimiter: char) -> Vec<(String, String)> {
    content
        .lines()
        .filter_map(|line| line.split_once(delimiter))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Extracts the keys listed in `labels` (raw key, display label), in file order.
///
/// Values with a `kB` suffix are converted to MB.
pub fn parse_table(content: &str, labels: &[(&str, &str)]) -> Vec<Property> {
    parse_key_values(content, ':')
        .into_iter()
        .filter_map(|(key, value)| {
            labels
                .iter()
                .find(|(raw, _)| *raw == key)
                .map(|(_, label)| Property::new(*label, kb_to_mb(&value)))
        })
        .collect()
}

/// Reads and parses a table file. Any I/O error yields an empty list.
pub fn read_table<P: AsRef<Path>>(path: P, labels: &[(&str, &str)]) -> Vec<Property> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(content) => parse_table(&content, labels),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "table unavailable");
            Vec::new()
        }
    }
}

/// Looks up the first value for `key` (case-insensitive) anywhere in a table.
pub fn find_value(content: &str, key: &str) -> Option<String> {
    parse_key_values(content, ':')
        .into_iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}

/// Parses blank-line separated `/proc/cpuinfo` blocks into cores.
///
/// Blocks without a `processor` key are skipped.
pub fn parse_cpu_blocks(content: &str) -> Vec<CpuCore> {
    split_blocks(content)
        .into_iter()
        .filter_map(|block| {
            let mut processor = None;
            let mut properties = Vec::new();

            for (key, value) in parse_key_values(&block, ':') {
                if key.eq_ignore_ascii_case("processor") {
                    processor = Some(value);
                } else {
                    properties.push(Property::new(normalize_key(&key), value));
                }
            }

            processor.map(|processor| CpuCore {
                processor,
                properties,
            })
        })
        .collect()
}

fn split_blocks(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();

    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

/// Drops every `"CPU "` (any case) from a key and capitalizes it.
pub fn normalize_key(key: &str) -> String {
    const PREFIX: &str = "cpu ";

    let mut stripped = String::with_capacity(key.len());
    let mut rest = key.trim();
    while let Some(pos) = rest.to_ascii_lowercase().find(PREFIX) {
        stripped.push_str(&rest[..pos]);
        rest = &rest[pos + PREFIX.len()..];
    }
    stripped.push_str(rest);

    let mut chars = stripped.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => stripped,
    }
}
