use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Filesystem roots the collectors read from.
///
/// The defaults point at the running system. Tests and offline inspection
/// point them at a copied tree instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub proc_root: PathBuf,
    pub sys_root: PathBuf,
    pub etc_root: PathBuf,
    /// Mount point whose filesystem statistics are reported as "Storage".
    pub storage_path: PathBuf,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            sys_root: PathBuf::from("/sys"),
            etc_root: PathBuf::from("/etc"),
            storage_path: PathBuf::from("/"),
        }
    }
}

impl ProbeConfig {
    /// Loads a JSON config file. Missing keys keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Builds a config whose `/proc`, `/sys` and `/etc` live under one directory.
    pub fn rooted_at<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref();
        Self {
            proc_root: root.join("proc"),
            sys_root: root.join("sys"),
            etc_root: root.join("etc"),
            storage_path: root.to_path_buf(),
        }
    }

    pub fn proc_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.proc_root.join(rel)
    }

    pub fn sys_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.sys_root.join(rel)
    }

    pub fn etc_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.etc_root.join(rel)
    }
}

/// Reads a small text attribute (sysfs, procfs) and trims it.
pub(crate) fn read_trimmed<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(content.trim().to_string())
}

/// Like [`read_trimmed`], but an empty attribute counts as missing.
pub(crate) fn read_attr<P: AsRef<Path>>(path: P) -> Option<String> {
    read_trimmed(path).ok().filter(|s| !s.is_empty())
}

#[cfg(test)]
pub(crate) fn write_fixture(root: &Path, rel: &str, content: impl AsRef<[u8]>) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}
