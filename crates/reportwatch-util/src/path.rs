//! Path utilities.
//!
//! This module provides utilities for working with file paths.

use std::path::{Component, Path, PathBuf};

/// Get the reportwatch configuration directory.
///
/// This follows XDG conventions on Linux/macOS:
/// - `$XDG_CONFIG_HOME/reportwatch` if set
/// - `~/.config/reportwatch` otherwise
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("reportwatch"))
}

/// Get the reportwatch data directory.
///
/// The audit trail lives under `<data_dir>/data` unless configured otherwise.
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|p| p.join("reportwatch"))
}

/// Get the reportwatch logs directory.
pub fn logs_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        if let Some(state_dir) = dirs::state_dir() {
            return Some(state_dir.join("reportwatch").join("logs"));
        }
    }

    data_dir().map(|p| p.join("logs"))
}

/// Render `path` relative to `base` with `/` separators on every platform.
///
/// Returns `None` if the path is not within the base directory.
pub fn relative_id(path: &Path, base: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            _ => return None,
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Whether a file name is hidden or an office owner/lock file (`~$report.xlsx`).
pub fn is_ignored_name(name: &str) -> bool {
    name.starts_with('.') || name.starts_with("~$")
}
