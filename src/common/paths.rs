//! Configuration, log and snapshot paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/chain-harness/`, `~/.local/share/chain-harness/logs`
//! - macOS: `~/Library/Application Support/chain-harness/`
//! - Windows: `%APPDATA%\chain-harness\`

use std::io;
use std::path::{Path, PathBuf};

/// Name used for the config and data directories
const APP_NAME: &str = "chain-harness";

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV: &str = "HARNESS_CONFIG";

/// Default snapshot directory, relative to the working directory
pub const DEFAULT_SNAPSHOT_DIR: &str = "snapshots";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
///
/// `HARNESS_CONFIG` wins over the platform config directory.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.data_dir().join("logs"))
}

/// Ensure a directory exists, creating parents as needed
pub fn ensure_dir(dir: &Path) -> io::Result<PathBuf> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(dir.to_path_buf())
}

/// Turn an arbitrary identifier into a safe file stem
///
/// Keeps ASCII alphanumerics, `-`, `_` and `.`; everything else becomes `_`.
pub fn sanitize_file_stem(key: &str) -> String {
    let stem: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() || stem.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_is_valid() {
        let dir = config_dir();
        assert!(dir.is_some());
    }

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(sanitize_file_stem("D0305/T01 balance"), "D0305_T01_balance");
        assert_eq!(sanitize_file_stem("S22.candidates"), "S22.candidates");
        assert_eq!(sanitize_file_stem(".."), "_");
    }
}
