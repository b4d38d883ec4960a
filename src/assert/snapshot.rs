//! On-disk JSON snapshots
//!
//! The first assertion for a key records the value; later assertions
//! compare byte-for-byte against the recorded file. Update mode rewrites.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::common::config::Config;
use crate::common::paths::{ensure_dir, sanitize_file_stem};
use crate::common::{Error, Result};

/// Directory of snapshot files
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    update: bool,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, update: bool) -> Self {
        Self {
            dir: dir.into(),
            update,
        }
    }

    /// Store configured by `[snapshots]` and `HARNESS_UPDATE_SNAPSHOTS`
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.snapshots.dir.clone(), config.update_snapshots())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the snapshot for `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_file_stem(key)))
    }

    /// Compare `actual` with the snapshot stored under `key`
    pub fn assert_matches_snapshot<T: Serialize + ?Sized>(&self, actual: &T, key: &str) -> Result<()> {
        let mut rendered = serde_json::to_string_pretty(actual)?;
        rendered.push('\n');
        let path = self.path_for(key);

        if self.update || !path.exists() {
            ensure_dir(&self.dir)?;
            std::fs::write(&path, &rendered)?;
            tracing::info!(key, path = %path.display(), "Snapshot written");
            return Ok(());
        }

        let recorded = std::fs::read_to_string(&path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        if recorded == rendered {
            Ok(())
        } else {
            Err(Error::Assertion(format!(
                "snapshot '{}' differs ({})\nexpected: {}\nactual: {}",
                key,
                path.display(),
                recorded.trim_end(),
                rendered.trim_end()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_first_run_records_then_compares() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("snaps"), false);
        let value = json!({"free": "0x10", "nonce": 0});

        store.assert_matches_snapshot(&value, "account/alith").unwrap();
        assert!(store.path_for("account/alith").exists());
        let written = std::fs::read_to_string(store.path_for("account/alith")).unwrap();

        store.assert_matches_snapshot(&value, "account/alith").unwrap();
        let again = std::fs::read_to_string(store.path_for("account/alith")).unwrap();
        assert_eq!(written, again);

        let err = store
            .assert_matches_snapshot(&json!({"free": "0x11", "nonce": 0}), "account/alith")
            .unwrap_err();
        assert!(matches!(err, Error::Assertion(ref m) if m.contains("0x11")));
    }

    #[test]
    fn test_update_mode_rewrites() {
        let dir = TempDir::new().unwrap();
        SnapshotStore::new(dir.path(), false)
            .assert_matches_snapshot(&json!(1), "k")
            .unwrap();
        let updating = SnapshotStore::new(dir.path(), true);
        updating.assert_matches_snapshot(&json!(2), "k").unwrap();
        SnapshotStore::new(dir.path(), false)
            .assert_matches_snapshot(&json!(2), "k")
            .unwrap();
    }

    #[test]
    fn test_keys_cannot_escape_dir() {
        let store = SnapshotStore::new("/tmp/snaps", false);
        assert_eq!(store.path_for("../etc/passwd"), PathBuf::from("/tmp/snaps/.._etc_passwd.json"));
        assert_eq!(store.path_for(".."), PathBuf::from("/tmp/snaps/_.json"));
    }
}
