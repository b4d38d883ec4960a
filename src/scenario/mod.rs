//! Declarative YAML suites
//!
//! A scenario file describes one suite: hooks and test cases made of
//! `rpc`, `create_block`, `query` and `skip` steps. Files are loaded,
//! validated without a node and turned into ordinary registry suites.

pub mod config;
pub mod runner;

use std::path::{Path, PathBuf};

use crate::assert::SnapshotStore;
use crate::common::{Error, Result};
use crate::registry::Suite;

pub use config::{ScenarioFile, ScenarioTest, Step};
pub use runner::{into_suite, load_scenario};

/// Expand directories into their `.yaml`/`.yml` files, sorted by name
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found = std::fs::read_dir(path)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_scenario(p))
                .collect::<Vec<_>>();
            found.sort();
            files.extend(found);
        } else if path.exists() {
            files.push(path.clone());
        } else {
            return Err(Error::FileRead {
                path: path.display().to_string(),
                error: "No such file or directory".to_string(),
            });
        }
    }
    Ok(files)
}

fn is_scenario(path: &Path) -> bool {
    path.is_file()
        && matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        )
}

/// Load every scenario under `paths` as registry suites
pub fn load_suites(paths: &[PathBuf], snapshots: &SnapshotStore) -> Result<Vec<Suite>> {
    collect_files(paths)?
        .iter()
        .map(|file| {
            tracing::debug!(path = %file.display(), "Loading scenario");
            into_suite(load_scenario(file)?, snapshots.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SUITE: &str = "id: D01\ntitle: t\ntests:\n  - id: T01\n    title: a\n    skip: later\n";

    #[test]
    fn test_collect_files_from_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.yaml"), SUITE).unwrap();
        std::fs::write(dir.path().join("a.yml"), SUITE).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let files = collect_files(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.yml", "b.yaml"]);
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let err = collect_files(&[PathBuf::from("/definitely/not/here.yaml")]).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }

    #[test]
    fn test_load_suites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("d01.yaml");
        std::fs::write(&path, SUITE).unwrap();

        let store = SnapshotStore::new(dir.path().join("snapshots"), false);
        let suites = load_suites(&[path], &store).unwrap();
        assert_eq!(suites.len(), 1);
        assert_eq!(suites[0].id(), "D01");
        assert_eq!(suites[0].cases().len(), 1);
    }

    #[test]
    fn test_invalid_scenario_names_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "id: D01\ntitle: t\ntests: []\nbefore_all:\n  - action: query\n    pallet: A\n    item: B\n    keys: [\"blake:0x00\"]\n").unwrap();

        let err = load_scenario(&path).unwrap_err();
        assert!(err.to_string().contains("broken.yaml"), "{err}");
    }
}
