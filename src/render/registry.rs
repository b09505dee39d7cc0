//! The registry of array versions, `previous_versions.json`.
//!
//! Every directory under the arrays root is one array version. A version is bound to the pair
//! of render configs it was first rendered with, and may never be reused with different ones.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use super::RenderConfig;
use crate::{
    errors::WsrDataErr,
    json_io::{read_json, write_json},
};

/// File name of the registry inside the arrays root.
pub const REGISTRY_FILE: &str = "previous_versions.json";

/// The render configs recorded for one array version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionConfigs {
    /// Standard channel set.
    pub array: RenderConfig,
    /// Dual polarization channel set.
    pub dualpol: RenderConfig,
}

/// Array versions recorded so far, loaded once per run.
#[derive(Debug)]
pub struct ArrayRegistry {
    root: PathBuf,
    versions: BTreeMap<String, VersionConfigs>,
}

impl ArrayRegistry {
    /// Open the registry under `arrays_root`, creating the root if needed. A missing registry
    /// file is an empty registry.
    pub fn open(arrays_root: &Path) -> Result<Self, WsrDataErr> {
        std::fs::create_dir_all(arrays_root)?;

        let path = arrays_root.join(REGISTRY_FILE);
        let versions = if path.is_file() {
            read_json(&path)?
        } else {
            BTreeMap::new()
        };

        Ok(ArrayRegistry {
            root: arrays_root.to_path_buf(),
            versions,
        })
    }

    /// The configs recorded for a version.
    pub fn get(&self, version: &str) -> Option<&VersionConfigs> {
        self.versions.get(version)
    }

    /// All recorded versions, sorted.
    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.versions.keys().map(String::as_str)
    }

    /// Every version directory on disk must be in the registry, otherwise the registry can not
    /// be trusted to detect conflicts and the arrays root needs manual cleaning.
    pub fn check_on_disk(&self) -> Result<(), WsrDataErr> {
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.versions.contains_key(&name) {
                return Err(WsrDataErr::UnregisteredArrayVersion(format!(
                    "{} is not recorded in {}",
                    entry.path().display(),
                    REGISTRY_FILE
                )));
            }
        }

        Ok(())
    }

    /// Check `version` against the registry, recording it when it is new, and return its
    /// array directory.
    pub fn check_or_register(
        &mut self,
        version: &str,
        configs: &VersionConfigs,
        indent: Option<usize>,
    ) -> Result<PathBuf, WsrDataErr> {
        if version.is_empty() {
            return Err(WsrDataErr::InvalidConfig(
                "array version must not be empty".to_owned(),
            ));
        }

        self.check_on_disk()?;

        match self.versions.get(version) {
            Some(recorded) if recorded != configs => {
                return Err(WsrDataErr::VersionConflict(format!(
                    "array version {} was recorded with a different render config",
                    version
                )));
            }
            Some(_) => {}
            None => {
                self.versions.insert(version.to_owned(), configs.clone());
                write_json(&self.root.join(REGISTRY_FILE), &self.versions, indent)?;
                log::info!("recorded new array version {}", version);
            }
        }

        let dir = self.root.join(version);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
#[cfg(test)]
mod unit {
    use super::*;

    use tempdir::TempDir;

    fn configs() -> VersionConfigs {
        VersionConfigs {
            array: RenderConfig::standard(),
            dualpol: RenderConfig::dualpol(),
        }
    }

    #[test]
    fn test_register_then_reuse() {
        let tmp = TempDir::new("wsrdata-test-registry").unwrap();

        let mut reg = ArrayRegistry::open(tmp.path()).unwrap();
        let dir = reg.check_or_register("v0.2.0", &configs(), None).unwrap();
        assert!(dir.is_dir());
        assert!(tmp.path().join(REGISTRY_FILE).is_file());

        // Reopened from disk, the same configs are accepted.
        let mut reg = ArrayRegistry::open(tmp.path()).unwrap();
        assert_eq!(reg.versions().collect::<Vec<_>>(), vec!["v0.2.0"]);
        assert!(reg.check_or_register("v0.2.0", &configs(), None).is_ok());
    }

    #[test]
    fn test_conflicting_config_is_rejected() {
        let tmp = TempDir::new("wsrdata-test-registry").unwrap();

        let mut reg = ArrayRegistry::open(tmp.path()).unwrap();
        reg.check_or_register("v0.2.0", &configs(), Some(2)).unwrap();

        let mut changed = configs();
        changed.array.dim = 800;

        let mut reg = ArrayRegistry::open(tmp.path()).unwrap();
        match reg.check_or_register("v0.2.0", &changed, None) {
            Err(WsrDataErr::VersionConflict(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(reg.get("v0.2.0"), Some(&configs()));
    }

    #[test]
    fn test_unregistered_directory_is_detected() {
        let tmp = TempDir::new("wsrdata-test-registry").unwrap();
        std::fs::create_dir_all(tmp.path().join("v0.0.9")).unwrap();
        std::fs::write(tmp.path().join(".gitignore"), "*\n").unwrap();

        let mut reg = ArrayRegistry::open(tmp.path()).unwrap();
        match reg.check_or_register("v0.2.0", &configs(), None) {
            Err(WsrDataErr::UnregisteredArrayVersion(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
        assert!(reg.get("v0.2.0").is_none());
    }
}
