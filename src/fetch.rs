//! Materialize remote scans into the local scan directory.

use std::path::{Component, Path, PathBuf};

use crate::{errors::WsrDataErr, report::AttemptLog, store::ObjectStore};

/// Outcome of fetching a batch of keys.
#[derive(Debug, Default, PartialEq)]
pub struct FetchReport {
    /// Keys downloaded during this run.
    pub fetched: Vec<String>,
    /// Keys already present locally and not requested from the store.
    pub present: Vec<String>,
    /// Keys the store does not have.
    pub not_found: Vec<String>,
    /// Keys that failed for any other reason, with the error message.
    pub errors: Vec<(String, String)>,
}

/// The local path that mirrors a remote key.
///
/// Every `/` separated part of the key must be a plain name, so the path never leaves `root`.
pub fn local_path(root: &Path, key: &str) -> Result<PathBuf, WsrDataErr> {
    let mut path = root.to_path_buf();
    for part in key.split('/') {
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if name == part => path.push(name),
            _ => {
                return Err(WsrDataErr::MalformedKey(format!(
                    "{} is not a relative path of plain names",
                    key
                )))
            }
        }
    }
    Ok(path)
}

/// Fetch every key that is not already present under `root`.
///
/// Presence of the local file is taken as proof of an earlier successful fetch; nothing is
/// verified. A failure on one key never stops the batch.
pub fn fetch_keys(
    store: &dyn ObjectStore,
    keys: &[String],
    root: &Path,
    mut log: Option<&mut AttemptLog>,
) -> Result<FetchReport, WsrDataErr> {
    let mut report = FetchReport::default();

    for key in keys {
        let dest = match local_path(root, key) {
            Ok(dest) => dest,
            Err(err) => {
                if let Some(log) = log.as_deref_mut() {
                    log.error(&format!("Exception while processing scan {} - {}", key, err))?;
                }
                report.errors.push((key.clone(), err.to_string()));
                continue;
            }
        };

        if dest.is_file() {
            report.present.push(key.clone());
            continue;
        }

        let result = dest
            .parent()
            .map(std::fs::create_dir_all)
            .unwrap_or(Ok(()))
            .map_err(WsrDataErr::from)
            .and_then(|_| store.fetch(key, &dest));

        match result {
            Ok(()) => {
                if let Some(log) = log.as_deref_mut() {
                    log.info(&format!("Downloaded scan {}", key))?;
                }
                report.fetched.push(key.clone());
            }
            Err(err) if err.is_not_found() => {
                if let Some(log) = log.as_deref_mut() {
                    log.error(&format!("Error Scan {} not found in s3, adding to list", key))?;
                }
                report.not_found.push(key.clone());
            }
            Err(err) => {
                if let Some(log) = log.as_deref_mut() {
                    log.error(&format!("Exception while processing scan {} - {}", key, err))?;
                }
                report.errors.push((key.clone(), err.to_string()));
            }
        }
    }

    Ok(report)
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
#[cfg(test)]
mod unit {
    use super::*;

    use crate::store::memory::MemoryStore;
    use tempdir::TempDir;

    const K1: &str = "2013/07/21/KOKX/KOKX20130721_093320_V06.gz";
    const K2: &str = "2013/07/21/KOKX/KOKX20130721_093820_V06.gz";
    const MISSING: &str = "2013/07/21/KOKX/KOKX20130721_094320_V06.gz";

    #[test]
    fn test_fetch_is_idempotent() {
        let tmp = TempDir::new("wsrdata-test-fetch").unwrap();
        let store = MemoryStore::with_keys(&[K1, K2]);
        let keys = vec![K1.to_owned(), K2.to_owned()];

        let first = fetch_keys(&store, &keys, tmp.path(), None).unwrap();
        assert_eq!(first.fetched.len(), 2);
        assert_eq!(store.fetches.get(), 2);
        assert!(local_path(tmp.path(), K1).unwrap().is_file());

        let second = fetch_keys(&store, &keys, tmp.path(), None).unwrap();
        assert_eq!(store.fetches.get(), 2);
        assert!(second.fetched.is_empty());
        assert_eq!(second.present, keys);
    }

    #[test]
    fn test_failures_are_partitioned_and_do_not_abort() {
        let tmp = TempDir::new("wsrdata-test-fetch").unwrap();
        let mut store = MemoryStore::with_keys(&[K1, K2]);
        store.broken.push(K1.to_owned());

        let log_path = tmp.path().join("logs").join("v0.1.0.log");
        let mut log = AttemptLog::open(&log_path, "scan_list.txt").unwrap();

        let keys = vec![K1.to_owned(), MISSING.to_owned(), K2.to_owned()];
        let report = fetch_keys(&store, &keys, &tmp.path().join("scans"), Some(&mut log)).unwrap();

        assert_eq!(report.fetched, vec![K2.to_owned()]);
        assert_eq!(report.not_found, vec![MISSING.to_owned()]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, K1);

        assert!(!local_path(&tmp.path().join("scans"), MISSING).unwrap().exists());

        let text = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_keys_stay_under_root() {
        let tmp = TempDir::new("wsrdata-test-fetch").unwrap();
        let root = tmp.path().join("scans");

        for key in &["../../x", "/etc/passwd", "2013/07/../../x", "2013//x", "./x", ""] {
            match local_path(&root, key) {
                Err(WsrDataErr::MalformedKey(_)) => {}
                other => panic!("unexpected for {:?}: {:?}", key, other),
            }
        }

        let store = MemoryStore::with_keys(&[K1, "../../x"]);
        let keys = vec!["../../x".to_owned(), K1.to_owned()];
        let report = fetch_keys(&store, &keys, &root, None).unwrap();

        assert_eq!(report.fetched, vec![K1.to_owned()]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].0, "../../x");
        assert_eq!(store.fetches.get(), 1);
        assert!(!tmp.path().join("x").exists());
    }
}
