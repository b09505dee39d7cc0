//! The dataset manifest: every scan and annotation of one dataset version.

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{
    annotation::Annotation,
    errors::WsrDataErr,
    json_io::{read_json, write_json},
};

pub use self::build::{build_manifest, BuildReport, PriorDataset};

mod build;

/// A license, as a name and a link.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct License {
    pub url: String,
    pub name: String,
}

/// Metadata of a manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct ManifestInfo {
    pub description: String,
    pub comments: String,
    pub url: String,
    pub dataset_version: String,
    pub license: License,
    pub scan_license: License,
    pub annotation_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_model_version: Option<String>,
    pub date_created: String,
    pub array_version: String,
    pub array_dir: String,
    pub array_dimension_order: Vec<String>,
    pub array_ydirection: String,
    pub array_shape: [usize; 4],
    pub array_fields: Vec<String>,
    pub array_elevations: Vec<f64>,
    pub array_r_max: f64,
    pub dualpol_shape: [usize; 4],
    pub dualpol_fields: Vec<String>,
    pub dualpol_elevations: Vec<f64>,
    pub bbox_mode: String,
    /// Info blocks of the prior manifests this one was built on, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_dataset_info: Vec<serde_json::Value>,
}

/// One scan of a manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Dense id within this manifest.
    pub id: usize,
    /// Ids of this scan's annotations.
    pub annotation_ids: Vec<usize>,
    /// Dataset version that first introduced the scan. Absent in the earliest manifests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_version: Option<String>,
    /// Scan name, e.g. `KOKX20130721_093320_V06`.
    pub key: String,
    /// Minutes relative to local sunrise, when known.
    pub minutes_from_sunrise: Option<i64>,
    /// Path of the array bundle relative to the array version directory.
    pub array_path: String,
}

/// A built dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Metadata.
    pub info: ManifestInfo,
    /// Scans in id order.
    pub scans: Vec<ScanRecord>,
    /// Annotations in id order.
    pub annotations: Vec<Annotation>,
    /// Category names, indexed by `category_id`.
    pub categories: Vec<String>,
    /// Accepted subcategory labels per category.
    #[serde(default)]
    pub subcategories: BTreeMap<String, Vec<String>>,
}

impl Manifest {
    /// Load a manifest written by [`Manifest::write`].
    pub fn load(path: &Path) -> Result<Self, WsrDataErr> {
        read_json(path)
    }

    /// Write as JSON, pretty printed with `indent` spaces if given.
    pub fn write(&self, path: &Path, indent: Option<usize>) -> Result<(), WsrDataErr> {
        write_json(path, self, indent)
    }

    /// Map each scan key to its id. A key listed twice is an integrity violation.
    pub fn key_index(&self) -> Result<HashMap<String, usize>, WsrDataErr> {
        let mut index = HashMap::with_capacity(self.scans.len());
        for scan in &self.scans {
            if index.insert(scan.key.clone(), scan.id).is_some() {
                return Err(WsrDataErr::IntegrityViolation(format!(
                    "scan {} appears more than once",
                    scan.key
                )));
            }
        }
        Ok(index)
    }

    /// Check that scan and annotation ids are dense and that scans and annotations point at
    /// each other consistently.
    pub fn validate(&self) -> Result<(), WsrDataErr> {
        let violation = |msg: String| Err(WsrDataErr::IntegrityViolation(msg));

        for (i, scan) in self.scans.iter().enumerate() {
            if scan.id != i {
                return violation(format!("scan at position {} has id {}", i, scan.id));
            }
        }
        for (i, ann) in self.annotations.iter().enumerate() {
            if ann.id != i {
                return violation(format!("annotation at position {} has id {}", i, ann.id));
            }
            if ann.scan_id >= self.scans.len() {
                return violation(format!(
                    "annotation {} refers to missing scan {}",
                    ann.id, ann.scan_id
                ));
            }
        }

        let mut owner: Vec<Option<usize>> = vec![None; self.annotations.len()];
        for scan in &self.scans {
            for &ann_id in &scan.annotation_ids {
                let ann = match self.annotations.get(ann_id) {
                    Some(ann) => ann,
                    None => {
                        return violation(format!(
                            "scan {} refers to missing annotation {}",
                            scan.id, ann_id
                        ))
                    }
                };
                if ann.scan_id != scan.id {
                    return violation(format!(
                        "scan {} lists annotation {} which belongs to scan {}",
                        scan.id, ann_id, ann.scan_id
                    ));
                }
                if owner[ann_id].replace(scan.id).is_some() {
                    return violation(format!("annotation {} is listed twice", ann_id));
                }
            }
        }

        if let Some(ann_id) = owner.iter().position(Option::is_none) {
            return violation(format!(
                "annotation {} is not listed by its scan {}",
                ann_id, self.annotations[ann_id].scan_id
            ));
        }

        Ok(())
    }
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
#[cfg(test)]
pub(crate) mod unit {
    use super::*;

    use crate::annotation::unit::annotation;
    use tempdir::TempDir;

    pub(crate) fn info(version: &str) -> ManifestInfo {
        let license = License {
            url: "http://www.apache.org/licenses/".to_owned(),
            name: "Apache License 2.0".to_owned(),
        };
        ManifestInfo {
            description: "test".to_owned(),
            comments: String::new(),
            url: String::new(),
            dataset_version: version.to_owned(),
            license: license.clone(),
            scan_license: license,
            annotation_version: "v1.0.0".to_owned(),
            user_model_version: None,
            date_created: "2021/12/1".to_owned(),
            array_version: "v0.2.0".to_owned(),
            array_dir: "static/arrays/v0.2.0".to_owned(),
            array_dimension_order: vec![],
            array_ydirection: "xy".to_owned(),
            array_shape: [3, 5, 600, 600],
            array_fields: vec![],
            array_elevations: vec![],
            array_r_max: 150_000.0,
            dualpol_shape: [3, 5, 600, 600],
            dualpol_fields: vec![],
            dualpol_elevations: vec![],
            bbox_mode: "XYWH".to_owned(),
            pre_dataset_info: vec![],
        }
    }

    pub(crate) fn scan(id: usize, key: &str, annotation_ids: Vec<usize>) -> ScanRecord {
        ScanRecord {
            id,
            annotation_ids,
            dataset_version: Some("v0.1.0".to_owned()),
            key: key.to_owned(),
            minutes_from_sunrise: None,
            array_path: String::new(),
        }
    }

    fn two_scans() -> Manifest {
        let mut a = annotation(1);
        a.scan_id = 1;
        Manifest {
            info: info("v0.1.0"),
            scans: vec![
                scan(0, "KDOX20100801_094000_V03", vec![]),
                scan(1, "KDOX20100801_095000_V03", vec![0]),
            ],
            annotations: vec![a],
            categories: vec!["roost".to_owned()],
            subcategories: BTreeMap::new(),
        }
    }

    #[test]
    fn test_validate_accepts_consistent() {
        assert!(two_scans().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inconsistent() {
        let mut m = two_scans();
        m.scans[0].id = 3;
        assert!(m.validate().is_err());

        let mut m = two_scans();
        m.scans[0].annotation_ids.push(0);
        assert!(m.validate().is_err());

        let mut m = two_scans();
        m.scans[1].annotation_ids.clear();
        assert!(m.validate().is_err());

        let mut m = two_scans();
        m.annotations[0].scan_id = 9;
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_key_index() {
        let m = two_scans();
        assert_eq!(m.key_index().unwrap()["KDOX20100801_095000_V03"], 1);

        let mut m = two_scans();
        m.scans[1].key = m.scans[0].key.clone();
        match m.key_index() {
            Err(WsrDataErr::IntegrityViolation(_)) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_write_and_load() {
        let tmp = TempDir::new("wsrdata-test-manifest").unwrap();
        let path = tmp.path().join("roosts_v0.1.0").join("roosts_v0.1.0.json");
        let m = two_scans();
        m.write(&path, Some(4)).unwrap();
        assert_eq!(Manifest::load(&path).unwrap(), m);
    }
}
