//! Building a manifest from prior manifests, a scan list, and annotation sources.

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt,
    path::Path,
};

use serde::Deserialize;

use super::{Manifest, ManifestInfo, ScanRecord};
use crate::{
    annotation::{adapt_prior, Annotation, AnnotationPool, AnnotationSchema},
    errors::WsrDataErr,
    fetch::local_path,
    json_io::read_json,
    scan_key::ScanKey,
};

/// A manifest of an earlier dataset version, with its standard splits.
#[derive(Clone, Debug)]
pub struct PriorDataset {
    /// The prior's dataset version.
    pub version: String,
    /// The prior's info block, kept verbatim.
    pub info: serde_json::Value,
    /// The prior's scans, with the prior's ids.
    pub scans: Vec<ScanRecord>,
    /// The prior's annotations adapted to the current schema, still with the prior's ids.
    pub annotations: Vec<Annotation>,
    /// The prior's categories.
    pub categories: Vec<String>,
    /// The prior's standard splits, as prior scan ids.
    pub splits: BTreeMap<String, Vec<usize>>,
}

#[derive(Deserialize)]
struct StoredManifest {
    info: serde_json::Value,
    scans: Vec<ScanRecord>,
    #[serde(default)]
    annotations: Vec<serde_json::Value>,
    categories: Vec<String>,
}

impl PriorDataset {
    /// Load a prior manifest and, if given, its split file.
    pub fn load(manifest_path: &Path, splits_path: Option<&Path>) -> Result<Self, WsrDataErr> {
        let stored: StoredManifest = read_json(manifest_path)?;

        let version = stored
            .info
            .get("dataset_version")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                WsrDataErr::IntegrityViolation(format!(
                    "{} has no dataset_version",
                    manifest_path.display()
                ))
            })?
            .to_owned();

        let schema = AnnotationSchema::for_version(&version);
        let annotations = stored
            .annotations
            .into_iter()
            .map(|record| adapt_prior(schema, &version, record))
            .collect::<Result<Vec<_>, _>>()?;

        let splits = match splits_path {
            Some(path) => read_json(path)?,
            None => BTreeMap::new(),
        };

        Ok(PriorDataset {
            version,
            info: stored.info,
            scans: stored.scans,
            annotations,
            categories: stored.categories,
            splits,
        })
    }

    /// The key of a scan by its id in this prior.
    pub fn scan_key(&self, id: usize) -> Result<&str, WsrDataErr> {
        self.scans.get(id).map(|s| s.key.as_str()).ok_or_else(|| {
            WsrDataErr::IntegrityViolation(format!(
                "prior {} has no scan with id {}",
                self.version, id
            ))
        })
    }
}

/// Counts from one manifest build.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildReport {
    /// Scans copied from prior manifests.
    pub prior_scans: usize,
    /// Scans added from the new scan list.
    pub new_scans: usize,
    /// New scans left out because their array bundle does not exist.
    pub skipped_missing_arrays: usize,
    /// Annotations whose scan is not in the manifest.
    pub unattached_annotations: usize,
    /// Annotators whose rows were dropped for lack of a scale factor.
    pub unknown_annotators: BTreeSet<String>,
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} scans are skipped since their arrays are missing.",
            self.skipped_missing_arrays
        )
    }
}

/// Build a manifest.
///
/// Scans of each prior are copied first, in the order given, then every scan of `scan_names`
/// that has an array bundle under `array_dir`. Ids are assigned densely in that order. Each scan
/// takes the pooled annotations for its key: those of the priors first, then `annotations`.
///
/// Fails if a prior's categories differ from `categories`, if a scan appears twice, or if the
/// result does not validate.
pub fn build_manifest(
    mut info: ManifestInfo,
    categories: &[String],
    subcategories: &BTreeMap<String, Vec<String>>,
    priors: &[PriorDataset],
    scan_names: &[String],
    array_dir: &Path,
    annotations: AnnotationPool,
) -> Result<(Manifest, BuildReport), WsrDataErr> {
    let mut report = BuildReport::default();
    let mut pool = AnnotationPool::new();

    for prior in priors {
        if prior.categories != categories {
            return Err(WsrDataErr::IntegrityViolation(format!(
                "prior {} has categories {:?}, expected {:?}",
                prior.version, prior.categories, categories
            )));
        }
        info.pre_dataset_info.push(prior.info.clone());

        for ann in &prior.annotations {
            let key = ScanKey::parse(prior.scan_key(ann.scan_id)?)?;
            pool.push(key, ann.clone());
        }
    }

    report.unknown_annotators = annotations.unknown_annotators().clone();
    pool.append(annotations);

    let dataset_version = info.dataset_version.clone();
    let mut manifest = Manifest {
        info,
        scans: vec![],
        annotations: vec![],
        categories: categories.to_vec(),
        subcategories: subcategories.clone(),
    };
    let mut seen = HashSet::new();

    for prior in priors {
        for scan in &prior.scans {
            let key = ScanKey::parse(&scan.key)?;
            check_unique(&mut seen, &key)?;

            let record = ScanRecord {
                id: manifest.scans.len(),
                annotation_ids: vec![],
                dataset_version: scan
                    .dataset_version
                    .clone()
                    .or_else(|| Some(prior.version.clone())),
                key: scan.key.clone(),
                minutes_from_sunrise: scan.minutes_from_sunrise,
                array_path: scan.array_path.clone(),
            };
            attach(&mut manifest, record, pool.take(&key));
            report.prior_scans += 1;
        }
    }

    for name in scan_names {
        let key = ScanKey::parse(name)?;
        let array_path = key.array_path();

        if !local_path(array_dir, &array_path)?.is_file() {
            report.skipped_missing_arrays += 1;
            continue;
        }
        check_unique(&mut seen, &key)?;

        let record = ScanRecord {
            id: manifest.scans.len(),
            annotation_ids: vec![],
            dataset_version: Some(dataset_version.clone()),
            key: key.scan_name(),
            minutes_from_sunrise: pool.minutes_from_sunrise(&key),
            array_path,
        };
        attach(&mut manifest, record, pool.take(&key));
        report.new_scans += 1;
    }

    report.unattached_annotations = pool.len();
    if report.unattached_annotations > 0 {
        log::warn!(
            "{} annotations refer to scans that are not in the manifest",
            report.unattached_annotations
        );
    }

    manifest.validate()?;
    Ok((manifest, report))
}

fn check_unique(seen: &mut HashSet<ScanKey>, key: &ScanKey) -> Result<(), WsrDataErr> {
    if seen.insert(key.clone()) {
        Ok(())
    } else {
        Err(WsrDataErr::IntegrityViolation(format!(
            "scan {} appears more than once",
            key
        )))
    }
}

fn attach(manifest: &mut Manifest, mut record: ScanRecord, annotations: Vec<Annotation>) {
    for mut ann in annotations {
        ann.id = manifest.annotations.len();
        ann.scan_id = record.id;
        record.annotation_ids.push(ann.id);
        manifest.annotations.push(ann);
    }
    manifest.scans.push(record);
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
#[cfg(test)]
mod unit {
    use super::*;

    use crate::{
        annotation::{pool_screened, AnnotationContext, BoxScaling, ScreenedRow},
        manifest::unit::info,
    };
    use serde_json::json;
    use tempdir::TempDir;

    const PRIOR_KEYS: [&str; 3] = [
        "KDOX20100801_094000_V03",
        "KDOX20100801_095000_V03",
        "KDOX20100801_100000_V03",
    ];
    const NEW_RENDERED: &str = "KGRR20150801_093320_V06";
    const NEW_MISSING: &str = "KGRR20150801_094320_V06";

    fn write_prior(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let scans: Vec<_> = PRIOR_KEYS
            .iter()
            .enumerate()
            .map(|(i, key)| {
                json!({
                    "id": i, "key": key, "minutes_from_sunrise": -10,
                    "array_path": format!("2010/08/01/KDOX/{}.npz", key), "annotation_ids": [i]
                })
            })
            .collect();
        let annotations: Vec<_> = (0..3)
            .map(|i| {
                json!({
                    "id": i, "scan_id": i, "category_id": 0, "sequence_id": 100 + i,
                    "x": 0.0, "y": 0.0, "r": 5000.0, "x_im": 300.0, "y_im": 300.0, "r_im": 7.4,
                    "bbox": [292, 292, 15, 15], "bbox_area": 225
                })
            })
            .collect();
        let manifest = json!({
            "info": {"dataset_version": "v0.1.0", "description": "prior"},
            "scans": scans,
            "annotations": annotations,
            "categories": ["roost"],
        });

        let manifest_path = dir.join("roosts_v0.1.0.json");
        let splits_path = dir.join("roosts_v0.1.0_standard_splits.json");
        std::fs::write(&manifest_path, manifest.to_string()).unwrap();
        std::fs::write(&splits_path, r#"{"train": [0, 2], "test": [1]}"#).unwrap();
        (manifest_path, splits_path)
    }

    fn screened(scan: &str) -> ScreenedRow {
        ScreenedRow {
            track_id: "KGRR20150801-1".to_owned(),
            filename: scan.to_owned(),
            minutes_from_sunrise: -20,
            x: 300.0,
            y: 300.0,
            r: 10.0,
            lon: -85.5,
            lat: 42.9,
            radius: 5000.0,
            date: "20150801".to_owned(),
            viewed: true,
            label: "swallow-roost".to_owned(),
            notes: String::new(),
            day_notes: String::new(),
        }
    }

    fn categories() -> Vec<String> {
        vec!["roost".to_owned()]
    }

    #[test]
    fn test_prior_plus_new_scans() {
        let tmp = TempDir::new("wsrdata-test-build").unwrap();
        let (manifest_path, splits_path) = write_prior(tmp.path());
        let prior = PriorDataset::load(&manifest_path, Some(&splits_path)).unwrap();
        assert_eq!(prior.version, "v0.1.0");
        assert_eq!(prior.splits["train"], vec![0, 2]);

        let array_dir = tmp.path().join("arrays");
        let rendered =
            local_path(&array_dir, &ScanKey::parse(NEW_RENDERED).unwrap().array_path()).unwrap();
        std::fs::create_dir_all(rendered.parent().unwrap()).unwrap();
        std::fs::write(&rendered, b"npz").unwrap();

        let factors = BTreeMap::new();
        let subs = vec!["swallow-roost".to_owned()];
        let ctx = AnnotationContext {
            dataset_version: "v0.2.0",
            category_id: 0,
            subcategories: &subs,
            dim: 600,
            r_max: 150_000.0,
            target_scale: 0.7429,
            scale_factors: &factors,
        };
        let mut pool = AnnotationPool::new();
        pool_screened(&[screened(NEW_RENDERED)], BoxScaling::AsDrawn, &ctx, &mut pool).unwrap();

        let names = vec![NEW_RENDERED.to_owned(), NEW_MISSING.to_owned()];
        let (manifest, report) = build_manifest(
            info("v0.2.0"),
            &categories(),
            &BTreeMap::new(),
            &[prior],
            &names,
            &array_dir,
            pool,
        )
        .unwrap();

        assert_eq!(manifest.scans.len(), 4);
        let ids: Vec<_> = manifest.scans.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        assert_eq!(manifest.annotations.len(), 4);

        let new_scan = &manifest.scans[3];
        assert_eq!(new_scan.key, NEW_RENDERED);
        assert_eq!(new_scan.array_path, "2015/08/01/KGRR/KGRR20150801_093320_V06.npz");
        assert_eq!(new_scan.minutes_from_sunrise, Some(-20));
        assert_eq!(new_scan.dataset_version.as_deref(), Some("v0.2.0"));
        assert_eq!(new_scan.annotation_ids, vec![3]);
        assert_eq!(manifest.annotations[3].scan_id, 3);

        assert_eq!(manifest.scans[1].dataset_version.as_deref(), Some("v0.1.0"));
        assert_eq!(manifest.annotations[1].dataset_version, "v0.1.0");
        assert_eq!(manifest.info.pre_dataset_info.len(), 1);

        assert_eq!(report.prior_scans, 3);
        assert_eq!(report.new_scans, 1);
        assert_eq!(report.skipped_missing_arrays, 1);
        assert_eq!(
            report.to_string(),
            "1 scans are skipped since their arrays are missing."
        );
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_back_references_are_exact() {
        let tmp = TempDir::new("wsrdata-test-build").unwrap();
        let array_dir = tmp.path();

        let names: Vec<String> = vec![
            "KOKX20130721_093320_V06".to_owned(),
            "KOKX20130721_093820_V06".to_owned(),
            "KOKX20130721_094320_V06".to_owned(),
        ];
        for name in &names {
            let path = local_path(array_dir, &ScanKey::parse(name).unwrap().array_path()).unwrap();
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"npz").unwrap();
        }

        let mut pool = AnnotationPool::new();
        let mut ann = crate::annotation::unit::annotation(1);
        pool.push(ScanKey::parse(&names[2]).unwrap(), ann.clone());
        ann.track_id = None;
        pool.push(ScanKey::parse(&names[0]).unwrap(), ann.clone());
        pool.push(ScanKey::parse(&names[2]).unwrap(), ann);
        // Not in the scan list.
        pool.push(
            ScanKey::parse("KOKX20130722_000000").unwrap(),
            crate::annotation::unit::annotation(9),
        );

        let (m, report) = build_manifest(
            info("v0.2.0"),
            &categories(),
            &BTreeMap::new(),
            &[],
            &names,
            array_dir,
            pool,
        )
        .unwrap();

        assert_eq!(report.unattached_annotations, 1);
        assert_eq!(m.annotations.len(), 3);
        for scan in &m.scans {
            let owned: Vec<_> = m
                .annotations
                .iter()
                .filter(|a| a.scan_id == scan.id)
                .map(|a| a.id)
                .collect();
            assert_eq!(scan.annotation_ids, owned);
        }
        assert_eq!(m.scans[1].annotation_ids, Vec::<usize>::new());
    }

    #[test]
    fn test_duplicate_scan_is_fatal() {
        let tmp = TempDir::new("wsrdata-test-build").unwrap();
        let name = "KOKX20130721_093320_V06";
        let path = local_path(tmp.path(), &ScanKey::parse(name).unwrap().array_path()).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"npz").unwrap();

        let names = vec![name.to_owned(), name.to_owned()];
        let result = build_manifest(
            info("v0.2.0"),
            &categories(),
            &BTreeMap::new(),
            &[],
            &names,
            tmp.path(),
            AnnotationPool::new(),
        );
        match result {
            Err(WsrDataErr::IntegrityViolation(_)) => {}
            other => panic!("unexpected: {:?}", other.map(|(_, r)| r)),
        }
    }

    #[test]
    fn test_prior_with_other_categories_is_fatal() {
        let tmp = TempDir::new("wsrdata-test-build").unwrap();
        let (manifest_path, _) = write_prior(tmp.path());
        let mut prior = PriorDataset::load(&manifest_path, None).unwrap();
        prior.categories.push("swallow".to_owned());

        let result = build_manifest(
            info("v0.2.0"),
            &categories(),
            &BTreeMap::new(),
            &[prior],
            &[],
            tmp.path(),
            AnnotationPool::new(),
        );
        assert!(result.is_err());
    }
}
