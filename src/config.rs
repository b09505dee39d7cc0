//! Configuration of a dataset build and the layout of the workspace it runs in.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    annotation::{AnnotationContext, BoxScaling},
    bbox::DEFAULT_TARGET_SCALE,
    errors::WsrDataErr,
    manifest::{License, ManifestInfo},
    render::{RenderConfig, VersionConfigs, DIMENSION_ORDER},
    store::DEFAULT_BUCKET_URL,
};

/// The default workspace root, `${HOME}/wsrdata`.
pub fn default_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join("wsrdata"))
}

/// Paths within a workspace.
#[derive(Clone, Debug, PartialEq)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    const SCANS: &'static str = "static/scans";
    const ARRAYS: &'static str = "static/arrays";
    const DATASETS: &'static str = "datasets";

    /// A layout rooted at `root`.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        DatasetLayout { root: root.into() }
    }

    /// The workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `path` itself if absolute, otherwise relative to the root.
    pub fn resolve<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Root of the raw scan mirror.
    pub fn scan_dir(&self) -> PathBuf {
        self.root.join(Self::SCANS).join("scans")
    }

    /// Attempt log of a download run.
    pub fn download_log(&self, scan_list_version: &str) -> PathBuf {
        self.scan_log("logs", scan_list_version)
    }

    /// Keys the store does not have.
    pub fn not_found_log(&self, scan_list_version: &str) -> PathBuf {
        self.scan_log("not_s3_logs", scan_list_version)
    }

    /// Keys that failed to download.
    pub fn fetch_error_log(&self, scan_list_version: &str) -> PathBuf {
        self.scan_log("error_scan_logs", scan_list_version)
    }

    fn scan_log(&self, kind: &str, version: &str) -> PathBuf {
        self.root
            .join(Self::SCANS)
            .join(kind)
            .join(format!("{}.log", version))
    }

    /// Directory of every array version and the registry.
    pub fn arrays_root(&self) -> PathBuf {
        self.root.join(Self::ARRAYS)
    }

    /// Directory of one dataset version.
    pub fn dataset_dir(&self, dataset_version: &str) -> PathBuf {
        self.root
            .join(Self::DATASETS)
            .join(format!("roosts_{}", dataset_version))
    }

    /// The manifest of a dataset version.
    pub fn manifest_path(&self, dataset_version: &str) -> PathBuf {
        self.dataset_dir(dataset_version)
            .join(format!("roosts_{}.json", dataset_version))
    }

    /// A split file of a dataset version.
    pub fn split_path(&self, dataset_version: &str, split_version: &str) -> PathBuf {
        self.dataset_dir(dataset_version)
            .join(format!("roosts_{}.json", split_version))
    }
}

/// Format of an annotation source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Screened CSV exported by the review tool.
    Csv,
    /// User annotation text file in polar coordinates.
    Legacy,
}

/// One file of new annotations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSource {
    /// Path of the file.
    pub path: PathBuf,
    /// How to read it.
    pub format: SourceFormat,
    /// Whose scale factor normalizes the boxes of a CSV source. Legacy rows name their own.
    #[serde(default)]
    pub annotator: Option<String>,
    /// Keep the boxes of a CSV source as drawn, for screened detector output.
    #[serde(default)]
    pub as_drawn: bool,
}

impl AnnotationSource {
    /// How the boxes of a CSV source are sized. Exactly one of `annotator` and `as_drawn` must
    /// be given.
    pub fn box_scaling(&self) -> Result<BoxScaling, WsrDataErr> {
        match (self.annotator.as_deref(), self.as_drawn) {
            (Some(annotator), false) => Ok(BoxScaling::Annotator(annotator)),
            (None, true) => Ok(BoxScaling::AsDrawn),
            (Some(_), true) => Err(WsrDataErr::InvalidConfig(format!(
                "{} names an annotator and asks for boxes as drawn",
                self.path.display()
            ))),
            (None, false) => Err(WsrDataErr::InvalidConfig(format!(
                "{} needs an annotator for its scale factor, or as_drawn",
                self.path.display()
            ))),
        }
    }
}

/// A prior dataset version to build on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriorDatasetConfig {
    /// Its dataset version.
    pub version: String,
    /// Its manifest.
    pub manifest: PathBuf,
    /// Its standard split file.
    #[serde(default)]
    pub splits: Option<PathBuf>,
}

/// Everything that defines one dataset version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct DatasetConfig {
    pub description: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub url: String,
    pub license: License,
    pub scan_license: License,
    /// Defaults to the day of the build.
    #[serde(default)]
    pub date_created: Option<String>,
    pub annotation_version: String,
    #[serde(default)]
    pub user_model_version: Option<String>,

    pub dataset_version: String,
    /// Name of the standard split file. Defaults to `<dataset_version>_standard_splits`.
    #[serde(default)]
    pub split_version: Option<String>,

    pub categories: Vec<String>,
    #[serde(default)]
    pub subcategories: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub default_category_id: usize,

    pub array_version: String,
    #[serde(default = "RenderConfig::standard")]
    pub array: RenderConfig,
    #[serde(default = "RenderConfig::dualpol")]
    pub dualpol: RenderConfig,

    #[serde(default = "default_target_scale")]
    pub target_scale: f64,
    #[serde(default)]
    pub scale_factors: BTreeMap<String, f64>,

    /// Built on in this order.
    #[serde(default)]
    pub priors: Vec<PriorDatasetConfig>,
    /// New scans of this version.
    pub scan_list: PathBuf,
    #[serde(default)]
    pub annotations: Vec<AnnotationSource>,
    /// Key list per split name.
    #[serde(default)]
    pub splits: BTreeMap<String, PathBuf>,

    /// Replace an existing manifest of this version.
    #[serde(default)]
    pub overwrite: bool,
    /// Re-render scans that already have arrays.
    #[serde(default)]
    pub force_render: bool,
    /// Pretty print JSON with this many spaces.
    #[serde(default)]
    pub indent: Option<usize>,
    #[serde(default = "default_bucket_url")]
    pub bucket_url: String,
}

fn default_target_scale() -> f64 {
    DEFAULT_TARGET_SCALE
}

fn default_bucket_url() -> String {
    DEFAULT_BUCKET_URL.to_owned()
}

/// The archive to read from: `arg` when given, then the config's `bucket_url`, then the public
/// archive.
pub fn choose_bucket_url<'a>(arg: Option<&'a str>, config: Option<&'a DatasetConfig>) -> &'a str {
    arg.or_else(|| config.map(|c| c.bucket_url.as_str()))
        .unwrap_or(DEFAULT_BUCKET_URL)
}

impl DatasetConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, WsrDataErr> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| WsrDataErr::MissingInput(path.display().to_string()))?;
        let config: DatasetConfig = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the config is usable.
    pub fn validate(&self) -> Result<(), WsrDataErr> {
        let invalid = |msg: String| Err(WsrDataErr::InvalidConfig(msg));

        if self.dataset_version.is_empty() {
            return invalid("dataset_version must not be empty".to_owned());
        }
        if self.default_category_id >= self.categories.len() {
            return invalid(format!(
                "default_category_id {} but only {} categories",
                self.default_category_id,
                self.categories.len()
            ));
        }

        self.array.validate()?;
        self.dualpol.validate()?;
        if self.array.dim != self.dualpol.dim {
            return invalid("array and dualpol must share a grid".to_owned());
        }

        if self.target_scale <= 0.0 {
            return invalid("target_scale must be positive".to_owned());
        }
        if let Some((name, factor)) = self.scale_factors.iter().find(|(_, f)| **f <= 0.0) {
            return invalid(format!("scale factor {} of {} must be positive", factor, name));
        }

        for (i, prior) in self.priors.iter().enumerate() {
            if prior.version == self.dataset_version
                || self.priors[..i].iter().any(|p| p.version == prior.version)
            {
                return invalid(format!("prior {} is listed twice", prior.version));
            }
        }

        for source in &self.annotations {
            match source.format {
                SourceFormat::Csv => {
                    source.box_scaling()?;
                }
                SourceFormat::Legacy if source.as_drawn => {
                    return invalid(format!(
                        "{} is a legacy source, its boxes are always scaled",
                        source.path.display()
                    ));
                }
                SourceFormat::Legacy => {}
            }
        }

        Ok(())
    }

    /// Name of the standard split file.
    pub fn split_version(&self) -> String {
        self.split_version
            .clone()
            .unwrap_or_else(|| format!("{}_standard_splits", self.dataset_version))
    }

    /// The render configs of the array version.
    pub fn version_configs(&self) -> VersionConfigs {
        VersionConfigs {
            array: self.array.clone(),
            dualpol: self.dualpol.clone(),
        }
    }

    /// Settings for reading this version's annotation sources.
    pub fn annotation_context(&self) -> AnnotationContext {
        let subcategories = self
            .categories
            .get(self.default_category_id)
            .and_then(|name| self.subcategories.get(name))
            .map_or(&[][..], |subs| subs.as_slice());

        AnnotationContext {
            dataset_version: &self.dataset_version,
            category_id: self.default_category_id,
            subcategories,
            dim: self.array.dim,
            r_max: self.array.r_max,
            target_scale: self.target_scale,
            scale_factors: &self.scale_factors,
        }
    }

    /// The info block of this version's manifest, before any prior info is added.
    pub fn manifest_info(&self) -> ManifestInfo {
        let date_created = self
            .date_created
            .clone()
            .unwrap_or_else(|| Utc::now().format("%Y/%-m/%-d").to_string());

        ManifestInfo {
            description: self.description.clone(),
            comments: self.comments.clone(),
            url: self.url.clone(),
            dataset_version: self.dataset_version.clone(),
            license: self.license.clone(),
            scan_license: self.scan_license.clone(),
            annotation_version: self.annotation_version.clone(),
            user_model_version: self.user_model_version.clone(),
            date_created,
            array_version: self.array_version.clone(),
            array_dir: format!("{}/{}", DatasetLayout::ARRAYS, self.array_version),
            array_dimension_order: DIMENSION_ORDER.iter().map(|s| (*s).to_owned()).collect(),
            array_ydirection: self.array.y_direction.clone(),
            array_shape: self.array.shape(),
            array_fields: self.array.fields.clone(),
            array_elevations: self.array.elevations.clone(),
            array_r_max: self.array.r_max,
            dualpol_shape: self.dualpol.shape(),
            dualpol_fields: self.dualpol.fields.clone(),
            dualpol_elevations: self.dualpol.elevations.clone(),
            bbox_mode: "XYWH".to_owned(),
            pre_dataset_info: vec![],
        }
    }
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
