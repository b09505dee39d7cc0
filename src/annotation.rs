//! Bounding box annotations and the sources they come from.
//!
//! Every source is converted into the one [`Annotation`] record stored in manifests. Boxes are
//! in the pixel space of the rendered arrays, with row 0 to the south.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::Path,
    str::FromStr,
};

use csv::StringRecord;
use serde::{Deserialize, Serialize};

use crate::{bbox::Bbox, errors::WsrDataErr, scan_key::ScanKey};

pub use self::legacy::{
    adapt_prior, pool_legacy, read_legacy_text, AnnotationSchema, LegacyRow,
    LEGACY_SCHEMA_VERSIONS,
};
pub use self::screened::{pool_screened, read_screened_csv, BoxScaling, ScreenedRow};

mod legacy;
mod screened;

/// Identifier of the track or sequence an annotation was drawn as part of.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
#[allow(missing_docs)]
pub enum TrackId {
    Number(i64),
    Text(String),
}

/// One annotation as stored in a manifest.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Dense id within one manifest.
    pub id: usize,
    /// Id of the scan this annotation belongs to, within the same manifest.
    pub scan_id: usize,
    /// Index into the manifest categories.
    pub category_id: usize,
    /// Dataset version that first introduced this annotation.
    pub dataset_version: String,
    /// Track or sequence id from the source.
    pub track_id: Option<TrackId>,
    /// Longitude of the center, when the source has it.
    pub lon: Option<f64>,
    /// Latitude of the center, when the source has it.
    pub lat: Option<f64>,
    /// Radius in metres, when the source has it.
    pub radius: Option<f64>,
    /// Circle center x in pixels.
    pub x_im: f64,
    /// Circle center y in pixels.
    pub y_im: f64,
    /// Circle radius in pixels, at the target scale.
    pub r_im: f64,
    /// `[x, y, w, h]` in pixels.
    pub bbox: Bbox,
    /// `w * h` of the box.
    pub bbox_area: f64,
    /// Label given during screening, e.g. `swallow-roost`.
    pub subcategory: Option<String>,
    /// Free form notes on the track.
    pub notes: Option<String>,
    /// Free form notes on the whole day, e.g. `miss`.
    pub day_notes: Option<String>,
}

/// Settings shared by every annotation source of one build.
#[derive(Clone, Debug)]
pub struct AnnotationContext<'a> {
    /// Dataset version stamped on new annotations.
    pub dataset_version: &'a str,
    /// Category assigned to new annotations.
    pub category_id: usize,
    /// Labels accepted from screened rows.
    pub subcategories: &'a [String],
    /// Side of the rendered arrays in pixels.
    pub dim: usize,
    /// Rendering range in metres, for sources in polar coordinates.
    pub r_max: f64,
    /// Scale every box is normalized to.
    pub target_scale: f64,
    /// Per-annotator scale factors, keyed by `annotator` or `annotator-STATION`.
    pub scale_factors: &'a BTreeMap<String, f64>,
}

impl<'a> AnnotationContext<'a> {
    /// The scale factor for an annotator at a station, if one was learned.
    pub fn scale_factor(&self, annotator: &str, station: &str) -> Option<f64> {
        self.scale_factors
            .get(annotator)
            .or_else(|| self.scale_factors.get(&format!("{}-{}", annotator, station)))
            .copied()
    }
}

/// Annotations waiting to be attached to scans, grouped by scan.
#[derive(Debug, Default)]
pub struct AnnotationPool {
    by_key: HashMap<ScanKey, Vec<Annotation>>,
    minutes_from_sunrise: HashMap<ScanKey, i64>,
    unknown_annotators: BTreeSet<String>,
}

impl AnnotationPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an annotation after any already pooled for the same scan.
    pub fn push(&mut self, key: ScanKey, annotation: Annotation) {
        self.by_key.entry(key).or_default().push(annotation);
    }

    /// Record the minutes from sunrise of a scan. The last value recorded wins.
    pub fn set_minutes_from_sunrise(&mut self, key: ScanKey, minutes: i64) {
        self.minutes_from_sunrise.insert(key, minutes);
    }

    /// Minutes from sunrise of a scan, if any source gave it.
    pub fn minutes_from_sunrise(&self, key: &ScanKey) -> Option<i64> {
        self.minutes_from_sunrise.get(key).copied()
    }

    /// Remove and return the annotations of a scan, in the order they were added.
    pub fn take(&mut self, key: &ScanKey) -> Vec<Annotation> {
        self.by_key.remove(key).unwrap_or_default()
    }

    /// Move everything from `other` into this pool, after what is already here.
    pub fn append(&mut self, other: AnnotationPool) {
        for (key, mut anns) in other.by_key {
            self.by_key.entry(key).or_default().append(&mut anns);
        }
        self.minutes_from_sunrise.extend(other.minutes_from_sunrise);
        self.unknown_annotators.extend(other.unknown_annotators);
    }

    /// Remember an annotator whose rows were dropped for lack of a scale factor.
    pub fn note_unknown_annotator(&mut self, annotator: &str) {
        self.unknown_annotators.insert(annotator.to_owned());
    }

    /// Annotators whose rows were dropped for lack of a scale factor.
    pub fn unknown_annotators(&self) -> &BTreeSet<String> {
        &self.unknown_annotators
    }

    /// Number of pooled annotations.
    pub fn len(&self) -> usize {
        self.by_key.values().map(Vec::len).sum()
    }

    /// True if no annotations are pooled.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Shared by the text based sources.

fn open_table(path: &Path) -> Result<csv::Reader<std::fs::File>, WsrDataErr> {
    if !path.is_file() {
        return Err(WsrDataErr::MissingInput(path.display().to_string()));
    }

    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?)
}

fn column<'r>(path: &Path, rec: &'r StringRecord, idx: usize) -> Result<&'r str, WsrDataErr> {
    rec.get(idx).ok_or_else(|| {
        WsrDataErr::GeneralError(format!(
            "{} line {}: expected at least {} columns, found {}",
            path.display(),
            line_of(rec),
            idx + 1,
            rec.len()
        ))
    })
}

fn parse_column<T: FromStr>(path: &Path, rec: &StringRecord, idx: usize) -> Result<T, WsrDataErr> {
    let val = column(path, rec, idx)?;
    val.parse().map_err(|_| {
        WsrDataErr::GeneralError(format!(
            "{} line {}: unable to parse column {} value {:?}",
            path.display(),
            line_of(rec),
            idx,
            val
        ))
    })
}

fn line_of(rec: &StringRecord) -> u64 {
    rec.position().map(|p| p.line()).unwrap_or(0)
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
