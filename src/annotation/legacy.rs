//! The first annotation sources: user annotation text files in polar coordinates, and the
//! manifests built from them.

use std::path::Path;

use serde::Deserialize;

use super::{column, open_table, parse_column, Annotation, AnnotationContext, AnnotationPool, TrackId};
use crate::{
    bbox::{area, circle_to_xywh, scale_xywh, Bbox},
    errors::WsrDataErr,
    scan_key::ScanKey,
};

/// Dataset versions whose manifests store annotations in the legacy schema.
pub const LEGACY_SCHEMA_VERSIONS: [&str; 2] = ["v0.0.1", "v0.1.0"];

/// How a prior manifest stores its annotations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnnotationSchema {
    /// `sequence_id` and polar `x`/`y`/`r`, no geographic or screening fields.
    Legacy,
    /// The current [`Annotation`] record.
    Canonical,
}

impl AnnotationSchema {
    /// The schema used by manifests of a dataset version.
    pub fn for_version(dataset_version: &str) -> Self {
        if LEGACY_SCHEMA_VERSIONS.iter().any(|v| *v == dataset_version) {
            AnnotationSchema::Legacy
        } else {
            AnnotationSchema::Canonical
        }
    }
}

#[derive(Deserialize)]
struct LegacyRecord {
    scan_id: usize,
    category_id: usize,
    sequence_id: i64,
    x_im: f64,
    y_im: f64,
    r_im: f64,
    bbox: Bbox,
    bbox_area: f64,
}

/// Convert one annotation record of a prior manifest into the current schema.
///
/// `scan_id` and `id` still refer to the prior manifest.
pub fn adapt_prior(
    schema: AnnotationSchema,
    dataset_version: &str,
    record: serde_json::Value,
) -> Result<Annotation, WsrDataErr> {
    match schema {
        AnnotationSchema::Canonical => Ok(serde_json::from_value(record)?),
        AnnotationSchema::Legacy => {
            let old: LegacyRecord = serde_json::from_value(record)?;
            Ok(Annotation {
                id: 0,
                scan_id: old.scan_id,
                category_id: old.category_id,
                dataset_version: dataset_version.to_owned(),
                track_id: Some(TrackId::Number(old.sequence_id)),
                lon: None,
                lat: None,
                radius: None,
                x_im: old.x_im,
                y_im: old.y_im,
                r_im: old.r_im,
                bbox: old.bbox,
                bbox_area: old.bbox_area,
                subcategory: None,
                notes: None,
                day_notes: None,
            })
        }
    }
}

/// One row of a user annotation text file. Positions are metres from the radar.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub struct LegacyRow {
    pub filename: String,
    pub sequence_id: i64,
    pub station: String,
    pub minutes_from_sunrise: i64,
    pub x: f64,
    pub y: f64,
    pub r: f64,
    pub username: String,
}

/// Read a user annotation text file, skipping the header.
pub fn read_legacy_text(path: &Path) -> Result<Vec<LegacyRow>, WsrDataErr> {
    let mut rows = vec![];

    for rec in open_table(path)?.records() {
        let rec = rec?;
        rows.push(LegacyRow {
            filename: column(path, &rec, 1)?.to_owned(),
            sequence_id: parse_column(path, &rec, 2)?,
            station: column(path, &rec, 3)?.to_owned(),
            minutes_from_sunrise: parse_column(path, &rec, 10)?,
            x: parse_column(path, &rec, 11)?,
            y: parse_column(path, &rec, 12)?,
            r: parse_column(path, &rec, 13)?,
            username: column(path, &rec, 14)?.to_owned(),
        });
    }

    Ok(rows)
}

/// Convert rows into annotations and add them to the pool. Returns the number added.
///
/// Rows from annotators without a scale factor are dropped and the annotator remembered.
pub fn pool_legacy(
    rows: &[LegacyRow],
    ctx: &AnnotationContext,
    pool: &mut AnnotationPool,
) -> Result<usize, WsrDataErr> {
    let mut added = 0;
    let dim = ctx.dim as f64;
    let span = 2.0 * ctx.r_max;

    for row in rows {
        let key = ScanKey::parse(&row.filename)?;

        let factor = match ctx.scale_factor(&row.username, &row.station) {
            Some(factor) => factor,
            None => {
                pool.note_unknown_annotator(&row.username);
                continue;
            }
        };

        let x_im = (row.x + ctx.r_max) * dim / span;
        let y_im = (row.y + ctx.r_max) * dim / span;
        let r_im = row.r * dim / span;
        let bbox = scale_xywh(
            circle_to_xywh(x_im, y_im, r_im),
            ctx.dim,
            factor,
            ctx.target_scale,
        );

        let annotation = Annotation {
            id: 0,
            scan_id: 0,
            category_id: ctx.category_id,
            dataset_version: ctx.dataset_version.to_owned(),
            track_id: Some(TrackId::Number(row.sequence_id)),
            lon: None,
            lat: None,
            radius: None,
            x_im,
            y_im,
            r_im: r_im / factor * ctx.target_scale,
            bbox,
            bbox_area: area(&bbox),
            subcategory: None,
            notes: None,
            day_notes: None,
        };

        pool.set_minutes_from_sunrise(key.clone(), row.minutes_from_sunrise);
        pool.push(key, annotation);
        added += 1;
    }

    Ok(added)
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
