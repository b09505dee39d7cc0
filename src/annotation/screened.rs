//! Roost detections screened by ecologists, exported as CSV from the review tool.

use std::path::Path;

use super::{column, open_table, parse_column, Annotation, AnnotationContext, AnnotationPool, TrackId};
use crate::{
    bbox::{area, circle_to_xywh, scale_xywh},
    errors::WsrDataErr,
    scan_key::ScanKey,
};

/// One row of a screened CSV.
///
/// The export has 24 columns; only the ones below are read. `x`, `y`, and `r` are in image
/// pixels with row 0 to the north.
#[derive(Clone, Debug, PartialEq)]
#[allow(missing_docs)]
pub struct ScreenedRow {
    pub track_id: String,
    pub filename: String,
    pub minutes_from_sunrise: i64,
    pub x: f64,
    pub y: f64,
    pub r: f64,
    pub lon: f64,
    pub lat: f64,
    pub radius: f64,
    pub date: String,
    pub viewed: bool,
    pub label: String,
    pub notes: String,
    pub day_notes: String,
}

impl ScreenedRow {
    /// True when the day was marked as one where the detector missed roosts.
    pub fn is_miss_day(&self) -> bool {
        self.day_notes.eq_ignore_ascii_case("miss")
    }
}

/// Read every row of a screened CSV, skipping the header.
pub fn read_screened_csv(path: &Path) -> Result<Vec<ScreenedRow>, WsrDataErr> {
    let mut rows = vec![];

    for rec in open_table(path)?.records() {
        let rec = rec?;
        rows.push(ScreenedRow {
            track_id: column(path, &rec, 0)?.to_owned(),
            filename: column(path, &rec, 1)?.to_owned(),
            minutes_from_sunrise: parse_column(path, &rec, 2)?,
            x: parse_column(path, &rec, 4)?,
            y: parse_column(path, &rec, 5)?,
            r: parse_column(path, &rec, 6)?,
            lon: parse_column(path, &rec, 7)?,
            lat: parse_column(path, &rec, 8)?,
            radius: parse_column(path, &rec, 9)?,
            date: column(path, &rec, 12)?.to_owned(),
            viewed: column(path, &rec, 18)?.eq_ignore_ascii_case("true"),
            label: column(path, &rec, 20)?.to_owned(),
            notes: column(path, &rec, 22)?.to_owned(),
            day_notes: column(path, &rec, 23)?.to_owned(),
        });
    }

    Ok(rows)
}

/// How the boxes of a screened source are sized.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoxScaling<'a> {
    /// Normalized with this annotator's scale factor. Rows are dropped when it has none.
    Annotator(&'a str),
    /// Taken as drawn, as for screened detector output.
    AsDrawn,
}

/// Convert accepted rows into annotations and add them to the pool. Returns the number added.
///
/// A row is accepted when it was viewed, its label is one of the context's subcategories, and
/// its box can be sized as `scaling` asks.
pub fn pool_screened(
    rows: &[ScreenedRow],
    scaling: BoxScaling,
    ctx: &AnnotationContext,
    pool: &mut AnnotationPool,
) -> Result<usize, WsrDataErr> {
    let mut added = 0;

    for row in rows {
        if !row.viewed || !ctx.subcategories.iter().any(|s| *s == row.label) {
            continue;
        }

        let key = ScanKey::parse(&row.filename)?;

        let x_im = row.x;
        let y_im = ctx.dim as f64 - row.y;
        let mut r_im = row.r;
        let mut bbox = circle_to_xywh(x_im, y_im, r_im);

        if let BoxScaling::Annotator(annotator) = scaling {
            match ctx.scale_factor(annotator, key.station()) {
                Some(factor) => {
                    bbox = scale_xywh(bbox, ctx.dim, factor, ctx.target_scale);
                    r_im = r_im / factor * ctx.target_scale;
                }
                None => {
                    pool.note_unknown_annotator(annotator);
                    continue;
                }
            }
        }

        let annotation = Annotation {
            id: 0,
            scan_id: 0,
            category_id: ctx.category_id,
            dataset_version: ctx.dataset_version.to_owned(),
            track_id: Some(TrackId::Text(row.track_id.clone())),
            lon: Some(row.lon),
            lat: Some(row.lat),
            radius: Some(row.radius),
            x_im,
            y_im,
            r_im,
            bbox,
            bbox_area: area(&bbox),
            subcategory: Some(row.label.clone()),
            notes: Some(row.notes.clone()),
            day_notes: Some(row.day_notes.clone()),
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
#[cfg(test)]
mod unit {
    use super::*;

    use std::collections::BTreeMap;
    use tempdir::TempDir;

    const HEADER: &str = "track_id,filename,from_sunrise,det_score,x,y,r,lon,lat,radius,\
        local_time,station,date,time,local_date,length,tot_score,avg_score,viewed,user_labeled,\
        label,original_label,notes,day_notes";

    fn row(track: &str, scan: &str, viewed: bool, label: &str, day_notes: &str) -> String {
        format!(
            "{},{},-15,0.9,300.0,200.0,12.5,-85.2,42.9,3750.0,20150801_051500,{},{},093320,\
            20150801,20,17.1,0.85,{},false,{},swallow-roost,,{}",
            track,
            scan,
            &scan[..4],
            &scan[4..12],
            if viewed { "True" } else { "False" },
            label,
            day_notes
        )
    }

    fn subcategories() -> Vec<String> {
        vec!["swallow-roost".to_owned(), "weather-roost".to_owned()]
    }

    #[test]
    fn test_read_and_pool() {
        let tmp = TempDir::new("wsrdata-test-screened").unwrap();
        let path = tmp.path().join("roost_labels_KGRR_20150601_20151231.csv");
        let text = [
            HEADER.to_owned(),
            row("KGRR20150801-1", "KGRR20150801_093320_V06", true, "swallow-roost", ""),
            row("KGRR20150801-2", "KGRR20150801_093320_V06", false, "swallow-roost", ""),
            row("KGRR20150801-3", "KGRR20150801_093320_V06", true, "non-roost", ""),
            row("KGRR20150802-1", "KGRR20150802_100012_V06", true, "weather-roost", "miss"),
        ]
        .join("\n");
        std::fs::write(&path, text).unwrap();

        let rows = read_screened_csv(&path).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].minutes_from_sunrise, -15);
        assert!(rows[0].viewed && !rows[1].viewed);
        assert!(rows[3].is_miss_day());

        let factors = BTreeMap::new();
        let subs = subcategories();
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
        assert_eq!(pool_screened(&rows, BoxScaling::AsDrawn, &ctx, &mut pool).unwrap(), 2);

        let key = ScanKey::parse("KGRR20150801_093320").unwrap();
        assert_eq!(pool.minutes_from_sunrise(&key), Some(-15));
        let anns = pool.take(&key);
        assert_eq!(anns.len(), 1);
        // Flipped to geographic direction: 600 - 200.
        assert_eq!(anns[0].y_im, 400.0);
        assert_eq!(anns[0].bbox, [287.0, 387.0, 25.0, 25.0]);
        assert_eq!(anns[0].bbox_area, 625.0);
        assert_eq!(anns[0].subcategory.as_deref(), Some("swallow-roost"));
    }

    #[test]
    fn test_unknown_annotator_drops_rows() {
        let rows = vec![ScreenedRow {
            track_id: "1".to_owned(),
            filename: "KGRR20150801_093320_V06".to_owned(),
            minutes_from_sunrise: 0,
            x: 300.0,
            y: 300.0,
            r: 10.0,
            lon: 0.0,
            lat: 0.0,
            radius: 0.0,
            date: "20150801".to_owned(),
            viewed: true,
            label: "swallow-roost".to_owned(),
            notes: String::new(),
            day_notes: String::new(),
        }];

        let mut factors = BTreeMap::new();
        factors.insert("andrew-KGRR".to_owned(), 1.0);
        let subs = subcategories();
        let ctx = AnnotationContext {
            dataset_version: "v0.2.0",
            category_id: 0,
            subcategories: &subs,
            dim: 600,
            r_max: 150_000.0,
            target_scale: 0.5,
            scale_factors: &factors,
        };

        let mut pool = AnnotationPool::new();
        assert_eq!(pool_screened(&rows, BoxScaling::Annotator("sheldon"), &ctx, &mut pool).unwrap(), 0);
        assert!(pool.unknown_annotators().contains("sheldon"));
        assert!(pool.is_empty());

        assert_eq!(pool_screened(&rows, BoxScaling::Annotator("andrew"), &ctx, &mut pool).unwrap(), 1);
        let anns = pool.take(&ScanKey::parse("KGRR20150801_093320").unwrap());
        assert_eq!(anns[0].bbox, [295.0, 295.0, 10.0, 10.0]);
        assert_eq!(anns[0].r_im, 5.0);
    }

    #[test]
    fn test_short_row_is_an_error() {
        let tmp = TempDir::new("wsrdata-test-screened").unwrap();
        let path = tmp.path().join("short.csv");
        std::fs::write(&path, format!("{}\n1,KGRR20150801_093320_V06,-15", HEADER)).unwrap();
        assert!(read_screened_csv(&path).is_err());
    }
}
