#![deny(missing_docs)]
//! Package to assemble labeled datasets from weather surveillance radar scans.
//!
//! Scans are selected from the remote archive on an even cadence, mirrored locally, rendered
//! into fixed shape arrays, and combined with screened annotations into a versioned JSON
//! manifest that is then sliced into named splits.

//
// Public API
//
pub use crate::annotation::{
    adapt_prior, pool_legacy, pool_screened, read_legacy_text, read_screened_csv, Annotation,
    AnnotationContext, AnnotationPool, AnnotationSchema, BoxScaling, LegacyRow, ScreenedRow,
    TrackId, LEGACY_SCHEMA_VERSIONS,
};
pub use crate::bbox::{area, circle_to_xywh, scale_xywh, Bbox, DEFAULT_TARGET_SCALE};
pub use crate::cmd_line::{print_usage_message, CommonCmdLineArgs};
pub use crate::config::{
    choose_bucket_url, default_root, AnnotationSource, DatasetConfig, DatasetLayout,
    PriorDatasetConfig, SourceFormat,
};
pub use crate::errors::WsrDataErr;
pub use crate::fetch::{fetch_keys, local_path, FetchReport};
pub use crate::json_io::{read_json, write_json};
pub use crate::manifest::{
    build_manifest, BuildReport, License, Manifest, ManifestInfo, PriorDataset, ScanRecord,
};
pub use crate::matcher::{
    by_slot, flat_list, list_station_objects, select_scans, Selection, TimeWindowMatcher,
};
pub use crate::render::{
    read_bundle, render_scan_list, write_bundle, ArrayRegistry, Bundle, ChannelSet,
    CommandRenderer, DecodedVolume, RenderConfig, RenderJob, RenderReport, Renderer,
    VersionConfigs, DIMENSION_ORDER, REGISTRY_FILE,
};
pub use crate::report::{append_list, AttemptLog};
pub use crate::scan_key::ScanKey;
pub use crate::scan_list::{read_names, write_lines};
pub use crate::splits::{
    organize_station_years, read_key_lists, remap_prior_ids, resolve_keys, sample_station_year,
    standard_splits, write_ratio_splits, write_sampled_splits, SampledSplits, SamplingPlan,
    SplitIds, SplitSample, StationYear,
};
pub use crate::store::{ObjectStore, RemoteObject, S3Bucket, DEFAULT_BUCKET_URL};

//
// Implementation only
//
#[macro_use]
extern crate clap;
#[macro_use]
extern crate strum_macros;

mod annotation;
mod bbox;
mod cmd_line;
mod config;
mod errors;
mod fetch;
mod json_io;
mod manifest;
mod matcher;
mod render;
mod report;
mod scan_key;
mod scan_list;
mod splits;
mod store;

#[cfg(test)]
extern crate tempdir;
