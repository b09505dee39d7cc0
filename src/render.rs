//! Rendering raw scans into fixed shape arrays, and caching the results.
//!
//! Reading a level II volume and resampling it onto a Cartesian grid is the job of an external
//! radar library, reached through the [`Renderer`] trait. This module owns the configuration,
//! the on-disk bundle of rendered arrays, and the registry of array versions.

use std::path::Path;

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::errors::WsrDataErr;

pub use self::cache::{
    read_bundle, render_scan_list, write_bundle, Bundle, RenderJob, RenderReport,
};
pub use self::command::{CommandRenderer, DecodedVolume};
pub use self::registry::{ArrayRegistry, VersionConfigs, REGISTRY_FILE};

mod cache;
mod command;
mod registry;

/// Order of the dimensions of every rendered array.
pub const DIMENSION_ORDER: [&str; 4] = ["field", "elevation", "y", "x"];

/// The two independently rendered channel sets.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, EnumString, IntoStaticStr, EnumIter,
)]
pub enum ChannelSet {
    /// Reflectivity, radial velocity, and spectrum width.
    #[strum(serialize = "array")]
    Standard,
    /// Polarimetric fields.
    #[strum(serialize = "dualpol_array")]
    DualPol,
}

impl ChannelSet {
    /// The name of this channel set's array inside a bundle.
    pub fn bundle_name(self) -> &'static str {
        self.into()
    }
}

/// Everything that determines the shape and content of one channel set.
///
/// Field names follow the keys recorded in `previous_versions.json`.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(rename = "ydirection")]
    pub y_direction: String,
    pub fields: Vec<String>,
    pub coords: String,
    pub r_min: f64,
    pub r_max: f64,
    pub r_res: f64,
    pub az_res: f64,
    pub dim: usize,
    pub sweeps: Option<Vec<usize>>,
    #[serde(rename = "elevs")]
    pub elevations: Vec<f64>,
    pub use_ground_range: bool,
    pub interp_method: String,
}

impl RenderConfig {
    /// The expected `(field, elevation, y, x)` shape of a rendered array.
    pub fn shape(&self) -> [usize; 4] {
        [
            self.fields.len(),
            self.elevations.len(),
            self.dim,
            self.dim,
        ]
    }

    /// Standard channels at super-resolution out to 150 km on a 600 pixel grid.
    pub fn standard() -> Self {
        RenderConfig {
            y_direction: "xy".to_owned(),
            fields: vec![
                "reflectivity".to_owned(),
                "velocity".to_owned(),
                "spectrum_width".to_owned(),
            ],
            coords: "cartesian".to_owned(),
            r_min: 2125.0,
            r_max: 150_000.0,
            r_res: 250.0,
            az_res: 0.5,
            dim: 600,
            sweeps: None,
            elevations: vec![0.5, 1.5, 2.5, 3.5, 4.5],
            use_ground_range: true,
            interp_method: "nearest".to_owned(),
        }
    }

    /// Dual polarization channels on the same grid as [`RenderConfig::standard`].
    pub fn dualpol() -> Self {
        RenderConfig {
            fields: vec![
                "differential_reflectivity".to_owned(),
                "cross_correlation_ratio".to_owned(),
                "differential_phase".to_owned(),
            ],
            ..RenderConfig::standard()
        }
    }

    /// Reject configurations that cannot produce an array.
    pub fn validate(&self) -> Result<(), WsrDataErr> {
        if self.fields.is_empty() || self.elevations.is_empty() || self.dim == 0 {
            return Err(WsrDataErr::InvalidConfig(
                "render config needs fields, elevations, and a positive dim".to_owned(),
            ));
        }
        if self.r_max <= 0.0 {
            return Err(WsrDataErr::InvalidConfig("r_max must be positive".to_owned()));
        }
        Ok(())
    }
}

/// An adapter to the external radar library.
pub trait Renderer {
    /// A decoded volume, ready to be rendered any number of times.
    type Volume;

    /// Read and decode a raw scan file. Failures must be `WsrDataErr::Decode`.
    fn load(&self, scan_file: &Path) -> Result<Self::Volume, WsrDataErr>;

    /// Resample one channel set onto the configured grid. Failures must be
    /// `WsrDataErr::Render`.
    fn render(
        &self,
        volume: &Self::Volume,
        config: &RenderConfig,
    ) -> Result<Array4<f32>, WsrDataErr>;
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
