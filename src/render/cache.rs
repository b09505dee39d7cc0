//! The rendered array cache: one compressed `.npz` bundle per scan.

use std::{
    collections::BTreeMap,
    fs::File,
    io::BufWriter,
    path::Path,
};

use ndarray::Array4;
use ndarray_npy::{NpzReader, NpzWriter};
use strum::IntoEnumIterator;

use super::{ChannelSet, RenderConfig, Renderer};
use crate::{
    errors::WsrDataErr,
    fetch::local_path,
    report::{append_list, AttemptLog},
    scan_key::ScanKey,
};

/// Rendered arrays of one scan, by channel set.
pub type Bundle = BTreeMap<ChannelSet, Array4<f32>>;

/// Where to read scans from and write arrays to, and how to render them.
#[derive(Clone, Copy, Debug)]
pub struct RenderJob<'a> {
    /// Root of the raw scan mirror.
    pub scan_dir: &'a Path,
    /// Directory of the array version being rendered.
    pub array_dir: &'a Path,
    /// Config for the standard channel set.
    pub array: &'a RenderConfig,
    /// Config for the dual polarization channel set.
    pub dualpol: &'a RenderConfig,
    /// Re-render scans that already have a bundle.
    pub force: bool,
}

impl<'a> RenderJob<'a> {
    fn config(&self, set: ChannelSet) -> &'a RenderConfig {
        match set {
            ChannelSet::Standard => self.array,
            ChannelSet::DualPol => self.dualpol,
        }
    }
}

/// Outcome of rendering a scan list.
#[derive(Debug, Default, PartialEq)]
pub struct RenderReport {
    /// Scans for which a bundle was written.
    pub rendered: Vec<String>,
    /// Scans skipped because a bundle already existed.
    pub cached: Vec<String>,
    /// Scans whose standard channels failed.
    pub array_errors: Vec<String>,
    /// Scans whose dual polarization channels failed.
    pub dualpol_errors: Vec<String>,
}

impl RenderReport {
    /// Failed scans for one channel set.
    pub fn errors(&self, set: ChannelSet) -> &[String] {
        match set {
            ChannelSet::Standard => &self.array_errors,
            ChannelSet::DualPol => &self.dualpol_errors,
        }
    }

    fn errors_mut(&mut self, set: ChannelSet) -> &mut Vec<String> {
        match set {
            ChannelSet::Standard => &mut self.array_errors,
            ChannelSet::DualPol => &mut self.dualpol_errors,
        }
    }

    fn fail_all(&mut self, name: &str) {
        for set in ChannelSet::iter() {
            self.errors_mut(set).push(name.to_owned());
        }
    }
}

fn describe(set: ChannelSet) -> &'static str {
    match set {
        ChannelSet::Standard => "a npy array",
        ChannelSet::DualPol => "a dualpol npy array",
    }
}

/// Render every scan in `names`, skipping those already cached unless the job forces it.
///
/// Each attempt is written to `rendering.log` in the array directory. Failed scans are appended
/// to `array_error_scans.log` and `dualpol_error_scans.log` when the list is done. A failure to
/// decode a scan counts against both channel sets; a failure to render one channel set leaves
/// the other, and any earlier render of it, intact.
pub fn render_scan_list<R: Renderer>(
    renderer: &R,
    names: &[String],
    source: &str,
    job: &RenderJob,
) -> Result<RenderReport, WsrDataErr> {
    let mut log = AttemptLog::open(&job.array_dir.join("rendering.log"), source)?;
    let mut report = RenderReport::default();

    log.info(&format!("***** Start rendering for {} *****", source))?;

    for name in names {
        let key = match ScanKey::parse(name) {
            Ok(key) => key,
            Err(err) => {
                log.error(&format!("Exception while loading scan {} - {}", name, err))?;
                report.fail_all(name);
                continue;
            }
        };

        let scan_file = local_path(job.scan_dir, &key.scan_path())?;
        let npz_path = local_path(job.array_dir, &key.array_path())?;

        let mut bundle = Bundle::new();
        if npz_path.exists() {
            if job.force {
                bundle = match read_bundle(&npz_path) {
                    Ok(bundle) => bundle,
                    Err(err) => {
                        log.warn(&format!("Unable to read cached arrays for scan {} - {}", name, err))?;
                        Bundle::new()
                    }
                };
            } else {
                log.info(&format!("Rendered arrays already exist for scan {}", name))?;
                report.cached.push(name.clone());
                continue;
            }
        }

        let volume = match renderer.load(&scan_file) {
            Ok(volume) => {
                log.info(&format!("Loaded scan {}", name))?;
                volume
            }
            Err(err) => {
                log.error(&format!("Exception while loading scan {} - {}", name, err))?;
                report.fail_all(name);
                continue;
            }
        };

        let mut changed = false;
        for set in ChannelSet::iter() {
            let config = job.config(set);
            match renderer.render(&volume, config) {
                Ok(data) => {
                    log.info(&format!("Rendered {} from scan {}", describe(set), name))?;
                    if data.shape() != config.shape() {
                        log.warn(&format!("  Unexpectedly, its shape is {:?}.", data.shape()))?;
                    }
                    bundle.insert(set, data);
                    changed = true;
                }
                Err(err) => {
                    log.error(&format!(
                        "Exception while rendering {} from scan {} - {}",
                        describe(set),
                        name,
                        err
                    ))?;
                    report.errors_mut(set).push(name.clone());
                }
            }
        }

        if changed {
            if let Err(err) = write_bundle(&npz_path, &bundle) {
                log.error(&format!("Exception while saving arrays for scan {} - {}", name, err))?;
                report.fail_all(name);
                continue;
            }
            report.rendered.push(name.clone());
        }
    }

    append_list(&job.array_dir.join("array_error_scans.log"), &report.array_errors)?;
    append_list(&job.array_dir.join("dualpol_error_scans.log"), &report.dualpol_errors)?;

    log.info(&format!("***** Finished rendering for file {} *****", source))?;

    Ok(report)
}

/// Write a bundle as a compressed `.npz`, replacing any existing file only once complete.
pub fn write_bundle(path: &Path, bundle: &Bundle) -> Result<(), WsrDataErr> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let part = path.with_extension("npz.part");
    let mut npz = NpzWriter::new_compressed(BufWriter::new(File::create(&part)?));
    for (set, data) in bundle {
        npz.add_array(set.bundle_name(), data)?;
    }
    npz.finish()?;

    std::fs::rename(&part, path)?;
    Ok(())
}

/// Read the arrays present in a bundle. Unknown entries are ignored.
pub fn read_bundle(path: &Path) -> Result<Bundle, WsrDataErr> {
    let mut npz = NpzReader::new(File::open(path)?)?;
    let names = npz.names()?;

    let mut bundle = Bundle::new();
    for set in ChannelSet::iter() {
        let want = set.bundle_name();
        let entry = names
            .iter()
            .find(|n| n.as_str() == want || n.strip_suffix(".npy") == Some(want));

        if let Some(entry) = entry {
            let data: Array4<f32> = npz.by_name(entry)?;
            bundle.insert(set, data);
        }
    }

    Ok(bundle)
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
