//! Named subsets of a manifest's scans.
//!
//! Split files hold manifest scan ids. Key lists are resolved against the manifest by exact
//! string match; keys the manifest does not have are dropped and counted.

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
};

use crate::{
    errors::WsrDataErr,
    json_io::write_json,
    manifest::{Manifest, PriorDataset},
    scan_list::read_names,
};

pub use self::sample::{
    organize_station_years, sample_station_year, write_sampled_splits, SampledSplits,
    SamplingPlan, SplitSample, StationYear,
};

mod sample;

/// Split name to manifest scan ids.
pub type SplitIds = BTreeMap<String, Vec<usize>>;

/// Resolve keys to ids in input order. Returns the ids and the number of keys dropped.
pub fn resolve_keys<S: AsRef<str>>(index: &HashMap<String, usize>, keys: &[S]) -> (Vec<usize>, usize) {
    let ids: Vec<usize> = keys
        .iter()
        .filter_map(|key| index.get(key.as_ref()).copied())
        .collect();
    let dropped = keys.len() - ids.len();
    (ids, dropped)
}

/// Map ids of a prior manifest to ids of the new one through the scan keys.
///
/// Every prior scan is copied into a manifest built on it, so a key that cannot be found is an
/// integrity violation rather than a drop.
pub fn remap_prior_ids(
    prior: &PriorDataset,
    prior_ids: &[usize],
    index: &HashMap<String, usize>,
) -> Result<Vec<usize>, WsrDataErr> {
    prior_ids
        .iter()
        .map(|&id| {
            let key = prior.scan_key(id)?;
            index.get(key).copied().ok_or_else(|| {
                WsrDataErr::IntegrityViolation(format!(
                    "scan {} of prior {} is missing from the manifest",
                    key, prior.version
                ))
            })
        })
        .collect()
}

/// Build the standard split file of a dataset version.
///
/// Each split starts with the priors' ids for it, in prior order, followed by the ids of the
/// new key list of the same name. Key list order is kept.
pub fn standard_splits(
    manifest: &Manifest,
    priors: &[PriorDataset],
    key_lists: &BTreeMap<String, Vec<String>>,
) -> Result<SplitIds, WsrDataErr> {
    let index = manifest.key_index()?;
    let mut splits: SplitIds = key_lists.keys().map(|name| (name.clone(), vec![])).collect();

    for prior in priors {
        for (name, ids) in &prior.splits {
            let remapped = remap_prior_ids(prior, ids, &index)?;
            splits.entry(name.clone()).or_default().extend(remapped);
        }
    }

    for (name, keys) in key_lists {
        let (ids, dropped) = resolve_keys(&index, keys);
        if dropped > 0 {
            log::info!("{} keys of split {} are not in the manifest", dropped, name);
        }
        splits.entry(name.clone()).or_default().extend(ids);
    }

    Ok(splits)
}

/// Read each named key list file.
pub fn read_key_lists(
    paths: &BTreeMap<String, std::path::PathBuf>,
) -> Result<BTreeMap<String, Vec<String>>, WsrDataErr> {
    paths
        .iter()
        .map(|(name, path)| Ok((name.clone(), read_names(path)?)))
        .collect()
}

/// Write one sorted id list per key list in `split_dir` to `<out_dir>/<prefix>_<name>.json`.
///
/// Every `*.txt` in `split_dir` other than `stats.txt` is a key list named after its stem.
/// With `union`, each `train_*` list is also written extended by those ids, as
/// `<prefix>_<name>_union.json`. Returns each written split name with its size.
pub fn write_ratio_splits(
    manifest: &Manifest,
    split_dir: &Path,
    out_dir: &Path,
    prefix: &str,
    union: Option<&[usize]>,
) -> Result<Vec<(String, usize)>, WsrDataErr> {
    let index = manifest.key_index()?;

    let mut lists = vec![];
    for entry in std::fs::read_dir(split_dir)
        .map_err(|_| WsrDataErr::MissingInput(split_dir.display().to_string()))?
    {
        let path = entry?.path();
        let is_list = path.extension().map_or(false, |ext| ext == "txt")
            && path.file_stem().map_or(false, |stem| stem != "stats");
        if !is_list {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            lists.push((stem.to_owned(), path.clone()));
        }
    }
    lists.sort();

    let mut written = vec![];
    for (name, path) in lists {
        let keys = read_names(&path)?;
        let (mut ids, dropped) = resolve_keys(&index, &keys);
        if dropped > 0 {
            log::info!("{} keys of {} are not in the manifest", dropped, path.display());
        }

        let mut union_ids = match union {
            Some(extra) if name.starts_with("train_") => {
                let mut all = ids.clone();
                all.extend_from_slice(extra);
                Some(all)
            }
            _ => None,
        };

        ids.sort_unstable();
        let split_name = format!("{}_{}", prefix, name);
        write_json(&out_dir.join(format!("{}.json", split_name)), &ids, None)?;
        written.push((split_name.clone(), ids.len()));

        if let Some(all) = union_ids.as_mut() {
            all.sort_unstable();
            let union_name = format!("{}_union", split_name);
            write_json(&out_dir.join(format!("{}.json", union_name)), all, None)?;
            written.push((union_name, all.len()));
        }
    }

    Ok(written)
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
