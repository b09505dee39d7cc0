//! Day-stratified sampling of train, valid, and test key lists.
//!
//! Scans are grouped by station-year and then by day. A day is a roost day when at least one
//! screened roost annotation falls on it. Test days are drawn separately from roost and
//! non-roost days, so both classes are represented, then train and valid days are drawn from
//! what is left. Whole days go to a split so that consecutive scans of one roost never land in
//! two splits.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::Write as _,
    path::{Path, PathBuf},
};

use chrono::Datelike;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::{
    annotation::ScreenedRow, errors::WsrDataErr, scan_key::ScanKey, scan_list::write_lines,
};

/// Parameters of a sampling run.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingPlan {
    /// Seed of the random number generator shared by every station-year of the run.
    pub seed: u64,
    /// Fraction of each day class reserved for test.
    pub test_ratio: f64,
    /// Fraction of all days used for valid.
    pub valid_ratio: f64,
    /// Fractions of all days used for the nested train lists, ascending.
    pub train_ratios: Vec<f64>,
    /// First and last month, inclusive, of scans and annotations to consider.
    pub months: Option<(u32, u32)>,
}

impl Default for SamplingPlan {
    fn default() -> Self {
        SamplingPlan {
            seed: 1,
            test_ratio: 0.3,
            valid_ratio: 0.2,
            train_ratios: vec![0.0625, 0.125, 0.25, 0.5],
            months: Some((6, 10)),
        }
    }
}

impl SamplingPlan {
    /// Check ratios are fractions and put the train ratios in ascending order.
    pub fn validate(&mut self) -> Result<(), WsrDataErr> {
        let in_range = |r: f64| (0.0..=1.0).contains(&r);
        if !in_range(self.test_ratio)
            || !in_range(self.valid_ratio)
            || !self.train_ratios.iter().all(|&r| in_range(r))
        {
            return Err(WsrDataErr::InvalidConfig(
                "sampling ratios must be between 0 and 1".to_owned(),
            ));
        }
        if self.train_ratios.is_empty() {
            return Err(WsrDataErr::InvalidConfig("no train ratios given".to_owned()));
        }
        self.train_ratios
            .sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        if let Some((first, last)) = self.months {
            if first < 1 || last > 12 || first > last {
                return Err(WsrDataErr::InvalidConfig(format!(
                    "invalid month range {}-{}",
                    first, last
                )));
            }
        }
        Ok(())
    }

    fn checked(&self) -> Result<SamplingPlan, WsrDataErr> {
        let mut plan = self.clone();
        plan.validate()?;
        Ok(plan)
    }

    fn keeps(&self, key: &ScanKey) -> bool {
        match self.months {
            Some((first, last)) => {
                let month = key.date().month();
                first <= month && month <= last
            }
            None => true,
        }
    }

    /// Sample every station-year and write the results under `out_dir`.
    ///
    /// Writes `scan_list.txt` with every considered scan, then one
    /// `<version>_<STATION_YYYY>_splits` directory per station-year. Station-years are sampled
    /// in order from one generator, so a run is reproducible from its seed.
    pub fn run(
        &self,
        station_years: &BTreeMap<String, StationYear>,
        out_dir: &Path,
        version: &str,
    ) -> Result<Vec<(SampledSplits, PathBuf)>, WsrDataErr> {
        let plan = self.checked()?;

        let all_scans = station_years
            .values()
            .flat_map(|sy| sy.days.values().flatten());
        write_lines(&out_dir.join("scan_list.txt"), all_scans)?;

        let mut rng = StdRng::seed_from_u64(plan.seed);
        let mut results = Vec::with_capacity(station_years.len());
        for sy in station_years.values() {
            let splits = sample_station_year(sy, &plan, &mut rng)?;
            let dir = write_sampled_splits(out_dir, version, sy, &splits)?;
            results.push((splits, dir));
        }

        Ok(results)
    }
}

/// The scans and screening results of one station in one year.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StationYear {
    /// `STATION_YYYY`.
    pub name: String,
    /// Scan names by day, `YYYYMMDD`.
    pub days: BTreeMap<String, BTreeSet<String>>,
    /// Scans with at least one roost annotation.
    pub scans_with_roosts: BTreeSet<String>,
    /// Days with at least one roost annotation.
    pub roost_days: BTreeSet<String>,
    /// Every other day.
    pub non_roost_days: BTreeSet<String>,
    /// Roost annotations.
    pub n_roost_annotations: usize,
    /// Roost annotations not on a day marked as missed by the detector.
    pub n_roost_annotations_not_miss_day: usize,
    /// Annotations labeled as bad tracks.
    pub n_bad_track_annotations: usize,
}

impl StationYear {
    fn new(name: String) -> Self {
        StationYear {
            name,
            ..StationYear::default()
        }
    }

    /// Number of days with scans.
    pub fn n_days(&self) -> usize {
        self.days.len()
    }

    fn expand(&self, days: &[String]) -> Vec<String> {
        let mut sorted: Vec<&String> = days.iter().collect();
        sorted.sort();
        sorted
            .into_iter()
            .filter_map(|day| self.days.get(day))
            .flatten()
            .cloned()
            .collect()
    }
}

/// Group scans by station-year and day, and classify days using screened annotation rows.
///
/// Rows that were not viewed are ignored, as are rows labeled `non-roost` or `duplicate`.
/// `bad-track` rows are counted. Any other label must name a kind of roost. A considered row
/// whose scan is not in the scan list is an integrity violation.
pub fn organize_station_years<S: AsRef<str>>(
    scan_names: &[S],
    rows: &[ScreenedRow],
    plan: &SamplingPlan,
) -> Result<BTreeMap<String, StationYear>, WsrDataErr> {
    let mut station_years: BTreeMap<String, StationYear> = BTreeMap::new();

    for name in scan_names {
        let name = name.as_ref();
        let key = ScanKey::parse(name)?;
        if !plan.keeps(&key) {
            continue;
        }
        let sy_name = key.station_year();
        let sy = station_years
            .entry(sy_name.clone())
            .or_insert_with(|| StationYear::new(sy_name));
        if !sy.days.entry(key.day()).or_default().insert(name.to_owned()) {
            return Err(WsrDataErr::IntegrityViolation(format!(
                "scan {} is listed twice",
                name
            )));
        }
    }

    for row in rows {
        let key = ScanKey::parse(&row.filename)?;
        if !plan.keeps(&key) || !row.viewed {
            continue;
        }

        let day = key.day();
        let sy = station_years
            .get_mut(&key.station_year())
            .filter(|sy| sy.days.get(&day).map_or(false, |s| s.contains(&row.filename)))
            .ok_or_else(|| {
                WsrDataErr::IntegrityViolation(format!(
                    "annotated scan {} is not in the scan list",
                    row.filename
                ))
            })?;

        match row.label.as_str() {
            "non-roost" | "duplicate" => {}
            "bad-track" => sy.n_bad_track_annotations += 1,
            label if label.contains("roost") => {
                if row.date != day {
                    return Err(WsrDataErr::IntegrityViolation(format!(
                        "annotation date {} does not match scan {}",
                        row.date, row.filename
                    )));
                }
                sy.n_roost_annotations += 1;
                if !row.is_miss_day() {
                    sy.n_roost_annotations_not_miss_day += 1;
                }
                sy.scans_with_roosts.insert(row.filename.clone());
                sy.roost_days.insert(day);
            }
            label => {
                return Err(WsrDataErr::IntegrityViolation(format!(
                    "unexpected label {} for scan {}",
                    label, row.filename
                )))
            }
        }
    }

    for sy in station_years.values_mut() {
        sy.non_roost_days = sy
            .days
            .keys()
            .filter(|day| !sy.roost_days.contains(*day))
            .cloned()
            .collect();
    }

    Ok(station_years)
}

/// Days and scans of one split.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SplitSample {
    /// Days in the split.
    pub days: Vec<String>,
    /// Scans of those days, in day order.
    pub scans: Vec<String>,
}

/// The splits sampled for one station-year.
#[derive(Clone, Debug, PartialEq)]
pub struct SampledSplits {
    /// `STATION_YYYY`.
    pub station_year: String,
    /// One nested train split per ratio, ascending.
    pub train: Vec<(f64, SplitSample)>,
    /// Validation split.
    pub valid: SplitSample,
    /// Test split.
    pub test: SplitSample,
}

/// Sample splits for one station-year.
///
/// Test takes `test_ratio` of the roost days and of the non-roost days. The remaining days are
/// shuffled; each train split is a prefix of `ratio * n_days` of them and valid is a suffix of
/// `valid_ratio * n_days`. Counts round down. The largest train split, valid, and test share no
/// scan. Train splits come out in ascending ratio order whatever the order in `plan`.
pub fn sample_station_year(
    sy: &StationYear,
    plan: &SamplingPlan,
    rng: &mut StdRng,
) -> Result<SampledSplits, WsrDataErr> {
    let plan = plan.checked()?;
    let n_days = sy.n_days();
    let mut test_days = vec![];
    let mut rest = vec![];

    for class in &[&sy.roost_days, &sy.non_roost_days] {
        let mut days: Vec<String> = class.iter().cloned().collect();
        days.shuffle(rng);
        let n_test = (days.len() as f64 * plan.test_ratio) as usize;
        rest.extend(days.split_off(n_test));
        test_days.extend(days);
    }

    let largest = plan.train_ratios.last().copied().unwrap_or(0.0);
    let n_train = (largest * n_days as f64) as usize;
    let n_valid = (plan.valid_ratio * n_days as f64) as usize;
    if n_train + n_valid > rest.len() {
        return Err(WsrDataErr::GeneralError(format!(
            "{}: {} train and {} valid days requested but only {} are left after test",
            sy.name,
            n_train,
            n_valid,
            rest.len()
        )));
    }

    rest.shuffle(rng);
    let train: Vec<(f64, SplitSample)> = plan
        .train_ratios
        .iter()
        .map(|&ratio| {
            let days = rest[..(ratio * n_days as f64) as usize].to_vec();
            let scans = sy.expand(&days);
            (ratio, SplitSample { days, scans })
        })
        .collect();
    let valid_days = rest[rest.len() - n_valid..].to_vec();
    let valid = SplitSample {
        scans: sy.expand(&valid_days),
        days: valid_days,
    };
    let test = SplitSample {
        scans: sy.expand(&test_days),
        days: test_days,
    };

    let disjoint = |a: &[String], b: &[String]| {
        let a: BTreeSet<&String> = a.iter().collect();
        !b.iter().any(|s| a.contains(s))
    };
    let largest_train = train.last().map(|(_, t)| t.scans.as_slice()).unwrap_or(&[]);
    if !disjoint(largest_train, &valid.scans)
        || !disjoint(largest_train, &test.scans)
        || !disjoint(&valid.scans, &test.scans)
    {
        return Err(WsrDataErr::IntegrityViolation(format!(
            "{}: sampled splits overlap",
            sy.name
        )));
    }

    Ok(SampledSplits {
        station_year: sy.name.clone(),
        train,
        valid,
        test,
    })
}

/// Write the key lists and a stats table of sampled splits. Returns the split directory.
///
/// The directory is `<out_dir>/<version>_<STATION_YYYY>_splits` and holds
/// `train_<ratio>.txt`, `valid.txt`, and `test.txt`, each sorted, plus `stats.txt`.
pub fn write_sampled_splits(
    out_dir: &Path,
    version: &str,
    sy: &StationYear,
    splits: &SampledSplits,
) -> Result<PathBuf, WsrDataErr> {
    let dir = out_dir.join(format!("{}_{}_splits", version, splits.station_year));

    let save = |name: String, scans: &[String]| {
        let mut sorted = scans.to_vec();
        sorted.sort();
        write_lines(&dir.join(name), &sorted)
    };
    for (ratio, train) in &splits.train {
        save(format!("train_{}.txt", ratio), &train.scans)?;
    }
    save("valid.txt".to_owned(), &splits.valid.scans)?;
    save("test.txt".to_owned(), &splits.test.scans)?;

    let mut stats = String::from("split\t\tn_scans\tpos\tneg\tn_days\tpos\tneg\n");
    let mut add_line = |name: &str, split: &SplitSample| {
        let pos_scans = split
            .scans
            .iter()
            .filter(|s| sy.scans_with_roosts.contains(*s))
            .count();
        let pos_days = split.days.iter().filter(|d| sy.roost_days.contains(*d)).count();
        let neg_days = split
            .days
            .iter()
            .filter(|d| sy.non_roost_days.contains(*d))
            .count();
        // Writing to a String cannot fail.
        let _ = writeln!(
            stats,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            name,
            split.scans.len(),
            pos_scans,
            split.scans.len() - pos_scans,
            split.days.len(),
            pos_days,
            neg_days
        );
    };
    for (ratio, train) in &splits.train {
        add_line(&format!("train_{}", ratio), train);
    }
    add_line("valid\t", &splits.valid);
    add_line("test\t", &splits.test);
    std::fs::write(dir.join("stats.txt"), stats)?;

    Ok(dir)
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
