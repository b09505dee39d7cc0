//! The canonical identity of a radar scan: station plus UTC time.
//!
//! Every stage (fetch, render, manifest) derives station, time, and paths from a [`ScanKey`],
//! never by slicing names on its own.

use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::errors::WsrDataErr;

const STATION_LEN: usize = 4;
const TIME_LEN: usize = 15; // YYYYMMDD_HHMMSS
const TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

/// A station and a UTC timestamp with second resolution.
///
/// Scan files usually carry a trailing suffix such as `_V06`. The suffix is kept so names and
/// paths can be rebuilt, but it takes no part in equality, hashing, or ordering.
#[derive(Clone, Debug)]
pub struct ScanKey {
    station: String,
    time: NaiveDateTime,
    suffix: String,
}

impl ScanKey {
    /// Build a key from its components.
    pub fn new(station: &str, time: NaiveDateTime) -> Result<Self, WsrDataErr> {
        if station.len() != STATION_LEN || !station.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(WsrDataErr::MalformedKey(station.to_owned()));
        }

        Ok(ScanKey {
            station: station.to_owned(),
            time: time.with_nanosecond(0).unwrap_or(time),
            suffix: String::new(),
        })
    }

    /// Attach a non-identifying suffix, e.g. `_V06`.
    pub fn with_suffix(self, suffix: &str) -> Self {
        ScanKey {
            suffix: suffix.to_owned(),
            ..self
        }
    }

    /// Parse a scan file name, a scan name, or a full remote key.
    ///
    /// Any leading directories are ignored, as is everything from the first `.` of the file name
    /// on (compression or bundle extensions).
    pub fn parse(name: &str) -> Result<Self, WsrDataErr> {
        let malformed = || WsrDataErr::MalformedKey(name.to_owned());

        let file_name = name.rsplit('/').next().unwrap_or(name);
        let stem = file_name.split('.').next().unwrap_or(file_name);

        if !stem.is_ascii() || stem.len() < STATION_LEN + TIME_LEN {
            return Err(malformed());
        }

        let station = &stem[..STATION_LEN];
        let time_str = &stem[STATION_LEN..STATION_LEN + TIME_LEN];
        let suffix = &stem[STATION_LEN + TIME_LEN..];

        // chrono accepts a few non-fixed-width forms, so check the digits explicitly.
        let fixed_width = time_str.bytes().enumerate().all(|(i, b)| {
            if i == 8 {
                b == b'_'
            } else {
                b.is_ascii_digit()
            }
        });
        if !fixed_width {
            return Err(malformed());
        }
        if !suffix.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return Err(malformed());
        }

        let time = NaiveDateTime::parse_from_str(time_str, TIME_FORMAT).map_err(|_| malformed())?;

        Ok(ScanKey::new(station, time)
            .map_err(|_| malformed())?
            .with_suffix(suffix))
    }

    /// The four character station identifier.
    pub fn station(&self) -> &str {
        &self.station
    }

    /// The scan time, UTC.
    pub fn time(&self) -> NaiveDateTime {
        self.time
    }

    /// The non-identifying suffix, possibly empty.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// The scan date, UTC.
    pub fn date(&self) -> NaiveDate {
        self.time.date()
    }

    /// The day as `YYYYMMDD`, used to group scans into days.
    pub fn day(&self) -> String {
        self.time.format("%Y%m%d").to_string()
    }

    /// The station and year as `STATION_YYYY`.
    pub fn station_year(&self) -> String {
        format!("{}_{:04}", self.station, self.time.year())
    }

    /// The identifying string plus suffix, e.g. `KOKX20130721_093320_V06`.
    pub fn scan_name(&self) -> String {
        format!("{}{}", self, self.suffix)
    }

    /// The relative directory for this scan, `YYYY/MM/DD/STATION`.
    pub fn date_dir(&self) -> String {
        format!(
            "{:04}/{:02}/{:02}/{}",
            self.time.year(),
            self.time.month(),
            self.time.day(),
            self.station
        )
    }

    /// The key of the raw volume in the remote store.
    pub fn remote_key(&self) -> String {
        format!("{}/{}.gz", self.date_dir(), self.scan_name())
    }

    /// The path of the raw volume relative to the local scan directory.
    pub fn scan_path(&self) -> String {
        self.remote_key()
    }

    /// The path of the rendered bundle relative to an array version directory.
    pub fn array_path(&self) -> String {
        format!("{}/{}.npz", self.date_dir(), self.scan_name())
    }

    /// The listing prefix for all objects of one station on one day.
    pub fn remote_prefix(date: NaiveDate, station: &str) -> String {
        format!(
            "{:04}/{:02}/{:02}/{}/{}",
            date.year(),
            date.month(),
            date.day(),
            station,
            station
        )
    }
}

impl fmt::Display for ScanKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}", self.station, self.time.format(TIME_FORMAT))
    }
}

impl FromStr for ScanKey {
    type Err = WsrDataErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScanKey::parse(s)
    }
}

impl PartialEq for ScanKey {
    fn eq(&self, other: &Self) -> bool {
        self.station == other.station && self.time == other.time
    }
}

impl Eq for ScanKey {}

impl Hash for ScanKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.station.hash(state);
        self.time.hash(state);
    }
}

impl PartialOrd for ScanKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScanKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.station
            .cmp(&other.station)
            .then(self.time.cmp(&other.time))
    }
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
#[cfg(test)]
mod unit {
    use super::*;

    use std::collections::HashSet;

    #[test]
    fn test_parse_components() {
        let key = ScanKey::parse("KOKX20130721_093320_V06.gz").unwrap();

        assert_eq!(key.station(), "KOKX");
        assert_eq!(
            key.time(),
            NaiveDate::from_ymd(2013, 7, 21).and_hms(9, 33, 20)
        );
        assert_eq!(key.suffix(), "_V06");
    }

    #[test]
    fn test_format_is_left_inverse_of_parse() {
        for name in &[
            "KOKX20130721_093320_V06",
            "KTBW20031123_115217",
            "KDOX20100904_000512_V03.gz",
            "2015/05/02/KMPX/KMPX20150502_021525_V06.gz",
        ] {
            let key = ScanKey::parse(name).unwrap();
            let file_name = name.rsplit('/').next().unwrap();
            assert!(file_name.starts_with(&key.to_string()));
            assert_eq!(key.to_string().len(), 19);
            assert!(file_name.starts_with(&key.scan_name()));
        }
    }

    #[test]
    fn test_malformed_keys() {
        for name in &[
            "",
            "KOKX",
            "KOKX2013072_093320",
            "KOKX20130721-093320",
            "KOKX20131321_093320",
            "KOKX2013O721_093320",
            "KO-X20130721_093320",
            "KOKX20130721_0933",
        ] {
            match ScanKey::parse(name) {
                Err(WsrDataErr::MalformedKey(_)) => {}
                other => panic!("expected malformed key for {:?}, got {:?}", name, other),
            }
        }
    }

    #[test]
    fn test_equality_ignores_suffix() {
        let a = ScanKey::parse("KOKX20130721_093320_V06").unwrap();
        let b = ScanKey::parse("KOKX20130721_093320.gz").unwrap();
        let c = ScanKey::parse("KOKX20130721_093321_V06").unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<ScanKey> = vec![a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_paths() {
        let key = ScanKey::parse("KOKX20130721_093320_V06").unwrap();

        assert_eq!(key.date_dir(), "2013/07/21/KOKX");
        assert_eq!(
            key.remote_key(),
            "2013/07/21/KOKX/KOKX20130721_093320_V06.gz"
        );
        assert_eq!(
            key.array_path(),
            "2013/07/21/KOKX/KOKX20130721_093320_V06.npz"
        );
        assert_eq!(key.day(), "20130721");
        assert_eq!(key.station_year(), "KOKX_2013");
        assert_eq!(
            ScanKey::remote_prefix(NaiveDate::from_ymd(2013, 7, 1), "KOKX"),
            "2013/07/01/KOKX/KOKX"
        );
    }

    #[test]
    fn test_new_from_components() {
        let time = NaiveDate::from_ymd(2020, 6, 1).and_hms(9, 28, 53);
        let key = ScanKey::new("KAPX", time).unwrap();
        assert_eq!(key.to_string(), "KAPX20200601_092853");
        assert!(ScanKey::new("KAP", time).is_err());
    }

    #[test]
    fn test_ordering_is_chronological_within_station() {
        let mut keys: Vec<ScanKey> = [
            "KOKX20130721_100000_V06",
            "KOKX20130721_093320_V06",
            "KAMX20130722_000000_V06",
        ]
        .iter()
        .map(|n| ScanKey::parse(n).unwrap())
        .collect();
        keys.sort();

        let names: Vec<String> = keys.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec![
                "KAMX20130722_000000",
                "KOKX20130721_093320",
                "KOKX20130721_100000"
            ]
        );
    }
}
