//! Select an evenly spaced scan list from an irregularly timed archive.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Duration, NaiveDateTime};

use crate::{
    errors::WsrDataErr,
    scan_key::ScanKey,
    store::{ObjectStore, RemoteObject},
};

/// Picks, for each station and time slot, the nearest scan within a tolerance.
#[derive(Clone, Copy, Debug)]
pub struct TimeWindowMatcher {
    stride: Duration,
    tolerance: Duration,
}

/// A scan chosen for one time slot.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    /// The slot the object was chosen for.
    pub slot: NaiveDateTime,
    /// The chosen object.
    pub object: RemoteObject,
}

impl TimeWindowMatcher {
    /// Default spacing between time slots, in minutes.
    pub const DEFAULT_STRIDE_MINUTES: i64 = 3;
    /// Default maximum distance between a slot and its scan, in minutes.
    pub const DEFAULT_TOLERANCE_MINUTES: i64 = 3;

    /// Create a matcher. The stride must be positive and the tolerance must not be negative.
    pub fn new(stride: Duration, tolerance: Duration) -> Result<Self, WsrDataErr> {
        if stride <= Duration::zero() {
            return Err(WsrDataErr::InvalidConfig(
                "stride must be positive".to_owned(),
            ));
        }
        if tolerance < Duration::zero() {
            return Err(WsrDataErr::InvalidConfig(
                "tolerance must not be negative".to_owned(),
            ));
        }

        Ok(TimeWindowMatcher { stride, tolerance })
    }

    /// The time slots `start, start + stride, ...` strictly before `end`. The slots also stop
    /// where the next one would fall outside the representable range of dates.
    pub fn slots(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> impl Iterator<Item = NaiveDateTime> {
        let stride = self.stride;
        std::iter::successors(Some(start), move |t| t.checked_add_signed(stride))
            .take_while(move |t| *t < end)
    }

    /// Choose scans for every slot between `start` and `end`.
    ///
    /// `objects` maps each station to its objects sorted by key. The per-station cursor only ever
    /// moves forward, so each list is walked once. When two objects are equally close to a slot the
    /// later one wins.
    pub fn select(
        &self,
        stations: &[String],
        objects: &HashMap<String, Vec<RemoteObject>>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Vec<Selection> {
        let tolerance = self.tolerance.num_seconds();
        let mut cursors: HashMap<&str, usize> = HashMap::new();
        let mut selected = vec![];

        for slot in self.slots(start, end) {
            for station in stations {
                let objs = match objects.get(station) {
                    Some(objs) if !objs.is_empty() => objs,
                    _ => continue,
                };

                let cursor = cursors.entry(station.as_str()).or_insert(0);
                let mut i = *cursor;
                let mut dist = distance(objs[i].time, slot);

                while i + 1 < objs.len() {
                    let next_dist = distance(objs[i + 1].time, slot);
                    if dist < next_dist {
                        break;
                    }
                    dist = next_dist;
                    i += 1;
                }

                *cursor = i;

                if dist <= tolerance {
                    selected.push(Selection {
                        slot,
                        object: objs[i].clone(),
                    });
                }
            }
        }

        selected
    }
}

fn distance(a: NaiveDateTime, b: NaiveDateTime) -> i64 {
    (a - b).num_seconds().abs()
}

/// List the scans of one station with times in `[start, end]`, sorted by key.
///
/// Every calendar day touched by the range is listed. Keys that are not scan names, and the
/// `_MDM` metadata files that sit next to scans, are skipped.
pub fn list_station_objects(
    store: &dyn ObjectStore,
    station: &str,
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<Vec<RemoteObject>, WsrDataErr> {
    let mut objects = vec![];

    let mut day = start.date();
    while day <= end.date() {
        for key in store.list(&ScanKey::remote_prefix(day, station))? {
            if key.ends_with("_MDM") {
                continue;
            }

            match RemoteObject::from_key(&key) {
                Ok(obj) if obj.time >= start && obj.time <= end => objects.push(obj),
                Ok(_) => {}
                Err(_) => log::debug!("skipping non-scan key {}", key),
            }
        }
        day = day.succ();
    }

    objects.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(objects)
}

/// List every station and select scans in one pass.
pub fn select_scans(
    store: &dyn ObjectStore,
    matcher: &TimeWindowMatcher,
    stations: &[String],
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<Vec<Selection>, WsrDataErr> {
    let mut objects = HashMap::new();
    for station in stations {
        let objs = list_station_objects(store, station, start, end)?;
        log::info!("{} objects for {} between {} and {}", objs.len(), station, start, end);
        objects.insert(station.clone(), objs);
    }

    Ok(matcher.select(stations, &objects, start, end))
}

/// Flatten selections into keys, optionally suffixed with `;STATION`.
pub fn flat_list(selections: &[Selection], with_station: bool) -> Vec<String> {
    selections
        .iter()
        .map(|sel| {
            if with_station {
                format!("{};{}", sel.object.key, sel.object.station)
            } else {
                sel.object.key.clone()
            }
        })
        .collect()
}

/// Group selections by slot. Every slot in the range appears, possibly with no keys.
pub fn by_slot(
    matcher: &TimeWindowMatcher,
    selections: &[Selection],
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> BTreeMap<NaiveDateTime, BTreeSet<String>> {
    let mut grouped: BTreeMap<NaiveDateTime, BTreeSet<String>> = matcher
        .slots(start, end)
        .map(|slot| (slot, BTreeSet::new()))
        .collect();

    for sel in selections {
        grouped
            .entry(sel.slot)
            .or_default()
            .insert(sel.object.key.clone());
    }

    grouped
}

/*--------------------------------------------------------------------------------------------------
                                          Unit Tests
--------------------------------------------------------------------------------------------------*/
#[cfg(test)]
mod unit {
    use super::*;

    use crate::store::memory::MemoryStore;
    use chrono::NaiveDate;

    fn t(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd(2015, 5, 2).and_hms(h, m, s)
    }

    fn obj(station: &str, time: NaiveDateTime) -> RemoteObject {
        let key = ScanKey::new(station, time).unwrap().with_suffix("_V06");
        RemoteObject::from_key(&key.remote_key()).unwrap()
    }

    fn matcher(stride_min: i64, tol_sec: i64) -> TimeWindowMatcher {
        TimeWindowMatcher::new(Duration::minutes(stride_min), Duration::seconds(tol_sec)).unwrap()
    }

    #[test]
    fn test_slots_exclude_end() {
        let m = matcher(3, 180);
        let slots: Vec<_> = m.slots(t(0, 0, 0), t(0, 9, 0)).collect();
        assert_eq!(slots, vec![t(0, 0, 0), t(0, 3, 0), t(0, 6, 0)]);
    }

    #[test]
    fn test_huge_stride_gives_one_slot() {
        let m = matcher(1_000_000_000_000, 180);
        let slots: Vec<_> = m.slots(t(0, 0, 0), t(23, 0, 0)).collect();
        assert_eq!(slots, vec![t(0, 0, 0)]);
    }

    #[test]
    fn test_tolerance_boundary() {
        let stations = vec!["KMPX".to_owned(), "KDLH".to_owned()];
        let mut objects = HashMap::new();
        objects.insert("KMPX".to_owned(), vec![obj("KMPX", t(0, 6, 0))]);
        objects.insert("KDLH".to_owned(), vec![obj("KDLH", t(0, 6, 1))]);

        let selected = matcher(3, 180).select(&stations, &objects, t(0, 3, 0), t(0, 3, 1));

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].object.station, "KMPX");
    }

    #[test]
    fn test_tie_prefers_later_object() {
        let stations = vec!["KMPX".to_owned()];
        let mut objects = HashMap::new();
        objects.insert(
            "KMPX".to_owned(),
            vec![obj("KMPX", t(0, 2, 0)), obj("KMPX", t(0, 4, 0))],
        );

        let selected = matcher(3, 180).select(&stations, &objects, t(0, 3, 0), t(0, 3, 1));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].object.time, t(0, 4, 0));
    }

    #[test]
    fn test_cursor_is_monotone() {
        let times = [
            t(0, 0, 40),
            t(0, 4, 55),
            t(0, 5, 10),
            t(0, 11, 30),
            t(0, 12, 0),
            t(0, 21, 5),
            t(0, 29, 59),
            t(0, 30, 2),
        ];
        let stations = vec!["KMPX".to_owned()];
        let mut objects = HashMap::new();
        objects.insert(
            "KMPX".to_owned(),
            times.iter().map(|&tm| obj("KMPX", tm)).collect::<Vec<_>>(),
        );

        let selected = matcher(3, 180).select(&stations, &objects, t(0, 0, 0), t(0, 33, 0));

        assert!(!selected.is_empty());
        for pair in selected.windows(2) {
            assert!(pair[0].object.key <= pair[1].object.key);
            assert!(pair[0].slot < pair[1].slot);
        }

        // 00:18 has nothing within three minutes.
        let slots: Vec<_> = selected.iter().map(|s| s.slot).collect();
        assert!(!slots.contains(&t(0, 18, 0)));
        assert!(slots.contains(&t(0, 12, 0)));
    }

    #[test]
    fn test_station_without_objects_selects_nothing() {
        let stations = vec!["KMPX".to_owned(), "KDLH".to_owned()];
        let mut objects = HashMap::new();
        objects.insert("KMPX".to_owned(), vec![obj("KMPX", t(0, 0, 10))]);
        objects.insert("KDLH".to_owned(), vec![]);

        let selected = matcher(3, 180).select(&stations, &objects, t(0, 0, 0), t(0, 3, 0));
        assert_eq!(flat_list(&selected, true).len(), 1);
        assert!(flat_list(&selected, true)[0].ends_with(";KMPX"));
        assert!(!flat_list(&selected, false)[0].contains(';'));
    }

    #[test]
    fn test_select_scans_from_store() {
        let mut store = MemoryStore::with_keys(&[
            "2015/05/02/KMPX/KMPX20150502_000527_V06.gz",
            "2015/05/02/KMPX/KMPX20150502_000527_V06_MDM",
            "2015/05/02/KMPX/KMPX20150502_001520_V06.gz",
            "2015/05/03/KMPX/KMPX20150503_000100_V06.gz",
        ]);
        store
            .objects
            .insert("2015/05/02/KMPX/KMPX_README.txt".to_owned(), vec![]);

        let m = matcher(15, 600);
        let stations = vec!["KMPX".to_owned()];
        let start = t(0, 0, 0);
        let end = NaiveDate::from_ymd(2015, 5, 3).and_hms(0, 0, 0);

        let objs = list_station_objects(&store, "KMPX", start, end).unwrap();
        assert_eq!(objs.len(), 2);
        assert_eq!(store.lists.get(), 2);

        let selected = select_scans(&store, &m, &stations, start, t(0, 20, 0)).unwrap();
        let keys = flat_list(&selected, false);
        assert_eq!(
            keys,
            vec![
                "2015/05/02/KMPX/KMPX20150502_000527_V06.gz",
                "2015/05/02/KMPX/KMPX20150502_001520_V06.gz",
            ]
        );

        let grouped = by_slot(&m, &selected, start, t(0, 20, 0));
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[&t(0, 0, 0)].len(), 1);
        assert_eq!(grouped[&t(0, 15, 0)].len(), 1);
    }
}
