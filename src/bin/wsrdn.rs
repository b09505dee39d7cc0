//! WSR Downloader.
//!
//! Selects evenly spaced scans from the remote archive and mirrors them into your workspace.

extern crate chrono;
extern crate clap;
extern crate env_logger;
extern crate failure;

extern crate wsrdata;

use std::{collections::BTreeMap, path::Path};

use chrono::{Duration, NaiveDateTime};
use clap::{Arg, ArgMatches, SubCommand};
use failure::{err_msg, Error, Fail};
use wsrdata::{
    append_list, by_slot, choose_bucket_url, fetch_keys, flat_list, print_usage_message,
    read_names, select_scans, write_json, write_lines, AttemptLog, CommonCmdLineArgs,
    DatasetConfig, S3Bucket, ScanKey, TimeWindowMatcher,
};

// Largest number of minutes a chrono duration holds.
const MAX_MINUTES: i64 = i64::MAX / 60_000;

fn main() {
    env_logger::init();

    if let Err(ref e) = run() {
        println!("error: {}", e);

        let mut fail: &dyn Fail = e.as_fail();

        while let Some(cause) = fail.cause() {
            println!("caused by: {}", cause);

            if let Some(backtrace) = cause.backtrace() {
                println!("backtrace: {}\n\n\n", backtrace);
            }

            fail = cause;
        }

        ::std::process::exit(1);
    }
}

fn run() -> Result<(), Error> {
    let app = CommonCmdLineArgs::new_app("wsrdn", "Download radar scans into your workspace.")
        .arg(
            Arg::with_name("bucket")
                .long("bucket")
                .takes_value(true)
                .help("Base url of the remote archive.")
                .long_help(concat!(
                    "Base url of the remote archive. Defaults to the bucket_url of --config, or",
                    " the public level II archive."
                )),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .takes_value(true)
                .help("Dataset config file, relative to the root."),
        )
        .subcommand(
            SubCommand::with_name("scans")
                .about("Select one scan per station and time slot and write a scan list.")
                .arg(
                    Arg::with_name("start")
                        .long("start")
                        .takes_value(true)
                        .required(true)
                        .help("First slot, UTC, e.g. 2015-08-01T09:00:00."),
                )
                .arg(
                    Arg::with_name("end")
                        .long("end")
                        .takes_value(true)
                        .required(true)
                        .help("End of the range, UTC. Slots stop before it."),
                )
                .arg(
                    Arg::with_name("stride")
                        .long("stride")
                        .takes_value(true)
                        .default_value("3")
                        .help("Minutes between slots."),
                )
                .arg(
                    Arg::with_name("tolerance")
                        .long("tolerance")
                        .takes_value(true)
                        .default_value("3")
                        .help("Largest distance in minutes between a slot and its scan."),
                )
                .arg(
                    Arg::with_name("output")
                        .short("o")
                        .long("output")
                        .takes_value(true)
                        .required(true)
                        .help("Where to write the list, relative to the root."),
                )
                .arg(
                    Arg::with_name("with-station")
                        .long("with-station")
                        .help("Suffix every key with ;STATION."),
                )
                .arg(
                    Arg::with_name("by-slot")
                        .long("by-slot")
                        .conflicts_with("with-station")
                        .help("Write a JSON map from slot to keys instead of a flat list."),
                ),
        )
        .subcommand(
            SubCommand::with_name("fetch")
                .about("Download every scan of a scan list that is not already present.")
                .arg(
                    Arg::with_name("scan-list")
                        .index(1)
                        .required(true)
                        .help("Scan names or remote keys, one per line, relative to the root."),
                )
                .arg(
                    Arg::with_name("version")
                        .long("version-name")
                        .takes_value(true)
                        .help(concat!(
                            "Name of the log files. Defaults to the dataset version of --config,",
                            " or the scan list file stem."
                        )),
                ),
        );

    let (common_args, matches) = CommonCmdLineArgs::matches(app)?;

    let config = match matches.value_of("config") {
        Some(path) => Some(DatasetConfig::load(&common_args.layout().resolve(path))?),
        None => None,
    };
    let bucket = S3Bucket::new(choose_bucket_url(
        matches.value_of("bucket"),
        config.as_ref(),
    ));

    match matches.subcommand() {
        ("scans", Some(sub_args)) => scans(&common_args, &bucket, sub_args)?,
        ("fetch", Some(sub_args)) => fetch(&common_args, &bucket, config.as_ref(), sub_args)?,
        _ => print_usage_message(&matches, "A subcommand is required."),
    }

    Ok(())
}

fn scans(
    common_args: &CommonCmdLineArgs,
    bucket: &S3Bucket,
    sub_args: &ArgMatches,
) -> Result<(), Error> {
    if common_args.stations().is_empty() {
        print_usage_message(sub_args, "At least one station is required.");
    }

    let parse_time = |name: &str| -> Result<NaiveDateTime, Error> {
        let value = sub_args
            .value_of(name)
            .ok_or_else(|| err_msg(format!("missing --{}", name)))?;
        value
            .parse::<NaiveDateTime>()
            .map_err(|err| err_msg(format!("invalid --{} {}: {}", name, value, err)))
    };
    let parse_minutes = |name: &str| -> Result<Duration, Error> {
        sub_args
            .value_of(name)
            .and_then(|val| val.parse::<i64>().ok())
            .filter(|val| val.checked_abs().map_or(false, |v| v <= MAX_MINUTES))
            .map(Duration::minutes)
            .ok_or_else(|| err_msg(format!("invalid --{}, not an integer number of minutes", name)))
    };

    let start = parse_time("start")?;
    let end = parse_time("end")?;
    let matcher = TimeWindowMatcher::new(parse_minutes("stride")?, parse_minutes("tolerance")?)?;

    let selections = select_scans(bucket, &matcher, common_args.stations(), start, end)?;

    let output = common_args
        .layout()
        .resolve(sub_args.value_of("output").unwrap_or("scan_list.txt"));

    if sub_args.is_present("by-slot") {
        let grouped: BTreeMap<String, Vec<String>> = by_slot(&matcher, &selections, start, end)
            .into_iter()
            .map(|(slot, keys)| {
                (
                    slot.format("%Y%m%d_%H%M%S").to_string(),
                    keys.into_iter().collect(),
                )
            })
            .collect();
        write_json(&output, &grouped, None)?;
    } else {
        write_lines(&output, flat_list(&selections, sub_args.is_present("with-station")))?;
    }

    println!(
        "Selected {} scans for {} stations, written to {}.",
        selections.len(),
        common_args.stations().len(),
        output.display()
    );

    Ok(())
}

fn fetch(
    common_args: &CommonCmdLineArgs,
    bucket: &S3Bucket,
    config: Option<&DatasetConfig>,
    sub_args: &ArgMatches,
) -> Result<(), Error> {
    let layout = common_args.layout();
    let scan_list = layout.resolve(sub_args.value_of("scan-list").unwrap_or("scan_list.txt"));

    let version = match (sub_args.value_of("version"), config) {
        (Some(version), _) => version.to_owned(),
        (None, Some(config)) => config.dataset_version.clone(),
        (None, None) => list_stem(&scan_list)?,
    };

    let keys = read_names(&scan_list)?
        .into_iter()
        .map(|name| {
            if name.contains('/') {
                Ok(name)
            } else {
                ScanKey::parse(&name).map(|key| key.remote_key())
            }
        })
        .collect::<Result<Vec<String>, _>>()?;

    let source = scan_list.display().to_string();
    let mut log = AttemptLog::open(&layout.download_log(&version), &source)?;
    let report = fetch_keys(bucket, &keys, &layout.scan_dir(), Some(&mut log))?;

    append_list(&layout.not_found_log(&version), &report.not_found)?;
    let errors: Vec<String> = report.errors.iter().map(|(key, _)| key.clone()).collect();
    append_list(&layout.fetch_error_log(&version), &errors)?;

    println!(
        "Downloaded {} scans, {} already present. Attempts are logged in {}.",
        report.fetched.len(),
        report.present.len(),
        log.path().display()
    );
    if !report.not_found.is_empty() {
        println!("  {} scans are not in the archive.", report.not_found.len());
    }
    for (key, err) in &report.errors {
        println!("  Error with {}: {}", key, err);
    }

    Ok(())
}

fn list_stem(path: &Path) -> Result<String, Error> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_owned)
        .ok_or_else(|| err_msg(format!("no file name in {}", path.display())))
}
