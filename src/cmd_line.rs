//! Command line options that are used across applications.

use std::path::PathBuf;

use clap::{App, Arg, ArgMatches};

use crate::{
    config::{default_root, DatasetLayout},
    errors::WsrDataErr,
};

/// Struct to package up command line arguments.
#[derive(Clone, Debug)]
pub struct CommonCmdLineArgs {
    // Radar stations, e.g. 4 letter identifiers KDOX, KGRR
    stations: Vec<String>,
    // Path to the root of the workspace
    root: PathBuf,
}

impl<'a, 'b> CommonCmdLineArgs {
    /// Create a new set of args.
    pub fn new_app(app_name: &'static str, about: &'static str) -> App<'a, 'b> {
        App::new(app_name)
            .about(about)
            .version(crate_version!())
            .arg(
                Arg::with_name("stations")
                    .multiple(true)
                    .short("s")
                    .long("stations")
                    .takes_value(true)
                    .help("Station identifiers (e.g. KDOX, KGRR)."),
            )
            .arg(
                Arg::with_name("root")
                    .short("r")
                    .long("root")
                    .takes_value(true)
                    .help("Path to the workspace.")
                    .long_help("Path to the workspace. Defaults to '${HOME}/wsrdata/'"),
            )
            .after_help(concat!(
                "Relative paths in configuration files and arguments are resolved against the",
                " workspace root."
            ))
    }

    /// Process an `App` to get the parsed values out of it and the matches object so an application
    /// can continue with further argument parsing.
    pub fn matches(app: App<'a, 'b>) -> Result<(Self, ArgMatches<'a>), WsrDataErr> {
        let matches = app.get_matches();

        let stations: Vec<String> = matches
            .values_of("stations")
            .into_iter()
            .flat_map(|station_iter| station_iter.map(|arg_val| arg_val.to_uppercase()))
            .collect();

        let root = matches
            .value_of("root")
            .map(PathBuf::from)
            .or_else(default_root)
            .ok_or_else(|| {
                WsrDataErr::GeneralError("no --root given and no home directory".to_owned())
            })?;

        Ok((CommonCmdLineArgs { stations, root }, matches))
    }

    /// Get the stations
    pub fn stations(&self) -> &[String] {
        &self.stations
    }

    /// Get the layout of the workspace
    pub fn layout(&self) -> DatasetLayout {
        DatasetLayout::new(&self.root)
    }
}

/// Print a usage error and exit.
pub fn print_usage_message(matches: &ArgMatches, msg: &str) -> ! {
    println!("\n{}\n\n{}\n", msg, matches.usage());
    println!("Try the -h or --help option for more instructions.");
    ::std::process::exit(1);
}
