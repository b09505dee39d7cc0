//! WSR Dataset Manager.
//!
//! Renders arrays, builds manifests, and writes the splits of a dataset version.

extern crate clap;
extern crate env_logger;
extern crate failure;
extern crate strum;

extern crate wsrdata;

use std::path::PathBuf;

use clap::{Arg, ArgMatches, SubCommand};
use failure::{err_msg, Error, Fail};
use strum::IntoEnumIterator;
use wsrdata::{
    build_manifest, organize_station_years, pool_legacy, pool_screened, print_usage_message,
    read_key_lists, read_legacy_text, read_names, read_screened_csv, remap_prior_ids,
    render_scan_list, standard_splits, write_json, write_ratio_splits, AnnotationPool,
    ArrayRegistry, ChannelSet, CommandRenderer, CommonCmdLineArgs, DatasetConfig, DatasetLayout,
    Manifest, PriorDataset, RenderJob, SamplingPlan, SourceFormat,
};

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

fn config_arg<'a, 'b>() -> Arg<'a, 'b> {
    Arg::with_name("config")
        .short("c")
        .long("config")
        .takes_value(true)
        .required(true)
        .help("Dataset config file, relative to the root.")
}

fn run() -> Result<(), Error> {
    let app = CommonCmdLineArgs::new_app("wsrdm", "Manage the datasets in your workspace.")
        .subcommand(
            SubCommand::with_name("render")
                .about("Render arrays for every scan of the config's scan list.")
                .arg(config_arg())
                .arg(
                    Arg::with_name("renderer")
                        .long("renderer")
                        .takes_value(true)
                        .required(true)
                        .help("Program called as `<program> [args] <volume> <config.json> <out.npy>`."),
                )
                .arg(
                    Arg::with_name("renderer-args")
                        .long("renderer-args")
                        .takes_value(true)
                        .multiple(true)
                        .allow_hyphen_values(true)
                        .help("Leading arguments for the renderer program."),
                )
                .arg(
                    Arg::with_name("scan-list")
                        .long("scan-list")
                        .takes_value(true)
                        .help("Render this list instead of the config's."),
                )
                .arg(
                    Arg::with_name("force")
                        .long("force")
                        .help("Re-render scans that already have arrays."),
                ),
        )
        .subcommand(
            SubCommand::with_name("build")
                .about("Build the manifest and standard splits of a dataset version.")
                .arg(config_arg()),
        )
        .subcommand(
            SubCommand::with_name("splits")
                .about("Write ratio split files from a directory of sampled key lists.")
                .arg(
                    Arg::with_name("dataset")
                        .long("dataset")
                        .takes_value(true)
                        .required(true)
                        .help("Dataset version whose manifest the ids refer to."),
                )
                .arg(
                    Arg::with_name("split-dir")
                        .long("split-dir")
                        .takes_value(true)
                        .required(true)
                        .help("Directory of train_<ratio>.txt, valid.txt, and test.txt."),
                )
                .arg(
                    Arg::with_name("prefix")
                        .long("prefix")
                        .takes_value(true)
                        .required(true)
                        .help("Prefix of the written files, e.g. KGRR_2015."),
                )
                .arg(
                    Arg::with_name("output-version")
                        .long("output-version")
                        .takes_value(true)
                        .help("Dataset directory to write into. Defaults to --dataset."),
                )
                .arg(
                    Arg::with_name("union-manifest")
                        .long("union-manifest")
                        .takes_value(true)
                        .requires("union-splits")
                        .help("Prior manifest whose train split is added to each train list."),
                )
                .arg(
                    Arg::with_name("union-splits")
                        .long("union-splits")
                        .takes_value(true)
                        .requires("union-manifest")
                        .help("Standard split file of the prior manifest."),
                ),
        )
        .subcommand(
            SubCommand::with_name("sample")
                .about("Sample train, valid, and test key lists by day for each station-year.")
                .arg(
                    Arg::with_name("scan-list")
                        .long("scan-list")
                        .takes_value(true)
                        .required(true)
                        .help("Scans with rendered arrays."),
                )
                .arg(
                    Arg::with_name("annotations")
                        .long("annotations")
                        .takes_value(true)
                        .multiple(true)
                        .required(true)
                        .help("Screened CSV files."),
                )
                .arg(
                    Arg::with_name("version")
                        .long("dataset")
                        .takes_value(true)
                        .required(true)
                        .help("Dataset version the lists are for, e.g. v0.2.10."),
                )
                .arg(
                    Arg::with_name("output")
                        .short("o")
                        .long("output")
                        .takes_value(true)
                        .required(true)
                        .help("Directory for the lists."),
                )
                .arg(
                    Arg::with_name("seed")
                        .long("seed")
                        .takes_value(true)
                        .default_value("1"),
                )
                .arg(
                    Arg::with_name("test-ratio")
                        .long("test-ratio")
                        .takes_value(true)
                        .default_value("0.3"),
                )
                .arg(
                    Arg::with_name("valid-ratio")
                        .long("valid-ratio")
                        .takes_value(true)
                        .default_value("0.2"),
                )
                .arg(
                    Arg::with_name("train-ratios")
                        .long("train-ratios")
                        .takes_value(true)
                        .multiple(true)
                        .help("Nested train fractions. Defaults to 0.0625 0.125 0.25 0.5."),
                )
                .arg(
                    Arg::with_name("all-months")
                        .long("all-months")
                        .help("Consider every month instead of June through October."),
                ),
        );

    let (common_args, matches) = CommonCmdLineArgs::matches(app)?;
    let layout = common_args.layout();

    match matches.subcommand() {
        ("render", Some(sub_args)) => render(&layout, sub_args)?,
        ("build", Some(sub_args)) => build(&layout, sub_args)?,
        ("splits", Some(sub_args)) => splits(&layout, sub_args)?,
        ("sample", Some(sub_args)) => sample(&layout, sub_args)?,
        _ => print_usage_message(&matches, "A subcommand is required."),
    }

    Ok(())
}

fn load_config(layout: &DatasetLayout, sub_args: &ArgMatches) -> Result<DatasetConfig, Error> {
    let path = sub_args
        .value_of("config")
        .map(|p| layout.resolve(p))
        .ok_or_else(|| err_msg("missing --config"))?;
    Ok(DatasetConfig::load(&path)?)
}

fn render(layout: &DatasetLayout, sub_args: &ArgMatches) -> Result<(), Error> {
    let config = load_config(layout, sub_args)?;

    let mut registry = ArrayRegistry::open(&layout.arrays_root())?;
    let array_dir =
        registry.check_or_register(&config.array_version, &config.version_configs(), config.indent)?;

    let scan_list = sub_args
        .value_of("scan-list")
        .map(PathBuf::from)
        .unwrap_or_else(|| config.scan_list.clone());
    let scan_list = layout.resolve(scan_list);
    let names = read_names(&scan_list)?;

    let program = sub_args
        .value_of("renderer")
        .ok_or_else(|| err_msg("missing --renderer"))?;
    let args: Vec<String> = sub_args
        .values_of("renderer-args")
        .into_iter()
        .flat_map(|vals| vals.map(str::to_owned))
        .collect();
    let renderer = CommandRenderer::new(program, args);

    let scan_dir = layout.scan_dir();
    let job = RenderJob {
        scan_dir: &scan_dir,
        array_dir: &array_dir,
        array: &config.array,
        dualpol: &config.dualpol,
        force: config.force_render || sub_args.is_present("force"),
    };

    let source = scan_list.display().to_string();
    let report = render_scan_list(&renderer, &names, &source, &job)?;

    println!(
        "Rendered {} scans, {} already cached.",
        report.rendered.len(),
        report.cached.len()
    );
    for set in ChannelSet::iter() {
        let errors = report.errors(set);
        if !errors.is_empty() {
            println!("  {} scans failed for {}.", errors.len(), set.bundle_name());
        }
    }

    Ok(())
}

fn build(layout: &DatasetLayout, sub_args: &ArgMatches) -> Result<(), Error> {
    let config = load_config(layout, sub_args)?;

    let manifest_path = layout.manifest_path(&config.dataset_version);
    if manifest_path.exists() && !config.overwrite {
        println!(
            "{} already exists, set overwrite to replace it.",
            manifest_path.display()
        );
        return Ok(());
    }

    let mut registry = ArrayRegistry::open(&layout.arrays_root())?;
    let array_dir =
        registry.check_or_register(&config.array_version, &config.version_configs(), config.indent)?;

    let mut priors = Vec::with_capacity(config.priors.len());
    for prior in &config.priors {
        let splits = prior.splits.as_ref().map(|p| layout.resolve(p));
        let loaded = PriorDataset::load(&layout.resolve(&prior.manifest), splits.as_deref())?;
        if loaded.version != prior.version {
            return Err(err_msg(format!(
                "prior manifest {} is version {}",
                prior.manifest.display(),
                loaded.version
            )));
        }
        priors.push(loaded);
    }

    let ctx = config.annotation_context();
    let mut pool = AnnotationPool::new();
    for source in &config.annotations {
        let path = layout.resolve(&source.path);
        let added = match source.format {
            SourceFormat::Csv => {
                let rows = read_screened_csv(&path)?;
                pool_screened(&rows, source.box_scaling()?, &ctx, &mut pool)?
            }
            SourceFormat::Legacy => pool_legacy(&read_legacy_text(&path)?, &ctx, &mut pool)?,
        };
        println!("{} annotations from {}.", added, path.display());
    }

    let scan_names = read_names(&layout.resolve(&config.scan_list))?;
    let (manifest, report) = build_manifest(
        config.manifest_info(),
        &config.categories,
        &config.subcategories,
        &priors,
        &scan_names,
        &array_dir,
        pool,
    )?;
    manifest.write(&manifest_path, config.indent)?;

    println!(
        "{} scans ({} from priors) and {} annotations written to {}.",
        manifest.scans.len(),
        report.prior_scans,
        manifest.annotations.len(),
        manifest_path.display()
    );
    println!("{}", report);
    for annotator in &report.unknown_annotators {
        println!("  No scale factor for annotator {}, their annotations are skipped.", annotator);
    }

    let key_lists = read_key_lists(
        &config
            .splits
            .iter()
            .map(|(name, path)| (name.clone(), layout.resolve(path)))
            .collect(),
    )?;
    let splits = standard_splits(&manifest, &priors, &key_lists)?;
    let split_path = layout.split_path(&config.dataset_version, &config.split_version());
    write_json(&split_path, &splits, config.indent)?;

    for (name, ids) in &splits {
        println!("{}\t{}", ids.len(), name);
    }

    Ok(())
}

fn splits(layout: &DatasetLayout, sub_args: &ArgMatches) -> Result<(), Error> {
    let arg = |name: &str| {
        sub_args
            .value_of(name)
            .ok_or_else(|| err_msg(format!("missing --{}", name)))
    };

    let dataset = arg("dataset")?;
    let manifest = Manifest::load(&layout.manifest_path(dataset))?;
    let out_dir = layout.dataset_dir(sub_args.value_of("output-version").unwrap_or(dataset));

    let union = match (sub_args.value_of("union-manifest"), sub_args.value_of("union-splits")) {
        (Some(prior_manifest), Some(prior_splits)) => {
            let prior = PriorDataset::load(
                &layout.resolve(prior_manifest),
                Some(&layout.resolve(prior_splits)),
            )?;
            let train = prior
                .splits
                .get("train")
                .ok_or_else(|| err_msg(format!("prior {} has no train split", prior.version)))?;
            Some(remap_prior_ids(&prior, train, &manifest.key_index()?)?)
        }
        _ => None,
    };

    let written = write_ratio_splits(
        &manifest,
        &layout.resolve(arg("split-dir")?),
        &out_dir,
        arg("prefix")?,
        union.as_deref(),
    )?;

    for (name, len) in written {
        println!("{}\t{}", len, name);
    }

    Ok(())
}

fn sample(layout: &DatasetLayout, sub_args: &ArgMatches) -> Result<(), Error> {
    let parse = |name: &str| -> Result<f64, Error> {
        sub_args
            .value_of(name)
            .and_then(|val| val.parse::<f64>().ok())
            .ok_or_else(|| err_msg(format!("invalid --{}, not parseable as a number", name)))
    };

    let mut plan = SamplingPlan::default();
    plan.seed = sub_args
        .value_of("seed")
        .and_then(|val| val.parse::<u64>().ok())
        .ok_or_else(|| err_msg("invalid --seed, not parseable as an integer"))?;
    plan.test_ratio = parse("test-ratio")?;
    plan.valid_ratio = parse("valid-ratio")?;
    if let Some(vals) = sub_args.values_of("train-ratios") {
        plan.train_ratios = vals
            .map(|val| val.parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|err| err_msg(format!("invalid --train-ratios: {}", err)))?;
    }
    if sub_args.is_present("all-months") {
        plan.months = None;
    }
    plan.validate()?;

    let scan_list = layout.resolve(sub_args.value_of("scan-list").unwrap_or("scan_list.txt"));
    let names = read_names(&scan_list)?;

    let mut rows = vec![];
    for path in sub_args.values_of("annotations").into_iter().flatten() {
        rows.extend(read_screened_csv(&layout.resolve(path))?);
    }

    let station_years = organize_station_years(&names, &rows, &plan)?;
    let out_dir = layout.resolve(sub_args.value_of("output").unwrap_or("."));
    let version = sub_args
        .value_of("version")
        .ok_or_else(|| err_msg("missing --dataset"))?;

    for (splits, dir) in plan.run(&station_years, &out_dir, version)? {
        let sizes: Vec<String> = splits
            .train
            .iter()
            .map(|(ratio, train)| format!("train_{} {}", ratio, train.scans.len()))
            .collect();
        println!(
            "{}: {}, valid {}, test {} scans in {}.",
            splits.station_year,
            sizes.join(", "),
            splits.valid.scans.len(),
            splits.test.scans.len(),
            dir.display()
        );
    }

    Ok(())
}
