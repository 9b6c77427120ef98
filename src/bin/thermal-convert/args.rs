use anyhow::{Context, Result};
use clap::{value_t_or_exit, ArgMatches};
use dji_thermal_tiff::{
    arg, args_parser,
    cli::load_config,
    config::Config,
    opt,
    params::{Param, ParamMode},
};
use std::path::PathBuf;

pub struct Args {
    pub config: Config,
    pub report: Option<PathBuf>,
    pub verbose: bool,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("thermal-convert")
            .setting(clap::AppSettings::AllowLeadingHyphen)
            .about("Convert DJI thermal R-JPEGs into temperature TIFFs.")
            .arg(
                opt!("config")
                    .short("c")
                    .help("TOML configuration file; options below override it"),
            )
            .arg(
                arg!("input dir")
                    .index(1)
                    .help("Directory of R-JPEGs (default: input_dir)"),
            )
            .arg(
                opt!("output dir")
                    .short("o")
                    .help("Directory for the TIFFs (default: out_dir)"),
            )
            .arg(
                opt!("workers")
                    .short("w")
                    .help("Images converted concurrently (default: 10)"),
            )
            .arg(
                opt!("flat")
                    .takes_value(false)
                    .help("Do not descend into subdirectories"),
            )
            .arg(
                opt!("manual")
                    .short("m")
                    .takes_value(false)
                    .help("Use the same parameters for every image instead of reading them"),
            )
            .arg(
                opt!("sdk")
                    .help("Path to the dji_irp executable"),
            )
            .arg(opt!("timeout").help("Seconds before a dji_irp call is killed"))
            .arg(opt!("retries").help("Additional attempts after a failed conversion"))
            .arg(
                opt!("clean")
                    .takes_value(false)
                    .help("Remove previous contents of the output directory"),
            )
            .arg(opt!("report").help("Write the batch report as JSON to this file"))
            .arg(
                opt!("verbose")
                    .short("v")
                    .takes_value(false)
                    .help("Debug logging (RUST_LOG takes precedence)"),
            )
            .arg(opt!("emissivity").requires("manual").help("Manual emissivity [0.1, 1]"))
            .arg(opt!("distance").requires("manual").help("Manual distance in m [1, 300]"))
            .arg(opt!("humidity").requires("manual").help("Manual humidity in % [1, 100]"))
            .arg(
                opt!("reflection")
                    .requires("manual")
                    .help("Manual reflected temperature in °C [-40, 100]"),
            )
            .arg(
                opt!("ambient")
                    .requires("manual")
                    .help("Manual ambient temperature in °C [-40, 80]"),
            )
            .get_matches();

        let config_path = matches.value_of("config").map(PathBuf::from);
        let mut config = load_config(config_path.as_deref())?;
        apply_overrides(&mut config, &matches)?;

        Ok(Args {
            config,
            report: matches.value_of("report").map(PathBuf::from),
            verbose: matches.is_present("verbose"),
        })
    }
}

fn apply_overrides(config: &mut Config, matches: &ArgMatches) -> Result<()> {
    if let Some(dir) = matches.value_of("input dir") {
        config.input_dir = dir.into();
    }
    if let Some(dir) = matches.value_of("output dir") {
        config.output_dir = dir.into();
    }
    if matches.is_present("workers") {
        config.workers = value_t_or_exit!(matches, "workers", usize);
    }
    if matches.is_present("flat") {
        config.recursive = false;
    }
    if matches.is_present("clean") {
        config.clean_output = true;
    }
    if let Some(sdk) = matches.value_of("sdk") {
        config.sdk.executable = sdk.into();
    }
    if matches.is_present("timeout") {
        config.sdk.timeout_secs = Some(value_t_or_exit!(matches, "timeout", u64));
    }
    if matches.is_present("retries") {
        config.sdk.retries = value_t_or_exit!(matches, "retries", u32);
    }

    if matches.is_present("manual") {
        config.params.mode = ParamMode::Manual;
        for &p in Param::ALL.iter() {
            if let Some(value) = matches.value_of(p.name()) {
                let value = value
                    .parse::<f32>()
                    .with_context(|| format!("{} must be a number, got {}", p, value))?;
                config.params.manual.set(p, value);
            }
        }
    }
    Ok(())
}
