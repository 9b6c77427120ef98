use anyhow::Result;
use dji_thermal_tiff::{arg, args_parser, cli::load_config, config::Config, opt};
use std::path::PathBuf;

pub struct Args {
    pub image: PathBuf,
    pub config: Config,
    pub is_json: bool,
    pub verbose: bool,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("thermal-params")
            .about("Print the measurement parameters stored in a DJI R-JPEG.")
            .arg(
                opt!("json")
                    .short("j")
                    .takes_value(false)
                    .help("Print as JSON"),
            )
            .arg(opt!("sdk").help("Path to the dji_irp executable"))
            .arg(
                opt!("config")
                    .short("c")
                    .help("TOML configuration file (only the sdk section is used)"),
            )
            .arg(
                opt!("verbose")
                    .short("v")
                    .takes_value(false)
                    .help("Debug logging"),
            )
            .arg(arg!("image").required(true).help("R-JPEG to inspect"))
            .get_matches();

        let config_path = matches.value_of("config").map(PathBuf::from);
        let mut config = load_config(config_path.as_deref())?;
        if let Some(sdk) = matches.value_of("sdk") {
            config.sdk.executable = sdk.into();
        }

        Ok(Args {
            image: matches.value_of("image").unwrap().into(),
            config,
            is_json: matches.is_present("json"),
            verbose: matches.is_present("verbose"),
        })
    }
}
