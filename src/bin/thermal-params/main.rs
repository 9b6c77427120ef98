mod args;

use anyhow::{Context, Result};
use args::Args;
use serde_derive::*;

use dji_thermal_tiff::{
    cli::{init_logging, inspection_lines, open_sdk},
    params::ParamRanges,
    sdk::RJpegInfo,
};

#[derive(Serialize)]
struct Inspection<'a> {
    file: String,
    #[serde(flatten)]
    info: &'a RJpegInfo,
    valid_ranges: ParamRanges,
}

fn main() -> Result<()> {
    let Args {
        image,
        config,
        is_json,
        verbose,
    } = Args::from_cmd_line()?;
    init_logging(verbose);

    let sdk = open_sdk(&config.sdk)?;
    let info = sdk
        .inspect(&image)
        .with_context(|| format!("could not read parameters of {}", image.display()))?;
    let ranges = info.ranges_or_documented();

    if is_json {
        let inspection = Inspection {
            file: image.display().to_string(),
            info: &info,
            valid_ranges: ranges,
        };
        serde_json::to_writer_pretty(std::io::stdout().lock(), &inspection)?;
        println!();
        return Ok(());
    }

    for line in inspection_lines(&image, &info) {
        println!("{}", line);
    }
    Ok(())
}
