mod args;

use std::{fs::File, io::BufWriter};

use anyhow::{Context, Result};
use args::Args;

use dji_thermal_tiff::{
    batch::Batch,
    cli::{init_logging, open_sdk, param_lines, progress_bar},
    params::ParamPolicy,
};

const SHOWN_FAILURES: usize = 5;

fn main() -> Result<()> {
    let Args {
        config,
        report,
        verbose,
    } = Args::from_cmd_line()?;
    init_logging(verbose);

    eprintln!("DJI thermal R-JPEG to temperature TIFF");
    eprintln!("  input:   {}", config.input_dir.display());
    eprintln!("  output:  {}", config.output_dir.display());
    eprintln!("  workers: {}", config.workers);
    eprintln!("  dji_irp: {}", config.sdk.executable.display());

    let batch = Batch::new(config).context("invalid configuration")?;
    let sdk = open_sdk(&batch.config().sdk)?;
    match batch.policy() {
        ParamPolicy::Embedded => eprintln!("Parameters: read from each image"),
        ParamPolicy::Fixed(params) => {
            eprintln!("Parameters: manual");
            for line in param_lines(params) {
                eprintln!("{}", line);
            }
        }
    }

    let jobs = batch.plan()?;
    eprintln!("Found {} images", jobs.len());

    let summary = batch.run(&*sdk, &jobs, progress_bar(jobs.len()))?;

    eprintln!("Processed: {}/{} succeeded", summary.succeeded, summary.total);
    for failure in summary.failures.iter().take(SHOWN_FAILURES) {
        eprintln!("  {}", failure);
    }
    if summary.failed() > SHOWN_FAILURES {
        eprintln!("  ... {} more", summary.failed() - SHOWN_FAILURES);
    }

    if let Some(path) = report {
        let file = File::create(&path)
            .with_context(|| format!("could not create report {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &summary)?;
        eprintln!("Report written to {}", path.display());
    }
    Ok(())
}
