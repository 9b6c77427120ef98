//! Helpers shared by the accompanying binaries.
//!
//! APIs here shouldn't be considered stable / used as a
//! library.

use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
pub use clap::{App, Arg};
use indicatif::{ProgressBar, ProgressStyle};
pub use inflector::Inflector;
use tracing_subscriber::EnvFilter;

use crate::{
    config::{Config, SdkConfig},
    irp::IrpExecutable,
    params::{MeasurementParams, Param},
    sdk::{RJpegInfo, ThermalSdk},
};

#[macro_export]
macro_rules! args_parser {
    ($name:expr) => {{
        $crate::cli::App::new($name)
            .version(clap::crate_version!())
            .author(clap::crate_authors!())
    }};
}

#[macro_export]
macro_rules! arg {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name).value_name(&$name.to_screaming_snake_case())
    }};
}

#[macro_export]
macro_rules! opt {
    ($name:expr) => {{
        use $crate::cli::Inflector;
        $crate::cli::Arg::with_name($name)
            .long(&$name.to_kebab_case())
            .value_name(&$name.to_screaming_snake_case())
    }};
}

/// Logs go to stderr, filtered by `RUST_LOG` (default
/// `info`, or `debug` when `verbose`).
pub fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

pub fn progress_bar(len: usize) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {wide_bar:cyan/blue} {pos:>7}/{len:7}"),
    );
    bar
}

/// Loads `path` if given, defaults otherwise.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("could not load config {}", path.display())),
        None => Ok(Config::default()),
    }
}

/// The SDK backend for the configured utility. With the
/// `dji` feature, parameters are read in-process.
pub fn open_sdk(cfg: &SdkConfig) -> Result<Arc<dyn ThermalSdk>> {
    let irp = IrpExecutable::from_config(cfg).context("DJI Thermal SDK not usable")?;

    #[cfg(feature = "dji")]
    {
        Ok(Arc::new(crate::dji::DirpSdk::new(irp)))
    }
    #[cfg(not(feature = "dji"))]
    {
        Ok(Arc::new(irp))
    }
}

/// `name<unit>: value` lines, one per parameter.
pub fn param_lines(params: &MeasurementParams) -> Vec<String> {
    Param::ALL
        .iter()
        .map(|&p| format!("  {:<12} {}{}", format!("{}:", p), params.get(p), p.unit()))
        .collect()
}

/// Human readable report of `thermal-params`.
pub fn inspection_lines(image: &Path, info: &RJpegInfo) -> Vec<String> {
    let mut lines = vec![format!("File: {}", image.display())];
    lines.push(match info.resolution {
        Some((w, h)) => format!("Resolution: {} x {}", w, h),
        None => "Resolution: unknown".into(),
    });
    if let Some(v) = info.version {
        lines.push(format!(
            "R-JPEG version: {:#x}, header version: {:#x}, curve version: {:#x}",
            v.rjpeg, v.header, v.curve
        ));
    }

    let ranges = info.ranges_or_documented();
    lines.push("Measurement parameters:".into());
    for &p in Param::ALL.iter() {
        lines.push(format!(
            "  {:<12} {:>8}{:<4} valid {}",
            format!("{}:", p),
            info.params.get(p),
            p.unit(),
            ranges.get(p)
        ));
    }
    if info.ranges.is_none() {
        lines.push("(ranges as documented by the SDK; the image did not report its own)".into());
    }
    lines
}
