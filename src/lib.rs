//! Batch conversion of DJI radiometric R-JPEGs into
//! single-band temperature TIFFs.
//!
//! The conversion itself is done by `dji_irp`, the command
//! line utility of the DJI Thermal SDK. This crate drives
//! it: it [discovers](batch::discover_inputs) the images of
//! a directory, [resolves](params::ParamPolicy) the
//! measurement parameters of each image, runs the utility
//! once per image on a bounded worker pool and writes the
//! measured temperatures (in °C) as a 32-bit float TIFF
//! carrying the GPS tags of the source image.
//!
//! # Usage
//!
//! ```rust,no_run
//! # fn test_compile() -> anyhow::Result<()> {
//! use dji_thermal_tiff::{Batch, Config, IrpExecutable};
//! use indicatif::ProgressBar;
//!
//! let config = Config::load("thermal.toml".as_ref())?;
//! let sdk = IrpExecutable::from_config(&config.sdk)?;
//!
//! let batch = Batch::new(config)?;
//! let jobs = batch.plan()?;
//! let report = batch.run(&sdk, &jobs, ProgressBar::hidden())?;
//! println!("{}/{} converted", report.succeeded, report.total);
//! # Ok(())
//! # }
//! ```
//!
//! The parameters stored in a single image can be read with
//! [`ThermalSdk::inspect`]; the `thermal-params` binary
//! prints them along with their admissible ranges.
//!
//! With the `dji` feature, parameters are read in-process
//! through the SDK's DIRP library ([`dji::DirpSdk`]).

pub mod batch;
pub mod config;
pub mod error;
pub mod irp;
pub mod job;
pub mod output;
pub mod params;
pub mod raster;
pub mod sdk;

#[cfg(feature = "dji")]
pub mod dji;

#[cfg(feature = "cli")]
pub mod cli;

#[cfg(test)]
mod testutil;

pub use crate::batch::{Batch, BatchReport};
pub use crate::config::Config;
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::irp::IrpExecutable;
pub use crate::params::{MeasurementParams, Param, ParamPolicy};
pub use crate::sdk::{RJpegInfo, ThermalSdk};
