//! The seam to the DJI Thermal SDK.
//!
//! The SDK is treated as a black box offering two
//! operations: reading the metadata embedded in an R-JPEG,
//! and measuring per-pixel temperatures for given
//! parameters.
use std::path::Path;

use ndarray::Array2;
use serde_derive::*;

use crate::{
    error::Result,
    params::{MeasurementParams, ParamRanges},
};

pub trait ThermalSdk: Send + Sync {
    /// Reads resolution, version fields and the embedded
    /// measurement parameters of an R-JPEG.
    ///
    /// Fails with [`ParameterExtraction`][crate::Error::ParameterExtraction]
    /// when the image is not a supported R-JPEG.
    fn inspect(&self, path: &Path) -> Result<RJpegInfo>;

    /// Computes temperatures in Celsius for every pixel of
    /// `input`, using `params`. Intermediate files may be
    /// placed in `scratch` and must be removed before
    /// returning.
    fn measure(
        &self,
        input: &Path,
        params: &MeasurementParams,
        scratch: &Path,
    ) -> Result<Array2<f32>>;
}

impl<T: ThermalSdk + ?Sized> ThermalSdk for &T {
    fn inspect(&self, path: &Path) -> Result<RJpegInfo> {
        (**self).inspect(path)
    }

    fn measure(
        &self,
        input: &Path,
        params: &MeasurementParams,
        scratch: &Path,
    ) -> Result<Array2<f32>> {
        (**self).measure(input, params, scratch)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RJpegInfo {
    /// `(width, height)` in pixels.
    pub resolution: Option<(u32, u32)>,
    pub version: Option<RJpegVersion>,
    pub params: MeasurementParams,
    /// Camera specific ranges, if the SDK reports them.
    pub ranges: Option<ParamRanges>,
}

impl RJpegInfo {
    pub fn ranges_or_documented(&self) -> ParamRanges {
        self.ranges.unwrap_or(ParamRanges::DOCUMENTED)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RJpegVersion {
    pub rjpeg: u32,
    pub header: u32,
    pub curve: u32,
}

/// Encoding of the raw measurement file written by the SDK
/// executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureFormat {
    /// Little-endian `i16`, tenths of a degree.
    Int16,
    /// Little-endian `f32`, degrees.
    Float32,
}

impl Default for MeasureFormat {
    fn default() -> Self {
        MeasureFormat::Int16
    }
}

impl MeasureFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            MeasureFormat::Int16 => 2,
            MeasureFormat::Float32 => 4,
        }
    }

    pub fn as_arg(self) -> &'static str {
        match self {
            MeasureFormat::Int16 => "int16",
            MeasureFormat::Float32 => "float32",
        }
    }
}
