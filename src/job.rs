//! Conversion of a single image.
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use serde_derive::*;
use tracing::debug;

use crate::{
    error::{Error, ErrorKind},
    output::{write_tiff, GpsTags},
    params::{MeasurementParams, ParamPolicy},
    sdk::ThermalSdk,
};

/// One input image and where its TIFF goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    /// Position in submission order.
    pub index: usize,
    pub input: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStage {
    Extracting,
    Converting,
    Writing,
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStage::Extracting => "extracting parameters",
            JobStage::Converting => "converting",
            JobStage::Writing => "writing output",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobFailure {
    pub input: PathBuf,
    pub stage: JobStage,
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} failed: {}",
            self.input.display(),
            self.stage,
            self.message
        )
    }
}

#[derive(Debug)]
pub struct JobOutcome {
    pub index: usize,
    /// Path of the written TIFF, or why there is none.
    pub result: Result<PathBuf, JobFailure>,
    /// Parameters the image was converted with, once known.
    pub params: Option<MeasurementParams>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

impl ConversionJob {
    pub fn new(index: usize, input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        ConversionJob {
            index,
            input: input.into(),
            output: output.into(),
        }
    }

    fn failure(&self, stage: JobStage, err: Error) -> JobFailure {
        JobFailure {
            input: self.input.clone(),
            stage,
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Runs the job to completion. Never panics on a bad
    /// input; every error ends up in the outcome.
    ///
    /// Conversion failures are retried up to `retries`
    /// times.
    pub fn run(
        &self,
        sdk: &dyn ThermalSdk,
        policy: &ParamPolicy,
        retries: u32,
        scratch: &Path,
    ) -> JobOutcome {
        let mut params = None;
        let result = self.execute(sdk, policy, retries, scratch, &mut params);
        JobOutcome {
            index: self.index,
            result,
            params,
        }
    }

    fn execute(
        &self,
        sdk: &dyn ThermalSdk,
        policy: &ParamPolicy,
        retries: u32,
        scratch: &Path,
        resolved: &mut Option<MeasurementParams>,
    ) -> Result<PathBuf, JobFailure> {
        let params = policy
            .resolve(sdk, &self.input)
            .map_err(|e| self.failure(JobStage::Extracting, e))?;
        *resolved = Some(params);

        let mut attempt = 0;
        let temps = loop {
            match sdk.measure(&self.input, &params, scratch) {
                Ok(temps) => break temps,
                Err(e) if attempt < retries && e.kind() == ErrorKind::Conversion => {
                    attempt += 1;
                    debug!("retrying {} ({}/{}): {}", self.input.display(), attempt, retries, e);
                }
                Err(e) => return Err(self.failure(JobStage::Converting, e)),
            }
        };

        if let Some(parent) = self.output.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| self.failure(JobStage::Writing, Error::io(parent, e)))?;
        }
        let gps = GpsTags::read(&self.input).map_err(|e| self.failure(JobStage::Writing, e))?;
        write_tiff(&self.output, &temps, &gps).map_err(|e| self.failure(JobStage::Writing, e))?;

        debug!("wrote {}", self.output.display());
        Ok(self.output.clone())
    }
}
