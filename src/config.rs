//! Batch configuration.
//!
//! Loaded from an optional TOML file and then overridden by
//! command line options in the binaries. Every section has
//! defaults, so an empty file is a valid configuration.
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde_derive::*;

use crate::{
    error::{Error, Result},
    params::{MeasurementParams, ParamMode, ParamPolicy},
    sdk::MeasureFormat,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Number of images converted concurrently.
    pub workers: usize,
    /// Descend into subdirectories of `input_dir`.
    pub recursive: bool,
    /// Accepted file extensions, matched case-insensitively.
    pub extensions: Vec<String>,
    /// Remove the contents of `output_dir` before converting.
    pub clean_output: bool,
    pub params: ParamsConfig,
    pub sdk: SdkConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            input_dir: "input_dir".into(),
            output_dir: "out_dir".into(),
            workers: 10,
            recursive: true,
            extensions: vec!["jpg".into(), "jpeg".into(), "png".into()],
            clean_output: false,
            params: ParamsConfig::default(),
            sdk: SdkConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }

    /// Checks everything that can be checked without
    /// touching the file system, including the manual
    /// parameters.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".into()));
        }
        if self.extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(Error::Config("no image extensions configured".into()));
        }
        self.param_policy()?;
        Ok(())
    }

    pub fn param_policy(&self) -> Result<ParamPolicy> {
        ParamPolicy::from_mode(self.params.mode, self.params.manual)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamsConfig {
    pub mode: ParamMode,
    /// Used only in manual mode.
    pub manual: MeasurementParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdkConfig {
    /// Path to the `dji_irp` executable.
    pub executable: PathBuf,
    /// Directory holding the SDK shared libraries, added to
    /// the library search path of the executable.
    pub library_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    /// Additional attempts after a failed conversion.
    pub retries: u32,
    pub measure_format: MeasureFormat,
}

impl Default for SdkConfig {
    fn default() -> Self {
        SdkConfig {
            executable: default_executable(),
            library_dir: None,
            timeout_secs: None,
            retries: 0,
            measure_format: MeasureFormat::default(),
        }
    }
}

impl SdkConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn default_executable() -> PathBuf {
    let (os, exe) = if cfg!(windows) {
        ("windows", "dji_irp.exe")
    } else {
        ("linux", "dji_irp")
    };
    ["dji_thermal_sdk", "utility", "bin", os, "release_x64", exe]
        .iter()
        .collect()
}
