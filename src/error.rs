//! Crate-level error type.
//!
//! Per-file failures (`ParameterExtraction`, `Conversion`,
//! `Io`) are caught at the job boundary and reported;
//! everything else is a configuration problem that stops a
//! batch before any file is processed.
use std::{io, path::PathBuf};

use serde_derive::*;
use thiserror::Error;

use crate::params::{Param, ParamRange};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid {field}: {value} is outside {range}")]
    Validation {
        field: Param,
        value: f32,
        range: ParamRange,
    },

    #[error("could not read measurement parameters from {}: {reason}", path.display())]
    ParameterExtraction { path: PathBuf, reason: String },

    #[error("could not convert {}: {reason}", path.display())]
    Conversion { path: PathBuf, reason: String },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("thermal SDK executable not found at {}", .0.display())]
    SdkMissing(PathBuf),

    #[error("input directory not found: {}", .0.display())]
    InputDirMissing(PathBuf),

    #[error("no images with extensions {extensions:?} found in {}", dir.display())]
    NoInputs {
        dir: PathBuf,
        extensions: Vec<String>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Coarse classification of an [`Error`], as reported per
/// failed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    ParameterExtraction,
    Conversion,
    Io,
    Configuration,
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn extraction(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::ParameterExtraction {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn conversion(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Conversion {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Validation,
            Error::ParameterExtraction { .. } => ErrorKind::ParameterExtraction,
            Error::Conversion { .. } => ErrorKind::Conversion,
            Error::Io { .. } => ErrorKind::Io,
            Error::SdkMissing(_)
            | Error::InputDirMissing(_)
            | Error::NoInputs { .. }
            | Error::Config(_) => ErrorKind::Configuration,
        }
    }

    /// The measurement parameter a validation error refers
    /// to.
    pub fn field(&self) -> Option<Param> {
        match self {
            Error::Validation { field, .. } => Some(*field),
            _ => None,
        }
    }
}
