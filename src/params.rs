//! Measurement parameters used by the SDK to turn raw
//! sensor values into temperatures.
//!
//! The parameters are either read per image from the
//! R-JPEG metadata ([`ParamPolicy::Embedded`]) or supplied
//! once and applied to every image of a batch
//! ([`ParamPolicy::Fixed`]).
use std::{fmt, path::Path, str::FromStr};

use serde_derive::*;

use crate::{
    error::{Error, Result},
    sdk::ThermalSdk,
};

/// The five measurement parameters understood by the DJI
/// Thermal SDK.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementParams {
    pub emissivity: f32,
    /// Distance to the target in meters.
    pub distance: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
    /// Reflected apparent temperature in Celsius.
    pub reflection: f32,
    /// Ambient air temperature in Celsius.
    pub ambient: f32,
}

impl Default for MeasurementParams {
    fn default() -> Self {
        MeasurementParams {
            emissivity: 0.95,
            distance: 5.0,
            humidity: 70.0,
            reflection: 25.0,
            ambient: 25.0,
        }
    }
}

impl MeasurementParams {
    pub fn set(&mut self, param: Param, value: f32) {
        match param {
            Param::Emissivity => self.emissivity = value,
            Param::Distance => self.distance = value,
            Param::Humidity => self.humidity = value,
            Param::Reflection => self.reflection = value,
            Param::Ambient => self.ambient = value,
        }
    }

    pub fn get(&self, param: Param) -> f32 {
        match param {
            Param::Emissivity => self.emissivity,
            Param::Distance => self.distance,
            Param::Humidity => self.humidity,
            Param::Reflection => self.reflection,
            Param::Ambient => self.ambient,
        }
    }

    /// Checks every field against
    /// [`ParamRanges::DOCUMENTED`], reporting the first field
    /// out of range.
    pub fn validate(self) -> Result<Self> {
        let ranges = ParamRanges::DOCUMENTED;
        for param in Param::ALL {
            let value = self.get(param);
            let range = ranges.get(param);
            if !range.contains(value) {
                return Err(Error::Validation {
                    field: param,
                    value,
                    range,
                });
            }
        }
        Ok(self)
    }
}

impl fmt::Display for MeasurementParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "emissivity: {:.2}, distance: {:.2} m, humidity: {:.1} %, \
             reflection: {:.2} °C, ambient: {:.2} °C",
            self.emissivity, self.distance, self.humidity, self.reflection, self.ambient
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Param {
    Emissivity,
    Distance,
    Humidity,
    Reflection,
    Ambient,
}

impl Param {
    pub const ALL: [Param; 5] = [
        Param::Emissivity,
        Param::Distance,
        Param::Humidity,
        Param::Reflection,
        Param::Ambient,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Param::Emissivity => "emissivity",
            Param::Distance => "distance",
            Param::Humidity => "humidity",
            Param::Reflection => "reflection",
            Param::Ambient => "ambient",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Param::Emissivity => "",
            Param::Distance => " m",
            Param::Humidity => " %",
            Param::Reflection | Param::Ambient => " °C",
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Param {
    type Err = String;

    /// Case-insensitive; `ambient_temp` is the SDK's name
    /// for `ambient`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "emissivity" => Ok(Param::Emissivity),
            "distance" => Ok(Param::Distance),
            "humidity" => Ok(Param::Humidity),
            "reflection" => Ok(Param::Reflection),
            "ambient" | "ambient_temp" => Ok(Param::Ambient),
            _ => Err(format!("unknown measurement parameter `{}`", s)),
        }
    }
}

/// Closed interval of valid values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f32,
    pub max: f32,
}

impl ParamRange {
    pub const fn new(min: f32, max: f32) -> Self {
        ParamRange { min, max }
    }

    /// `false` for NaN.
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

impl fmt::Display for ParamRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRanges {
    pub emissivity: ParamRange,
    pub distance: ParamRange,
    pub humidity: ParamRange,
    pub reflection: ParamRange,
    pub ambient: ParamRange,
}

impl ParamRanges {
    pub const DOCUMENTED: ParamRanges = ParamRanges {
        emissivity: ParamRange::new(0.10, 1.00),
        distance: ParamRange::new(1.0, 300.0),
        humidity: ParamRange::new(1.0, 100.0),
        reflection: ParamRange::new(-40.0, 100.0),
        ambient: ParamRange::new(-40.0, 80.0),
    };

    pub fn get(&self, param: Param) -> ParamRange {
        match param {
            Param::Emissivity => self.emissivity,
            Param::Distance => self.distance,
            Param::Humidity => self.humidity,
            Param::Reflection => self.reflection,
            Param::Ambient => self.ambient,
        }
    }
}

/// How a batch obtains its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamMode {
    Auto,
    Manual,
}

impl Default for ParamMode {
    fn default() -> Self {
        ParamMode::Auto
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamPolicy {
    /// Read the parameters embedded in each image.
    Embedded,
    /// Apply the same (validated) parameters to every image.
    Fixed(MeasurementParams),
}

impl ParamPolicy {
    pub fn manual(params: MeasurementParams) -> Result<Self> {
        Ok(ParamPolicy::Fixed(params.validate()?))
    }

    pub fn from_mode(mode: ParamMode, manual: MeasurementParams) -> Result<Self> {
        match mode {
            ParamMode::Auto => Ok(ParamPolicy::Embedded),
            ParamMode::Manual => Self::manual(manual),
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self, ParamPolicy::Embedded)
    }

    /// Parameters to use for the image at `path`.
    ///
    /// Embedded values outside the documented ranges are
    /// reported as extraction failures of that image.
    pub fn resolve(&self, sdk: &dyn ThermalSdk, path: &Path) -> Result<MeasurementParams> {
        match self {
            ParamPolicy::Fixed(params) => Ok(*params),
            ParamPolicy::Embedded => {
                let info = sdk.inspect(path)?;
                info.params.validate().map_err(|e| Error::extraction(path, e))
            }
        }
    }
}
