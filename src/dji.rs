//! In-process parameter extraction through the DIRP
//! library of the DJI Thermal SDK (`dji` feature).
//!
//! Conversion still goes through the SDK utility; only
//! [`ThermalSdk::inspect`] uses the library.
use std::{mem::MaybeUninit, path::Path};

use ndarray::Array2;

use dji_thermal_sys::*;

use crate::{
    error::{Error, Result},
    irp::IrpExecutable,
    params::{MeasurementParams, ParamRange, ParamRanges},
    sdk::{RJpegInfo, RJpegVersion, ThermalSdk},
};

/// An R-JPEG opened by the DIRP library. The handle is
/// released on drop.
#[derive(Debug)]
pub struct RJpeg {
    handle: DIRP_HANDLE,
    // the library may refer to the buffer for the lifetime
    // of the handle
    _data: Vec<u8>,
}

unsafe impl Send for RJpeg {}

impl RJpeg {
    pub fn try_from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        Self::try_from_bytes(data).map_err(|reason| Error::extraction(path, reason))
    }

    pub fn try_from_bytes(bytes: Vec<u8>) -> std::result::Result<Self, String> {
        let size = bytes.len() as i32;
        let mut handle = MaybeUninit::uninit();
        let ret = unsafe { dirp_create_from_rjpeg(bytes.as_ptr(), size, handle.as_mut_ptr()) };
        if ret != 0 {
            return Err(format!("not a supported R-JPEG (dirp error {})", ret));
        }

        Ok(RJpeg {
            handle: unsafe { handle.assume_init() },
            _data: bytes,
        })
    }

    pub fn measurement_params(&self) -> std::result::Result<MeasurementParams, String> {
        let mut params = MaybeUninit::uninit();
        let ret = unsafe { dirp_get_measurement_params(self.handle, params.as_mut_ptr()) };
        if ret != 0 {
            return Err(format!("could not read measurement params (dirp error {})", ret));
        }

        let params = unsafe { params.assume_init() };
        Ok(MeasurementParams {
            emissivity: params.emissivity,
            distance: params.distance,
            humidity: params.humidity,
            reflection: params.reflection,
            ambient: params.ambient_temp,
        })
    }

    /// Camera specific parameter ranges.
    pub fn param_ranges(&self) -> Option<ParamRanges> {
        let mut range = MaybeUninit::uninit();
        let ret = unsafe { dirp_get_measurement_params_range(self.handle, range.as_mut_ptr()) };
        if ret != 0 {
            return None;
        }

        let range = unsafe { range.assume_init() };
        Some(ParamRanges {
            emissivity: ParamRange::new(range.emissivity.min, range.emissivity.max),
            distance: ParamRange::new(range.distance.min, range.distance.max),
            humidity: ParamRange::new(range.humidity.min, range.humidity.max),
            reflection: ParamRange::new(range.reflection.min, range.reflection.max),
            ambient: ParamRange::new(range.ambient_temp.min, range.ambient_temp.max),
        })
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let mut resolution = MaybeUninit::uninit();
        let ret = unsafe { dirp_get_rjpeg_resolution(self.handle, resolution.as_mut_ptr()) };
        if ret != 0 {
            return None;
        }

        let resolution = unsafe { resolution.assume_init() };
        Some((resolution.width as u32, resolution.height as u32))
    }

    pub fn version(&self) -> Option<RJpegVersion> {
        let mut version = MaybeUninit::uninit();
        let ret = unsafe { dirp_get_rjpeg_version(self.handle, version.as_mut_ptr()) };
        if ret != 0 {
            return None;
        }

        let version = unsafe { version.assume_init() };
        Some(RJpegVersion {
            rjpeg: version.rjpeg,
            header: version.header,
            curve: version.curve,
        })
    }
}

impl Drop for RJpeg {
    fn drop(&mut self) {
        unsafe {
            dirp_destroy(self.handle);
        }
    }
}

/// Reads parameters with the DIRP library and converts with
/// the SDK utility.
#[derive(Debug, Clone)]
pub struct DirpSdk {
    irp: IrpExecutable,
}

impl DirpSdk {
    pub fn new(irp: IrpExecutable) -> Self {
        DirpSdk { irp }
    }
}

impl ThermalSdk for DirpSdk {
    fn inspect(&self, path: &Path) -> Result<RJpegInfo> {
        let rjpeg = RJpeg::try_from_path(path)?;
        let params = rjpeg
            .measurement_params()
            .map_err(|reason| Error::extraction(path, reason))?;
        Ok(RJpegInfo {
            resolution: rjpeg.dimensions(),
            version: rjpeg.version(),
            params,
            ranges: rjpeg.param_ranges(),
        })
    }

    fn measure(
        &self,
        input: &Path,
        params: &MeasurementParams,
        scratch: &Path,
    ) -> Result<Array2<f32>> {
        self.irp.measure(input, params, scratch)
    }
}
