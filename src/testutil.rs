//! Fixtures shared by the unit tests.
use std::{
    fs,
    io::Cursor,
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};

use anyhow::Result as AnyResult;
use exif::{experimental::Writer, Field, In, Rational, Tag, Value};
use img_parts::{jpeg::Jpeg, ImageEXIF};
use ndarray::Array2;

use crate::{
    error::{Error, Result},
    params::MeasurementParams,
    sdk::{RJpegInfo, RJpegVersion, ThermalSdk},
};

fn dms(deg: f64) -> Vec<Rational> {
    let deg = deg.abs();
    let whole = deg.trunc();
    let minutes = (deg - whole) * 60.;
    let seconds = (minutes - minutes.trunc()) * 60.;
    vec![
        Rational {
            num: whole as u32,
            denom: 1,
        },
        Rational {
            num: minutes.trunc() as u32,
            denom: 1,
        },
        Rational {
            num: (seconds * 100.).round() as u32,
            denom: 100,
        },
    ]
}

/// TIFF-structured EXIF holding only a GPS IFD.
pub fn gps_exif(lat: f64, lon: f64) -> AnyResult<Vec<u8>> {
    let gps = |tag: Tag, value: Value| Field {
        tag,
        ifd_num: In::PRIMARY,
        value,
    };
    let fields = [
        gps(Tag::GPSVersionID, Value::Byte(vec![2, 3, 0, 0])),
        gps(
            Tag::GPSLatitudeRef,
            Value::Ascii(vec![if lat >= 0. { b"N".to_vec() } else { b"S".to_vec() }]),
        ),
        gps(Tag::GPSLatitude, Value::Rational(dms(lat))),
        gps(
            Tag::GPSLongitudeRef,
            Value::Ascii(vec![if lon >= 0. { b"E".to_vec() } else { b"W".to_vec() }]),
        ),
        gps(Tag::GPSLongitude, Value::Rational(dms(lon))),
        gps(
            Tag::GPSAltitude,
            Value::Rational(vec![Rational {
                num: 12345,
                denom: 100,
            }]),
        ),
    ];

    let mut writer = Writer::new();
    for field in fields.iter() {
        writer.push_field(field);
    }
    let mut buf = Cursor::new(Vec::new());
    writer.write(&mut buf, false)?;
    Ok(buf.into_inner())
}

/// Writes a small grayscale JPEG, optionally with GPS EXIF.
pub fn write_jpeg(path: &Path, width: u32, height: u32, gps: Option<(f64, f64)>) -> AnyResult<()> {
    let img = image::GrayImage::from_fn(width, height, |x, y| image::Luma([(x * 16 + y) as u8]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageLuma8(img).write_to(&mut bytes, image::ImageOutputFormat::Jpeg(90))?;

    if let Some((lat, lon)) = gps {
        let mut jpeg = Jpeg::from_bytes(bytes.into())?;
        jpeg.set_exif(Some(gps_exif(lat, lon)?.into()));
        let mut out = Vec::new();
        jpeg.encoder().write_to(&mut out)?;
        bytes = out;
    }

    fs::write(path, bytes)?;
    Ok(())
}

/// In-process stand-in for the SDK.
///
/// Files containing `corrupt` fail extraction, files
/// containing `broken` fail measurement. Temperatures are a
/// pure function of the file contents and the parameters.
#[derive(Debug)]
pub struct FakeSdk {
    pub width: usize,
    pub height: usize,
    pub params: MeasurementParams,
    /// Number of initial `measure` calls that fail.
    pub flaky: usize,
    pub inspected: AtomicUsize,
    pub measured: AtomicUsize,
}

impl Default for FakeSdk {
    fn default() -> Self {
        FakeSdk {
            width: 4,
            height: 3,
            params: MeasurementParams {
                emissivity: 0.9,
                distance: 10.,
                humidity: 55.,
                reflection: 20.,
                ambient: 18.,
            },
            flaky: 0,
            inspected: AtomicUsize::new(0),
            measured: AtomicUsize::new(0),
        }
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

impl ThermalSdk for FakeSdk {
    fn inspect(&self, path: &Path) -> Result<RJpegInfo> {
        self.inspected.fetch_add(1, Ordering::SeqCst);
        let data = fs::read(path).map_err(|e| Error::io(path, e))?;
        if contains(&data, b"corrupt") {
            return Err(Error::extraction(path, "could not parse rjpeg"));
        }
        Ok(RJpegInfo {
            resolution: Some((self.width as u32, self.height as u32)),
            version: Some(RJpegVersion {
                rjpeg: 1,
                header: 0x103,
                curve: 1,
            }),
            params: self.params,
            ranges: None,
        })
    }

    fn measure(
        &self,
        input: &Path,
        params: &MeasurementParams,
        _scratch: &Path,
    ) -> Result<Array2<f32>> {
        let call = self.measured.fetch_add(1, Ordering::SeqCst);
        if call < self.flaky {
            return Err(Error::conversion(input, "file is locked"));
        }
        let data = fs::read(input).map_err(|e| Error::io(input, e))?;
        if contains(&data, b"broken") {
            return Err(Error::conversion(input, "dji_irp exited with status 1"));
        }
        let seed = data.iter().map(|&b| b as u32).sum::<u32>() % 50;
        Ok(Array2::from_shape_fn((self.height, self.width), |(r, c)| {
            params.ambient + params.emissivity * seed as f32 + r as f32 + c as f32 / 10.
        }))
    }
}
