//! Temperature TIFF output with GPS tags copied from the
//! source image.
//!
//! The output is a single channel, 32-bit IEEE float,
//! little-endian TIFF. The GPS IFD of the source (if any)
//! is copied field by field into a GPS IFD of the output.
use std::{
    fs::File,
    io::{self, BufReader, Cursor, Write},
    path::Path,
};

use byteordered::ByteOrdered;
use exif::{experimental::Writer, Context, Exif, Field, In, Tag, Value};
use ndarray::{Array2, Axis};
use tracing::debug;

use crate::error::{Error, Result};

const ROWS_PER_STRIP: usize = 64;
const TAG_SAMPLE_FORMAT: Tag = Tag(Context::Tiff, 339);
const SAMPLE_FORMAT_IEEE_FP: u16 = 3;
const SOFTWARE: &str = concat!("dji-thermal-tiff ", env!("CARGO_PKG_VERSION"));

/// GPS fields read from a source image.
#[derive(Debug, Clone, Default)]
pub struct GpsTags {
    fields: Vec<Field>,
}

impl GpsTags {
    pub fn none() -> Self {
        Self::default()
    }

    /// Keeps the GPS fields of the primary image.
    pub fn from_exif(exif: &Exif) -> Self {
        let fields = exif
            .fields()
            .filter(|f| {
                f.ifd_num == In::PRIMARY
                    && f.tag.context() == Context::Gps
                    && !matches!(f.value, Value::Unknown(..))
            })
            .cloned()
            .collect();
        GpsTags { fields }
    }

    /// Reads the EXIF of the image at `path`. Images without
    /// EXIF, or with EXIF that cannot be parsed, yield no
    /// GPS tags.
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        match exif::Reader::new().read_from_container(&mut BufReader::new(file)) {
            Ok(exif) => Ok(Self::from_exif(&exif)),
            Err(exif::Error::Io(e)) => Err(Error::io(path, e)),
            Err(e) => {
                debug!("no exif in {}: {}", path.display(), e);
                Ok(Self::none())
            }
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Encodes temperatures as a float TIFF carrying the given
/// GPS tags.
pub fn encode_tiff(temps: &Array2<f32>, gps: &GpsTags) -> io::Result<Vec<u8>> {
    let (height, width) = temps.dim();
    if width == 0 || height == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "cannot encode an empty image",
        ));
    }

    let strips = temps
        .axis_chunks_iter(Axis(0), ROWS_PER_STRIP)
        .map(|rows| -> io::Result<Vec<u8>> {
            let mut wtr = ByteOrdered::le(Vec::with_capacity(4 * rows.len()));
            for &val in rows.iter() {
                wtr.write_f32(val)?;
            }
            Ok(wtr.into_inner())
        })
        .collect::<io::Result<Vec<_>>>()?;
    let strip_refs: Vec<&[u8]> = strips.iter().map(|s| &s[..]).collect();

    let short = |tag: Tag, val: u16| Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Short(vec![val]),
    };
    let long = |tag: Tag, val: u32| Field {
        tag,
        ifd_num: In::PRIMARY,
        value: Value::Long(vec![val]),
    };
    let image_fields = [
        long(Tag::ImageWidth, width as u32),
        long(Tag::ImageLength, height as u32),
        short(Tag::BitsPerSample, 32),
        short(Tag::Compression, 1),
        // BlackIsZero
        short(Tag::PhotometricInterpretation, 1),
        short(Tag::SamplesPerPixel, 1),
        long(Tag::RowsPerStrip, ROWS_PER_STRIP.min(height) as u32),
        short(Tag::PlanarConfiguration, 1),
        Field {
            tag: Tag::Software,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![SOFTWARE.as_bytes().to_vec()]),
        },
        short(TAG_SAMPLE_FORMAT, SAMPLE_FORMAT_IEEE_FP),
    ];

    let mut writer = Writer::new();
    for field in image_fields.iter().chain(gps.fields()) {
        writer.push_field(field);
    }
    writer.set_strips(&strip_refs, In::PRIMARY);

    let mut buf = Cursor::new(Vec::new());
    writer
        .write(&mut buf, true)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    Ok(buf.into_inner())
}

/// Writes the TIFF to `path` atomically: the data goes to a
/// temporary file next to `path` which is renamed once
/// complete.
pub fn write_tiff(path: &Path, temps: &Array2<f32>, gps: &GpsTags) -> Result<()> {
    let bytes = encode_tiff(temps, gps).map_err(|e| Error::conversion(path, e))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".thermal-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|e| Error::io(dir, e))?;
    tmp.write_all(&bytes).map_err(|e| Error::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}
