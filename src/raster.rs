//! Decoding of the raw measurement files written by the
//! SDK executable.
use std::io::{self, Read};

use byteordered::ByteOrdered;
use ndarray::Array2;

use crate::sdk::MeasureFormat;

/// Decodes a raw measurement buffer of `width x height`
/// little-endian values into temperatures in Celsius.
///
/// `Int16` buffers hold tenths of a degree.
pub fn decode(
    bytes: &[u8],
    width: usize,
    height: usize,
    format: MeasureFormat,
) -> io::Result<Array2<f32>> {
    let num_values = width * height;
    let expected = num_values * format.bytes_per_pixel();
    if bytes.len() != expected {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "raw measurement size mismatch: expected {} bytes for {}x{} {}, found {}",
                expected,
                width,
                height,
                format.as_arg(),
                bytes.len()
            ),
        ));
    }

    let mut rdr = ByteOrdered::le(bytes);
    let mut values = Vec::with_capacity(num_values);
    match format {
        MeasureFormat::Int16 => {
            for _ in 0..num_values {
                values.push(rdr.read_i16()? as f32 / 10.);
            }
        }
        MeasureFormat::Float32 => {
            for _ in 0..num_values {
                values.push(rdr.read_f32()?);
            }
        }
    }

    Array2::from_shape_vec((height, width), values)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Reads and decodes a raw measurement stream.
pub fn read<R: Read>(
    mut rdr: R,
    width: usize,
    height: usize,
    format: MeasureFormat,
) -> io::Result<Array2<f32>> {
    let mut bytes = Vec::with_capacity(width * height * format.bytes_per_pixel());
    rdr.read_to_end(&mut bytes)?;
    decode(&bytes, width, height, format)
}

/// Encodes temperatures the way the SDK executable writes
/// them. Values are rounded to the nearest tenth for
/// `Int16`.
pub fn encode(values: &Array2<f32>, format: MeasureFormat) -> io::Result<Vec<u8>> {
    let mut wtr = ByteOrdered::le(Vec::with_capacity(values.len() * format.bytes_per_pixel()));
    for &val in values.iter() {
        match format {
            MeasureFormat::Int16 => wtr.write_i16((val * 10.).round() as i16)?,
            MeasureFormat::Float32 => wtr.write_f32(val)?,
        }
    }
    Ok(wtr.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn int16_values_are_tenths_of_a_degree() -> anyhow::Result<()> {
        let bytes: Vec<u8> = [253i16, -105, 0, 1000, 367, -400]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let temps = decode(&bytes, 3, 2, MeasureFormat::Int16)?;
        assert_eq!(temps.dim(), (2, 3));
        assert_eq!(temps[(0, 0)], 25.3);
        assert_eq!(temps[(0, 1)], -10.5);
        assert_eq!(temps[(1, 0)], 100.0);
        assert_eq!(temps[(1, 1)], 36.7);
        assert_eq!(temps[(1, 2)], -40.0);
        Ok(())
    }

    #[test]
    fn float32_values_are_degrees() -> anyhow::Result<()> {
        let bytes: Vec<u8> = [21.25f32, 22.5, 23.75, 24.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let temps = decode(&bytes, 2, 2, MeasureFormat::Float32)?;
        assert_eq!(temps, arr2(&[[21.25, 22.5], [23.75, 24.0]]));
        Ok(())
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let err = decode(&[0u8; 10], 2, 3, MeasureFormat::Int16).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("expected 12 bytes"));

        assert!(decode(&[], 0, 0, MeasureFormat::Float32).is_ok());
    }

    #[test]
    fn encoded_int16_decodes_to_nearest_tenth() -> anyhow::Result<()> {
        let temps = arr2(&[[20.04f32, -3.26], [99.9, 0.0]]);
        let bytes = encode(&temps, MeasureFormat::Int16)?;
        let decoded = read(&bytes[..], 2, 2, MeasureFormat::Int16)?;
        assert_eq!(decoded, arr2(&[[20.0, -3.3], [99.9, 0.0]]));
        Ok(())
    }
}
