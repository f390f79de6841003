use crate::runtime::error::ErrorKind;
use crate::runtime::value::Value;
use num_bigint::BigInt;
use num_rational::BigRational;
use std::path::Path;

/// Loaders for the typed data files passed on the command line. Each file is
/// a packed little-endian array of fixed-width values, converted to exact
/// rationals at load time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataFormat {
    F32,
    F64,
    I32,
    I64,
}

impl DataFormat {
    fn width(self) -> usize {
        match self {
            DataFormat::F32 | DataFormat::I32 => 4,
            DataFormat::F64 | DataFormat::I64 => 8,
        }
    }

    fn name(self) -> &'static str {
        match self {
            DataFormat::F32 => "f32",
            DataFormat::F64 => "f64",
            DataFormat::I32 => "i32",
            DataFormat::I64 => "i64",
        }
    }
}

pub fn load_data_file(path: &Path, format: DataFormat) -> Result<Value, ErrorKind> {
    let bytes = std::fs::read(path).map_err(|err| {
        ErrorKind::Load(format!("Error opening file '{}': {}", path.display(), err))
    })?;
    decode(&bytes, format)
        .map_err(|message| ErrorKind::Load(format!("{} in '{}'", message, path.display())))
}

fn decode(bytes: &[u8], format: DataFormat) -> Result<Value, String> {
    let width = format.width();
    if bytes.len() % width != 0 {
        return Err(format!(
            "File size {} is not a multiple of {} for an {} array",
            bytes.len(),
            width,
            format.name()
        ));
    }
    let mut items = Vec::with_capacity(bytes.len() / width);
    for chunk in bytes.chunks_exact(width) {
        let value = match format {
            DataFormat::I32 => BigRational::from_integer(BigInt::from(i32::from_le_bytes(
                chunk.try_into().expect("chunk width"),
            ))),
            DataFormat::I64 => BigRational::from_integer(BigInt::from(i64::from_le_bytes(
                chunk.try_into().expect("chunk width"),
            ))),
            DataFormat::F32 => rational_from_float(f32::from_le_bytes(
                chunk.try_into().expect("chunk width"),
            ) as f64)?,
            DataFormat::F64 => rational_from_float(f64::from_le_bytes(
                chunk.try_into().expect("chunk width"),
            ))?,
        };
        items.push(Value::Number(value));
    }
    Ok(Value::Array(items))
}

fn rational_from_float(f: f64) -> Result<BigRational, String> {
    BigRational::from_float(f).ok_or_else(|| format!("Non-finite float value {}", f))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i32_round_trip() {
        let bytes: Vec<u8> = [-1i32, 7, 1000]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let value = decode(&bytes, DataFormat::I32).unwrap();
        assert_eq!(
            value,
            Value::Array(vec![
                Value::from_i64(-1),
                Value::from_i64(7),
                Value::from_i64(1000)
            ])
        );
    }

    #[test]
    fn f32_values_become_exact_binary_fractions() {
        let bytes = 0.25f32.to_le_bytes().to_vec();
        let value = decode(&bytes, DataFormat::F32).unwrap();
        let Value::Array(items) = value else { panic!() };
        assert_eq!(
            items[0],
            Value::Number(BigRational::new(BigInt::from(1), BigInt::from(4)))
        );
    }

    #[test]
    fn truncated_file_is_rejected() {
        let err = decode(&[0u8; 6], DataFormat::I32).unwrap_err();
        assert!(err.contains("not a multiple"));
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let bytes = f64::NAN.to_le_bytes().to_vec();
        assert!(decode(&bytes, DataFormat::F64).is_err());
    }
}
