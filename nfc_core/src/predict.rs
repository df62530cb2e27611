//! Delta prediction: the reversible, tensor-aware stage that runs before any
//! byte-level compression.
//!
//! Elements are widened into a residual type with enough headroom that the
//! first difference can never overflow, and the residual sequence is stored
//! little-endian regardless of the source byte order. Inversion is a running
//! prefix sum in a 64-bit accumulator (`i64` for integers, `f64` for floats).

use std::fmt;
use std::str::FromStr;

use half::{bf16, f16};
use serde::{Deserialize, Serialize};

use crate::error::{FormatError, Result};
use crate::tensor::{ByteOrder, DType, Tensor};

const STAGE: &str = "prediction";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PredictionModel {
    #[default]
    None,
    Delta,
}

impl PredictionModel {
    pub fn name(self) -> &'static str {
        match self {
            PredictionModel::None => "none",
            PredictionModel::Delta => "delta",
        }
    }
}

impl fmt::Display for PredictionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PredictionModel {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(PredictionModel::None),
            "delta" => Ok(PredictionModel::Delta),
            other => Err(FormatError::InvalidConfig(format!(
                "unknown prediction model '{other}'; valid options: none, delta"
            ))),
        }
    }
}

/// Residual element type for a source element type.
pub fn residual_dtype(source: DType) -> DType {
    match source {
        DType::Uint8 | DType::Int8 => DType::Int16,
        DType::Uint16 | DType::Int16 => DType::Int32,
        DType::Uint32 | DType::Int32 | DType::Uint64 | DType::Int64 => DType::Int64,
        DType::Float16 | DType::Bfloat16 | DType::Float32 | DType::Float64 => DType::Float64,
    }
}

/// Output of the prediction stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Residuals {
    pub dtype: DType,
    /// Little-endian residual elements, one per source element.
    pub bytes: Vec<u8>,
}

/// Source values lifted into the accumulator domain.
enum Lanes {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

// ── Encode ─────────────────────────────────────────────────────────────────

/// Computes `r[0] = x[0]`, `r[i] = x[i] - x[i-1]` in the widened residual type.
///
/// Integer residuals use wrapping arithmetic, which only matters for 64-bit
/// sources and is undone exactly by the wrapping prefix sum.
pub fn predict(tensor: &Tensor) -> Residuals {
    let dtype = residual_dtype(tensor.dtype());
    let mut bytes = Vec::with_capacity(tensor.element_count() * dtype.itemsize());

    match read_lanes(tensor.as_bytes(), tensor.dtype(), tensor.byte_order()) {
        Lanes::Int(values) => {
            let mut prev = 0i64;
            for v in values {
                write_int_residual(&mut bytes, dtype, v.wrapping_sub(prev));
                prev = v;
            }
        }
        Lanes::Float(values) => {
            let mut prev: Option<f64> = None;
            for v in values {
                let r = match prev {
                    Some(p) => v - p,
                    None => v,
                };
                bytes.extend_from_slice(&r.to_le_bytes());
                prev = Some(v);
            }
        }
    }

    Residuals { dtype, bytes }
}

/// Like [`predict`], but returns `None` when the residuals would not restore
/// the source bit-exactly.
///
/// Integer prediction is always exact. Floating subtraction is not exact for
/// every pair of values (wide exponent gaps, NaN payloads, infinities), so
/// floating residuals are restored once and compared before being trusted.
pub fn predict_exact(tensor: &Tensor) -> Result<Option<Residuals>> {
    let residuals = predict(tensor);
    if !tensor.dtype().is_float() {
        return Ok(Some(residuals));
    }
    let restored = restore(
        &residuals.bytes,
        residuals.dtype,
        tensor.dtype(),
        tensor.byte_order(),
    )?;
    if restored == tensor.as_bytes() {
        Ok(Some(residuals))
    } else {
        Ok(None)
    }
}

// ── Decode ─────────────────────────────────────────────────────────────────

/// Inverts [`predict`]: prefix-sums the residuals and casts each running total
/// back to `target`, written in `order`.
pub fn restore(
    residuals: &[u8],
    residual: DType,
    target: DType,
    order: ByteOrder,
) -> Result<Vec<u8>> {
    let expected = residual_dtype(target);
    if residual != expected {
        return Err(FormatError::Transform {
            stage: STAGE,
            reason: format!("{target} sources use {expected} residuals, block declares {residual}"),
        });
    }
    let width = residual.itemsize();
    if residuals.len() % width != 0 {
        return Err(FormatError::Transform {
            stage: STAGE,
            reason: format!(
                "{} residual bytes is not a whole number of {residual} elements",
                residuals.len()
            ),
        });
    }

    let count = residuals.len() / width;
    let mut out = Vec::with_capacity(count * target.itemsize());

    if residual.is_float() {
        let mut acc: Option<f64> = None;
        for chunk in residuals.chunks_exact(8) {
            let r = f64::from_le_bytes(array(chunk));
            let value = match acc {
                Some(a) => a + r,
                None => r,
            };
            write_float(&mut out, target, order, value);
            acc = Some(value);
        }
    } else {
        let mut acc = 0i64;
        for chunk in residuals.chunks_exact(width) {
            acc = acc.wrapping_add(read_int_residual(residual, chunk));
            write_int(&mut out, target, order, acc);
        }
    }

    Ok(out)
}

// ── Element access ─────────────────────────────────────────────────────────

fn read_lanes(bytes: &[u8], dtype: DType, order: ByteOrder) -> Lanes {
    match dtype {
        DType::Uint8 => Lanes::Int(bytes.iter().map(|&b| b as i64).collect()),
        DType::Int8 => Lanes::Int(bytes.iter().map(|&b| b as i8 as i64).collect()),
        DType::Uint16 => Lanes::Int(
            elements(bytes, order, u16::from_le_bytes, u16::from_be_bytes)
                .map(i64::from)
                .collect(),
        ),
        DType::Int16 => Lanes::Int(
            elements(bytes, order, i16::from_le_bytes, i16::from_be_bytes)
                .map(i64::from)
                .collect(),
        ),
        DType::Uint32 => Lanes::Int(
            elements(bytes, order, u32::from_le_bytes, u32::from_be_bytes)
                .map(i64::from)
                .collect(),
        ),
        DType::Int32 => Lanes::Int(
            elements(bytes, order, i32::from_le_bytes, i32::from_be_bytes)
                .map(i64::from)
                .collect(),
        ),
        DType::Uint64 => Lanes::Int(
            elements(bytes, order, u64::from_le_bytes, u64::from_be_bytes)
                .map(|v| v as i64)
                .collect(),
        ),
        DType::Int64 => Lanes::Int(
            elements(bytes, order, i64::from_le_bytes, i64::from_be_bytes).collect(),
        ),
        DType::Float16 => Lanes::Float(
            elements(bytes, order, f16::from_le_bytes, f16::from_be_bytes)
                .map(f16::to_f64)
                .collect(),
        ),
        DType::Bfloat16 => Lanes::Float(
            elements(bytes, order, bf16::from_le_bytes, bf16::from_be_bytes)
                .map(bf16::to_f64)
                .collect(),
        ),
        DType::Float32 => Lanes::Float(
            elements(bytes, order, f32::from_le_bytes, f32::from_be_bytes)
                .map(f64::from)
                .collect(),
        ),
        DType::Float64 => Lanes::Float(
            elements(bytes, order, f64::from_le_bytes, f64::from_be_bytes).collect(),
        ),
    }
}

fn elements<'a, T, const N: usize>(
    bytes: &'a [u8],
    order: ByteOrder,
    from_le: fn([u8; N]) -> T,
    from_be: fn([u8; N]) -> T,
) -> impl Iterator<Item = T> + 'a
where
    T: 'a,
{
    let decode = match order {
        ByteOrder::Big => from_be,
        _ => from_le,
    };
    bytes.chunks_exact(N).map(move |chunk| decode(array(chunk)))
}

fn put<const N: usize>(out: &mut Vec<u8>, order: ByteOrder, le: [u8; N], be: [u8; N]) {
    match order {
        ByteOrder::Big => out.extend_from_slice(&be),
        _ => out.extend_from_slice(&le),
    }
}

fn write_int(out: &mut Vec<u8>, target: DType, order: ByteOrder, value: i64) {
    match target {
        DType::Uint8 | DType::Int8 => out.push(value as u8),
        DType::Uint16 => put(out, order, (value as u16).to_le_bytes(), (value as u16).to_be_bytes()),
        DType::Int16 => put(out, order, (value as i16).to_le_bytes(), (value as i16).to_be_bytes()),
        DType::Uint32 => put(out, order, (value as u32).to_le_bytes(), (value as u32).to_be_bytes()),
        DType::Int32 => put(out, order, (value as i32).to_le_bytes(), (value as i32).to_be_bytes()),
        DType::Uint64 => put(out, order, (value as u64).to_le_bytes(), (value as u64).to_be_bytes()),
        DType::Int64 => put(out, order, value.to_le_bytes(), value.to_be_bytes()),
        // restore() only routes integer residuals to integer targets
        _ => unreachable!("integer residuals restored into {target}"),
    }
}

fn write_float(out: &mut Vec<u8>, target: DType, order: ByteOrder, value: f64) {
    match target {
        DType::Float16 => {
            let v = f16::from_f64(value);
            put(out, order, v.to_le_bytes(), v.to_be_bytes())
        }
        DType::Bfloat16 => {
            let v = bf16::from_f64(value);
            put(out, order, v.to_le_bytes(), v.to_be_bytes())
        }
        DType::Float32 => {
            let v = value as f32;
            put(out, order, v.to_le_bytes(), v.to_be_bytes())
        }
        DType::Float64 => put(out, order, value.to_le_bytes(), value.to_be_bytes()),
        _ => unreachable!("float residuals restored into {target}"),
    }
}

fn write_int_residual(out: &mut Vec<u8>, residual: DType, r: i64) {
    match residual {
        DType::Int16 => out.extend_from_slice(&(r as i16).to_le_bytes()),
        DType::Int32 => out.extend_from_slice(&(r as i32).to_le_bytes()),
        _ => out.extend_from_slice(&r.to_le_bytes()),
    }
}

fn read_int_residual(residual: DType, chunk: &[u8]) -> i64 {
    match residual {
        DType::Int16 => i16::from_le_bytes(array(chunk)) as i64,
        DType::Int32 => i32::from_le_bytes(array(chunk)) as i64,
        _ => i64::from_le_bytes(array(chunk)),
    }
}

fn array<const N: usize>(chunk: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&chunk[..N]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le_tensor<const N: usize, T>(values: &[T], dtype: DType, to_le: fn(T) -> [u8; N]) -> Tensor
    where
        T: Copy,
    {
        let bytes = values.iter().flat_map(|&v| to_le(v)).collect();
        Tensor::from_bytes(bytes, dtype, ByteOrder::Little, vec![values.len()]).unwrap()
    }

    fn round_trip(tensor: &Tensor) -> Vec<u8> {
        let residuals = predict_exact(tensor).unwrap().expect("prediction should be exact");
        restore(&residuals.bytes, residuals.dtype, tensor.dtype(), tensor.byte_order()).unwrap()
    }

    #[test]
    fn int32_ramp_yields_unit_residuals() {
        let t = le_tensor(&[1i32, 2, 3], DType::Int32, i32::to_le_bytes);
        let residuals = predict(&t);
        assert_eq!(residuals.dtype, DType::Int64);
        let values: Vec<i64> = residuals
            .bytes
            .chunks_exact(8)
            .map(|c| i64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![1, 1, 1]);
        assert_eq!(round_trip(&t), t.as_bytes());
    }

    #[test]
    fn uint8_swings_need_signed_residuals() {
        let data = vec![10u8, 12, 10, 5, 8, 20, 255, 250, 0, 5];
        let t = Tensor::from_bytes(data.clone(), DType::Uint8, ByteOrder::NotApplicable, vec![10])
            .unwrap();
        let residuals = predict(&t);
        assert_eq!(residuals.dtype, DType::Int16);
        let values: Vec<i16> = residuals
            .bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes(c.try_into().unwrap()))
            .collect();
        assert_eq!(values, vec![10, 2, -2, -5, 3, 12, 235, -5, -250, 5]);
        assert_eq!(round_trip(&t), data);
    }

    #[test]
    fn residual_widths_follow_source_widths() {
        assert_eq!(residual_dtype(DType::Uint8), DType::Int16);
        assert_eq!(residual_dtype(DType::Uint16), DType::Int32);
        assert_eq!(residual_dtype(DType::Uint32), DType::Int64);
        assert_eq!(residual_dtype(DType::Uint64), DType::Int64);
        assert_eq!(residual_dtype(DType::Int8), DType::Int16);
        assert_eq!(residual_dtype(DType::Float16), DType::Float64);
        assert_eq!(residual_dtype(DType::Float32), DType::Float64);
    }

    #[test]
    fn extremes_of_every_integer_type_round_trip() {
        let u16s = le_tensor(&[0u16, u16::MAX, 0, u16::MAX, 1], DType::Uint16, u16::to_le_bytes);
        assert_eq!(round_trip(&u16s), u16s.as_bytes());

        let i16s = le_tensor(&[i16::MIN, i16::MAX, i16::MIN], DType::Int16, i16::to_le_bytes);
        assert_eq!(round_trip(&i16s), i16s.as_bytes());

        let u32s = le_tensor(&[u32::MAX, 0, u32::MAX], DType::Uint32, u32::to_le_bytes);
        assert_eq!(round_trip(&u32s), u32s.as_bytes());

        let u64s = le_tensor(&[0u64, u64::MAX, 1, u64::MAX / 2], DType::Uint64, u64::to_le_bytes);
        assert_eq!(round_trip(&u64s), u64s.as_bytes());

        let i64s = le_tensor(&[i64::MIN, i64::MAX, i64::MIN, 0], DType::Int64, i64::to_le_bytes);
        assert_eq!(round_trip(&i64s), i64s.as_bytes());

        let i8s = Tensor::from_bytes(vec![0x80, 0x7f, 0x80, 0x00], DType::Int8, ByteOrder::NotApplicable, vec![4])
            .unwrap();
        assert_eq!(round_trip(&i8s), i8s.as_bytes());
    }

    #[test]
    fn monotonic_and_constant_arrays_round_trip() {
        let up: Vec<i32> = (0..1000).map(|i| i * 7919 - 3_000_000).collect();
        let t = le_tensor(&up, DType::Int32, i32::to_le_bytes);
        assert_eq!(round_trip(&t), t.as_bytes());

        let down: Vec<u16> = (0..1000u16).rev().map(|i| i * 60).collect();
        let t = le_tensor(&down, DType::Uint16, u16::to_le_bytes);
        assert_eq!(round_trip(&t), t.as_bytes());

        let zeros = le_tensor(&[0.0f32; 64], DType::Float32, f32::to_le_bytes);
        assert_eq!(round_trip(&zeros), zeros.as_bytes());

        let single = le_tensor(&[42i64], DType::Int64, i64::to_le_bytes);
        assert_eq!(round_trip(&single), single.as_bytes());
    }

    #[test]
    fn big_endian_sources_are_restored_big_endian() {
        let bytes: Vec<u8> = [300u16, 200, 65535, 0].iter().flat_map(|v| v.to_be_bytes()).collect();
        let t = Tensor::from_bytes(bytes.clone(), DType::Uint16, ByteOrder::Big, vec![2, 2]).unwrap();
        assert_eq!(round_trip(&t), bytes);
    }

    #[test]
    fn smooth_floats_are_exact() {
        let values: Vec<f32> = (0..1000).map(|i| i as f32 * 0.1).collect();
        let t = le_tensor(&values, DType::Float32, f32::to_le_bytes);
        assert_eq!(round_trip(&t), t.as_bytes());

        let halves: Vec<f16> = (0..200).map(|i| f16::from_f32(i as f32 * 0.25 - 10.0)).collect();
        let t = le_tensor(&halves, DType::Float16, f16::to_le_bytes);
        assert_eq!(round_trip(&t), t.as_bytes());

        let leading_negative_zero = le_tensor(&[-0.0f64, 1.5, 3.0], DType::Float64, f64::to_le_bytes);
        assert_eq!(round_trip(&leading_negative_zero), leading_negative_zero.as_bytes());
    }

    #[test]
    fn inexact_float_prediction_is_refused() {
        let t = le_tensor(&[1.0e300f64, 1.0e-300, f64::NAN], DType::Float64, f64::to_le_bytes);
        assert!(predict_exact(&t).unwrap().is_none());

        let inf = le_tensor(&[f32::INFINITY, f32::INFINITY], DType::Float32, f32::to_le_bytes);
        assert!(predict_exact(&inf).unwrap().is_none());
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let t = Tensor::from_bytes(Vec::new(), DType::Float32, ByteOrder::Little, vec![0]).unwrap();
        let residuals = predict_exact(&t).unwrap().unwrap();
        assert!(residuals.bytes.is_empty());
        let restored = restore(&residuals.bytes, residuals.dtype, DType::Float32, ByteOrder::Little).unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn mismatched_residual_declarations_are_rejected() {
        assert!(matches!(
            restore(&[0; 8], DType::Int16, DType::Int32, ByteOrder::Little),
            Err(FormatError::Transform { .. })
        ));
        assert!(matches!(
            restore(&[0; 3], DType::Int16, DType::Uint8, ByteOrder::NotApplicable),
            Err(FormatError::Transform { .. })
        ));
    }
}
