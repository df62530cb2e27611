//! Deterministic data generators shared by the integration tests.
#![allow(dead_code)]

use half::{bf16, f16};
use nfc_core::{ByteOrder, DType, Tensor};

/// Generate `len` deterministic bytes using a simple LCG.
pub fn pseudo_random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = seed;
    (0..len)
        .map(|_| {
            rng = rng
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng >> 56) as u8
        })
        .collect()
}

/// Generate `len` highly compressible bytes (repeating pattern).
pub fn compressible_bytes(len: usize) -> Vec<u8> {
    let pattern = b"the quick brown fox jumps over the lazy dog. ";
    (0..len).map(|i| pattern[i % pattern.len()]).collect()
}

pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("nfc_test_{}_{}.nfc", name, std::process::id()))
}

/// A slowly varying signal of `n` elements encoded as `dtype` in `order`.
pub fn sample_tensor(dtype: DType, n: usize, order: ByteOrder) -> Tensor {
    let big = order == ByteOrder::Big;
    let mut bytes = Vec::with_capacity(n * dtype.itemsize());
    for i in 0..n {
        let v = ((i * 7) % 61) as i64 - 30 + (i / 13) as i64;
        macro_rules! push {
            ($x:expr) => {{
                let x = $x;
                bytes.extend_from_slice(&if big { x.to_be_bytes() } else { x.to_le_bytes() });
            }};
        }
        match dtype {
            DType::Uint8 => push!(v as u8),
            DType::Uint16 => push!(v as u16),
            DType::Uint32 => push!(v as u32),
            DType::Uint64 => push!(v as u64),
            DType::Int8 => push!(v as i8),
            DType::Int16 => push!(v as i16),
            DType::Int32 => push!(v as i32),
            DType::Int64 => push!(v.wrapping_mul(1 << 40)),
            DType::Float16 => push!(f16::from_f32(v as f32 * 0.25)),
            DType::Bfloat16 => push!(bf16::from_f32(v as f32 * 0.5)),
            DType::Float32 => push!(v as f32 * 0.125),
            DType::Float64 => push!(v as f64 / 3.0),
        }
    }
    Tensor::from_bytes(bytes, dtype, order, vec![n]).expect("sample tensor")
}

/// Byte order to use for `dtype` when the test wants a wide-type order.
pub fn order_for(dtype: DType, wide: ByteOrder) -> ByteOrder {
    if dtype.itemsize() == 1 {
        ByteOrder::NotApplicable
    } else {
        wide
    }
}
