//! Structural tensor descriptor: element type, byte order, shape and the raw
//! element bytes. No numeric work happens here apart from byte swapping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FormatError, Result};

/// Element type of a tensor, named the way numpy names them.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float16,
    Bfloat16,
    Float32,
    Float64,
}

impl DType {
    pub const ALL: [DType; 12] = [
        DType::Uint8,
        DType::Uint16,
        DType::Uint32,
        DType::Uint64,
        DType::Int8,
        DType::Int16,
        DType::Int32,
        DType::Int64,
        DType::Float16,
        DType::Bfloat16,
        DType::Float32,
        DType::Float64,
    ];

    /// Width of one element in bytes.
    pub fn itemsize(self) -> usize {
        match self {
            DType::Uint8 | DType::Int8 => 1,
            DType::Uint16 | DType::Int16 | DType::Float16 | DType::Bfloat16 => 2,
            DType::Uint32 | DType::Int32 | DType::Float32 => 4,
            DType::Uint64 | DType::Int64 | DType::Float64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            DType::Float16 | DType::Bfloat16 | DType::Float32 | DType::Float64
        )
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            DType::Int8 | DType::Int16 | DType::Int32 | DType::Int64
        ) || self.is_float()
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::Uint8 => "uint8",
            DType::Uint16 => "uint16",
            DType::Uint32 => "uint32",
            DType::Uint64 => "uint64",
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Float16 => "float16",
            DType::Bfloat16 => "bfloat16",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self> {
        DType::ALL
            .into_iter()
            .find(|dtype| dtype.name() == s)
            .ok_or_else(|| FormatError::InvalidConfig(format!("unknown dtype '{s}'")))
    }
}

/// Byte order of multi-byte elements.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    Little,
    Big,
    /// One-byte element types have no byte order.
    NotApplicable,
}

impl ByteOrder {
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ByteOrder::Little => "little",
            ByteOrder::Big => "big",
            ByteOrder::NotApplicable => "not_applicable",
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ByteOrder {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "little" | "<" => Ok(ByteOrder::Little),
            "big" | ">" => Ok(ByteOrder::Big),
            "native" | "=" => Ok(ByteOrder::native()),
            "not_applicable" | "|" => Ok(ByteOrder::NotApplicable),
            other => Err(FormatError::InvalidConfig(format!(
                "unknown byte order '{other}'"
            ))),
        }
    }
}

/// A raw element buffer plus the descriptor needed to interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tensor {
    dtype: DType,
    byte_order: ByteOrder,
    shape: Vec<usize>,
    data: Vec<u8>,
}

impl Tensor {
    /// Wrap `bytes` as a tensor, validating that the buffer holds exactly
    /// `product(shape)` elements of `dtype`.
    ///
    /// One-byte types always carry `ByteOrder::NotApplicable`; wider types
    /// must name a concrete order.
    pub fn from_bytes(
        bytes: Vec<u8>,
        dtype: DType,
        byte_order: ByteOrder,
        shape: Vec<usize>,
    ) -> Result<Self> {
        let byte_order = match (dtype.itemsize(), byte_order) {
            (1, _) => ByteOrder::NotApplicable,
            (_, ByteOrder::NotApplicable) => {
                return Err(FormatError::InvalidConfig(format!(
                    "{dtype} elements need a little or big byte order"
                )))
            }
            (_, order) => order,
        };
        let count = element_count(&shape).ok_or_else(|| {
            FormatError::InvalidConfig(format!("shape {shape:?} overflows the element count"))
        })?;
        let expected = count.checked_mul(dtype.itemsize()).ok_or_else(|| {
            FormatError::InvalidConfig(format!("shape {shape:?} overflows the byte length"))
        })?;
        if bytes.len() != expected {
            return Err(FormatError::InvalidConfig(format!(
                "{} bytes cannot hold a {dtype} tensor of shape {shape:?} ({expected} bytes)",
                bytes.len()
            )));
        }
        Ok(Self {
            dtype,
            byte_order,
            shape,
            data: bytes,
        })
    }

    /// Wrap bytes that are already in this machine's byte order.
    pub fn from_native(bytes: Vec<u8>, dtype: DType, shape: Vec<usize>) -> Result<Self> {
        Self::from_bytes(bytes, dtype, ByteOrder::native(), shape)
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn element_count(&self) -> usize {
        self.data.len() / self.dtype.itemsize()
    }

    pub fn nbytes(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.clone()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Returns the tensor with its elements in native byte order, swapping
    /// bytes when the declared order differs.
    pub fn to_native_order(mut self) -> Self {
        let native = ByteOrder::native();
        if self.byte_order == ByteOrder::NotApplicable || self.byte_order == native {
            return self;
        }
        for element in self.data.chunks_exact_mut(self.dtype.itemsize()) {
            element.reverse();
        }
        self.byte_order = native;
        self
    }
}

/// Product of the dimensions; `None` on overflow. A zero-dimensional shape
/// holds one element.
pub fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_bytes_validates_length() {
        let ok = Tensor::from_bytes(vec![0; 24], DType::Float32, ByteOrder::Little, vec![2, 3]);
        assert_eq!(ok.unwrap().element_count(), 6);

        let short = Tensor::from_bytes(vec![0; 20], DType::Float32, ByteOrder::Little, vec![2, 3]);
        assert!(matches!(short, Err(FormatError::InvalidConfig(_))));
    }

    #[test]
    fn empty_tensor_is_valid() {
        let t = Tensor::from_bytes(Vec::new(), DType::Float32, ByteOrder::Little, vec![0]).unwrap();
        assert_eq!(t.element_count(), 0);
        assert_eq!(t.nbytes(), 0);
    }

    #[test]
    fn one_byte_types_have_no_byte_order() {
        let t = Tensor::from_bytes(vec![1, 2], DType::Uint8, ByteOrder::Big, vec![2]).unwrap();
        assert_eq!(t.byte_order(), ByteOrder::NotApplicable);

        let wide = Tensor::from_bytes(vec![0; 4], DType::Int32, ByteOrder::NotApplicable, vec![1]);
        assert!(wide.is_err());
    }

    #[test]
    fn to_native_order_swaps_foreign_elements() {
        let foreign = match ByteOrder::native() {
            ByteOrder::Little => ByteOrder::Big,
            _ => ByteOrder::Little,
        };
        let t = Tensor::from_bytes(vec![0x01, 0x02, 0x03, 0x04], DType::Uint16, foreign, vec![2])
            .unwrap()
            .to_native_order();
        assert_eq!(t.byte_order(), ByteOrder::native());
        assert_eq!(t.as_bytes(), &[0x02, 0x01, 0x04, 0x03]);
    }

    #[test]
    fn byte_order_display_matches_serde_names() {
        for order in [ByteOrder::Little, ByteOrder::Big, ByteOrder::NotApplicable] {
            let json = serde_json::to_string(&order).unwrap();
            assert_eq!(json, format!("\"{order}\""));
            assert_eq!(order.to_string().parse::<ByteOrder>().unwrap(), order);
        }
    }

    #[test]
    fn from_native_uses_machine_order() {
        let t = Tensor::from_native(vec![0; 8], DType::Float32, vec![2]).unwrap();
        assert_eq!(t.byte_order(), ByteOrder::native());
        assert_eq!(t.element_count(), 2);
    }

    #[test]
    fn dtype_names_round_trip_through_serde() {
        for dtype in DType::ALL {
            let json = serde_json::to_string(&dtype).unwrap();
            assert_eq!(json, format!("\"{}\"", dtype.name()));
            assert_eq!(dtype.name().parse::<DType>().unwrap(), dtype);
        }
    }
}
