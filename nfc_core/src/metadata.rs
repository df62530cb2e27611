//! Self-describing metadata record carried by every block.
//!
//! Serialized as compact JSON. Keys this version does not know are kept in
//! [`Metadata::extra`] and written back unchanged, so newer writers can add
//! fields without breaking this reader.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{CodecKind, Filter};
use crate::error::{FormatError, Result};
use crate::predict::PredictionModel;
use crate::tensor::{ByteOrder, DType, Tensor};

/// Schema tag written into every record.
pub const SCHEMA_VERSION: &str = "nfc-0.5";

/// Default provenance string.
pub const CREATED_BY: &str = concat!("nfc ", env!("CARGO_PKG_VERSION"));

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FormatHint {
    NumpyTensor,
    #[default]
    Bytes,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Metadata {
    #[serde(default)]
    pub schema_version: String,
    #[serde(default)]
    pub format_hint: FormatHint,

    // ── Tensor descriptor ──────────────────────────────────────────────────
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<DType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endianness: Option<ByteOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<usize>>,

    #[serde(default)]
    pub orig_bytes: u64,

    // ── Provenance ─────────────────────────────────────────────────────────
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub created_at: String,

    // ── Transform record ───────────────────────────────────────────────────
    /// Applied stages in application order.
    #[serde(default)]
    pub compression_stack: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<CodecKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i32>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entropy_coder: Option<String>,

    // ── Prediction record (present only when prediction ran) ───────────────
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_model: Option<PredictionModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_dtype: Option<DType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_shape: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub residuals_dtype: Option<DType>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Metadata {
    /// Record for an opaque byte payload.
    pub fn for_bytes(orig_bytes: usize, created_by: &str) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            format_hint: FormatHint::Bytes,
            orig_bytes: orig_bytes as u64,
            created_by: created_by.to_string(),
            created_at: now_iso8601(),
            ..Default::default()
        }
    }

    /// Record describing `tensor`.
    pub fn for_tensor(tensor: &Tensor, created_by: &str) -> Self {
        Self {
            format_hint: FormatHint::NumpyTensor,
            dtype: Some(tensor.dtype()),
            endianness: Some(tensor.byte_order()),
            shape: Some(tensor.shape().to_vec()),
            ..Self::for_bytes(tensor.nbytes(), created_by)
        }
    }

    /// Compact JSON encoding.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(FormatError::MalformedMetadata(
                "metadata segment is empty".to_string(),
            ));
        }
        let meta: Metadata = serde_json::from_slice(bytes)?;
        if meta.format_hint == FormatHint::NumpyTensor
            && (meta.dtype.is_none() || meta.shape.is_none())
        {
            return Err(FormatError::MalformedMetadata(
                "numpy_tensor record without dtype and shape".to_string(),
            ));
        }
        Ok(meta)
    }

    pub fn is_tensor(&self) -> bool {
        self.format_hint == FormatHint::NumpyTensor
    }

    pub fn prediction(&self) -> PredictionModel {
        self.prediction_model.unwrap_or_default()
    }

    /// True when the declared element byte order differs from this machine's,
    /// meaning a consumer must byte-swap before interpreting elements natively
    /// (see [`Tensor::to_native_order`]).
    pub fn needs_byte_swap(&self) -> bool {
        match self.endianness {
            Some(ByteOrder::NotApplicable) | None => false,
            Some(order) => order != ByteOrder::native(),
        }
    }
}

fn now_iso8601() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_record_round_trips() {
        let meta = Metadata::for_bytes(11, CREATED_BY);
        let decoded = Metadata::decode(&meta.encode().unwrap()).unwrap();
        assert_eq!(decoded, meta);
        assert_eq!(decoded.format_hint, FormatHint::Bytes);
        assert_eq!(decoded.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn tensor_record_carries_descriptor() {
        let t = Tensor::from_bytes(vec![0; 24], DType::Float32, ByteOrder::Big, vec![2, 3]).unwrap();
        let meta = Metadata::for_tensor(&t, "test");
        let json: serde_json::Value = serde_json::from_slice(&meta.encode().unwrap()).unwrap();
        assert_eq!(json["format_hint"], "numpy_tensor");
        assert_eq!(json["dtype"], "float32");
        assert_eq!(json["endianness"], "big");
        assert_eq!(json["shape"], serde_json::json!([2, 3]));
        assert_eq!(json["orig_bytes"], 24);
        assert!(json.get("prediction_model").is_none());
    }

    #[test]
    fn created_at_is_iso8601() {
        let meta = Metadata::for_bytes(0, CREATED_BY);
        assert!(chrono::DateTime::parse_from_rfc3339(&meta.created_at).is_ok());
    }

    #[test]
    fn unknown_keys_are_preserved() {
        let raw = br#"{"schema_version":"nfc-0.9","format_hint":"bytes","orig_bytes":3,"custom_tag":"test_value","future":{"x":1}}"#;
        let meta = Metadata::decode(raw).unwrap();
        assert_eq!(meta.extra["custom_tag"], "test_value");

        let again: serde_json::Value = serde_json::from_slice(&meta.encode().unwrap()).unwrap();
        assert_eq!(again["future"]["x"], 1);
    }

    #[test]
    fn garbage_and_empty_are_malformed() {
        assert!(matches!(
            Metadata::decode(b"{not json"),
            Err(FormatError::MalformedMetadata(_))
        ));
        assert!(matches!(Metadata::decode(b""), Err(FormatError::MalformedMetadata(_))));
        assert!(matches!(
            Metadata::decode(br#"{"format_hint":"numpy_tensor"}"#),
            Err(FormatError::MalformedMetadata(_))
        ));
    }

    #[test]
    fn byte_swap_is_signalled_for_foreign_order() {
        let mut meta = Metadata::for_bytes(0, CREATED_BY);
        assert!(!meta.needs_byte_swap());
        meta.endianness = Some(match ByteOrder::native() {
            ByteOrder::Little => ByteOrder::Big,
            _ => ByteOrder::Little,
        });
        assert!(meta.needs_byte_swap());
    }
}
