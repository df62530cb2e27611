//! The ordered pre-backend transform stack: prediction, then optional entropy
//! coding. [`TransformPipeline::reverse`] undoes the stages in strict reverse
//! order.

use std::borrow::Cow;

use crate::codec::EntropyCoder;
use crate::config::CompressionConfig;
use crate::error::{FormatError, Result};
use crate::format::FLAG_ENTROPY_CODED;
use crate::metadata::Metadata;
use crate::predict::{self, PredictionModel};
use crate::tensor::{ByteOrder, DType, Tensor};

/// What the prediction stage did, for the metadata record.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub model: PredictionModel,
    pub original_dtype: DType,
    pub original_shape: Vec<usize>,
    pub residuals_dtype: DType,
}

/// Output of [`TransformPipeline::apply`].
#[derive(Debug)]
pub struct Transformed<'a> {
    pub payload: Cow<'a, [u8]>,
    /// Header flag bits implied by the applied stages.
    pub flags: u8,
    /// Element width hint for the backend after the stages ran.
    pub typesize: usize,
    /// Names of the applied stages, in application order.
    pub stages: Vec<String>,
    pub prediction: Option<PredictionRecord>,
    pub entropy_coder: Option<&'static str>,
}

pub struct TransformPipeline<'a> {
    entropy: Option<&'a dyn EntropyCoder>,
}

impl<'a> TransformPipeline<'a> {
    pub fn new(entropy: Option<&'a dyn EntropyCoder>) -> Self {
        Self { entropy }
    }

    /// Runs the configured stages over `original`.
    ///
    /// `tensor` is the descriptor of `original` when the payload is a tensor;
    /// prediction only runs for tensors.
    pub fn apply<'p>(
        &self,
        original: &'p [u8],
        tensor: Option<&Tensor>,
        config: &CompressionConfig,
    ) -> Result<Transformed<'p>> {
        let mut out = Transformed {
            payload: Cow::Borrowed(original),
            flags: 0,
            typesize: tensor.map_or(1, |t| t.dtype().itemsize()),
            stages: Vec::new(),
            prediction: None,
            entropy_coder: None,
        };

        if config.prediction == PredictionModel::Delta {
            match tensor {
                None => log::debug!("prediction skipped: payload is opaque bytes"),
                Some(tensor) => match predict::predict_exact(tensor)? {
                    Some(residuals) => {
                        log::trace!(
                            "delta prediction: {} {} elements -> {} residuals",
                            tensor.element_count(),
                            tensor.dtype(),
                            residuals.dtype
                        );
                        out.typesize = residuals.dtype.itemsize();
                        out.stages.push(PredictionModel::Delta.name().to_string());
                        out.prediction = Some(PredictionRecord {
                            model: PredictionModel::Delta,
                            original_dtype: tensor.dtype(),
                            original_shape: tensor.shape().to_vec(),
                            residuals_dtype: residuals.dtype,
                        });
                        out.payload = Cow::Owned(residuals.bytes);
                    }
                    None => log::warn!(
                        "delta prediction is not exactly invertible for this {} tensor; storing it unpredicted",
                        tensor.dtype()
                    ),
                },
            }
        }

        if config.entropy_coding {
            let coder = self
                .entropy
                .ok_or_else(|| FormatError::MissingOptionalCodec("entropy coder".to_string()))?;
            let coded = coder.compress(&out.payload)?;
            log::trace!(
                "entropy coder '{}': {} -> {} bytes",
                coder.name(),
                out.payload.len(),
                coded.len()
            );
            out.payload = Cow::Owned(coded);
            out.flags |= FLAG_ENTROPY_CODED;
            out.typesize = 1;
            out.stages.push(coder.name().to_string());
            out.entropy_coder = Some(coder.name());
        }

        Ok(out)
    }

    /// Undoes the stages recorded in `flags` and `meta`, entropy decoding
    /// first and prediction last.
    pub fn reverse(&self, payload: Vec<u8>, flags: u8, meta: &Metadata) -> Result<Vec<u8>> {
        let payload = if flags & FLAG_ENTROPY_CODED != 0 {
            let wanted = meta.entropy_coder.as_deref();
            let coder = match self.entropy {
                Some(coder) if wanted.map_or(true, |name| name == coder.name()) => coder,
                _ => {
                    return Err(FormatError::MissingOptionalCodec(
                        wanted.unwrap_or("entropy coder").to_string(),
                    ))
                }
            };
            coder.decompress(&payload)?
        } else {
            payload
        };

        match meta.prediction() {
            PredictionModel::None => Ok(payload),
            PredictionModel::Delta => {
                let target = meta.original_dtype.or(meta.dtype).ok_or_else(|| {
                    FormatError::MalformedMetadata(
                        "delta prediction recorded without original_dtype".to_string(),
                    )
                })?;
                let residual = meta.residuals_dtype.ok_or_else(|| {
                    FormatError::MalformedMetadata(
                        "delta prediction recorded without residuals_dtype".to_string(),
                    )
                })?;
                let order = match (target.itemsize(), meta.endianness) {
                    (1, _) => ByteOrder::NotApplicable,
                    (_, Some(order)) if order != ByteOrder::NotApplicable => order,
                    _ => {
                        return Err(FormatError::MalformedMetadata(format!(
                            "{target} prediction recorded without a byte order"
                        )))
                    }
                };
                predict::restore(&payload, residual, target, order)
            }
        }
    }
}
