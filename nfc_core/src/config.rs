//! Compression configuration.
//!
//! A `CompressionConfig` is an immutable value handed to a [`Container`]
//! at construction and applied unchanged to every block it assembles. The
//! `with_*` methods return modified copies; nothing mutates a shared default.
//!
//! [`Container`]: crate::container::Container

use serde::{Deserialize, Serialize};

use crate::codec::{CodecKind, Filter};
use crate::error::{FormatError, Result};
use crate::format::DEFAULT_CHUNK_SIZE;
use crate::metadata::CREATED_BY;
use crate::predict::PredictionModel;

/// Level used when none is given; matches a maximum-effort blosc `clevel`.
pub const DEFAULT_LEVEL: i32 = 9;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct CompressionConfig {
    /// Backend algorithm.
    pub codec: CodecKind,

    /// Backend effort; clamped per codec by the backend.
    pub level: i32,

    /// Byte-level filters the backend applies, in order.
    pub filters: Vec<Filter>,

    /// Prediction stage for tensor payloads. Ignored for opaque bytes.
    pub prediction: PredictionModel,

    /// Run the optional entropy coder. Requesting it without a coder installed
    /// is a configuration error, not a silent skip.
    pub entropy_coding: bool,

    /// Provenance written into every block.
    pub created_by: String,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CodecKind::default(),
            level: DEFAULT_LEVEL,
            filters: vec![Filter::Shuffle],
            prediction: PredictionModel::None,
            entropy_coding: false,
            created_by: CREATED_BY.to_string(),
        }
    }
}

impl CompressionConfig {
    pub fn with_codec(mut self, codec: CodecKind) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_prediction(mut self, prediction: PredictionModel) -> Self {
        self.prediction = prediction;
        self
    }

    pub fn with_entropy_coding(mut self, enabled: bool) -> Self {
        self.entropy_coding = enabled;
        self
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }

    /// Copy safe to apply independently per stream chunk: chunk boundaries are
    /// not tensor-aware and the entropy coder is stateful.
    pub fn for_streaming(&self) -> Self {
        Self {
            prediction: PredictionModel::None,
            entropy_coding: false,
            ..self.clone()
        }
    }

    pub fn is_stream_safe(&self) -> bool {
        self.prediction == PredictionModel::None && !self.entropy_coding
    }
}

/// Settings for the stream framer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct StreamConfig {
    /// Raw bytes per block (the last block may be smaller).
    pub chunk_size: usize,

    /// Chunks compressed concurrently; 1 keeps the writer sequential.
    pub workers: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: 1,
        }
    }
}

impl StreamConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(FormatError::InvalidConfig("chunk_size must be positive".to_string()));
        }
        if self.workers == 0 {
            return Err(FormatError::InvalidConfig("workers must be positive".to_string()));
        }
        Ok(())
    }
}
