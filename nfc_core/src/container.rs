//! Single-shot compression of one payload into one self-contained block.

use std::sync::Arc;

use crate::block::{self, BlockInput, DecodedBlock, Engines};
use crate::codec::{BackendCompressor, EntropyCoder};
use crate::config::CompressionConfig;
use crate::error::Result;
use crate::format::BlockHeader;
use crate::metadata::Metadata;
use crate::tensor::Tensor;

/// A configured block codec.
///
/// Holds the backend, the optional entropy coder and an immutable
/// [`CompressionConfig`]. Cloning is cheap; clones share the backend and
/// coder, so a `Container` can be handed to worker threads.
#[derive(Clone)]
pub struct Container {
    backend: Arc<dyn BackendCompressor>,
    entropy: Option<Arc<dyn EntropyCoder>>,
    config: CompressionConfig,
}

impl Container {
    pub fn new(backend: Arc<dyn BackendCompressor>, config: CompressionConfig) -> Self {
        Self {
            backend,
            entropy: None,
            config,
        }
    }

    /// Installs (or removes) the entropy coder. A block that records entropy
    /// coding can only be decoded by a container that has one.
    pub fn with_entropy_coder(mut self, coder: Option<Arc<dyn EntropyCoder>>) -> Self {
        self.entropy = coder;
        self
    }

    /// Same engines, different settings.
    pub fn with_config(&self, config: CompressionConfig) -> Self {
        Self {
            config,
            ..self.clone()
        }
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    pub fn has_entropy_coder(&self) -> bool {
        self.entropy.is_some()
    }

    fn engines(&self) -> Engines<'_> {
        Engines {
            backend: self.backend.as_ref(),
            entropy: self.entropy.as_deref(),
        }
    }

    pub fn compress_bytes(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.compress(BlockInput::Bytes(data))
    }

    pub fn compress_tensor(&self, tensor: &Tensor) -> Result<Vec<u8>> {
        self.compress(BlockInput::Tensor(tensor))
    }

    /// Assembles one block in the current format version.
    pub fn compress(&self, input: BlockInput<'_>) -> Result<Vec<u8>> {
        block::current_format().assemble(input, self.engines(), &self.config)
    }

    /// Decodes exactly one block. Bytes past the declared end of the block
    /// are an error; use the stream reader for concatenated blocks.
    pub fn decompress(&self, block: &[u8]) -> Result<DecodedBlock> {
        let format = block::format_for_version(block::peek_version(block)?)?;
        format.parse(block, self.engines())
    }

    /// Header and metadata of one block, without decoding the payload.
    pub fn inspect(&self, block: &[u8]) -> Result<(BlockHeader, Metadata)> {
        let format = block::format_for_version(block::peek_version(block)?)?;
        format.inspect(block)
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("config", &self.config)
            .field("entropy", &self.entropy.as_ref().map(|c| c.name()))
            .finish()
    }
}
