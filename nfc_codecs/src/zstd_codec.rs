use nfc_core::{Codec, CodecKind, FormatError, Result};

/// Zstandard codec.
///
/// Levels are clamped to 1..=22. Decoding streams into a fresh `Vec` rather
/// than trusting the frame's recorded length for pre-allocation.
///
/// Best for: general tensors and mixed structured data; the default backend.
pub struct ZstdCodec;

impl ZstdCodec {
    pub const MIN_LEVEL: i32 = 1;
    pub const MAX_LEVEL: i32 = 22;
}

impl Codec for ZstdCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Zstd
    }

    fn compress_block(&self, raw: &[u8], level: i32) -> Result<Vec<u8>> {
        let level = level.clamp(Self::MIN_LEVEL, Self::MAX_LEVEL);
        zstd::bulk::compress(raw, level).map_err(|e| FormatError::Transform {
            stage: "zstd",
            reason: e.to_string(),
        })
    }

    fn decompress_block(&self, compressed: &[u8], _raw_len: usize) -> Result<Vec<u8>> {
        zstd::decode_all(compressed)
            .map_err(|e| FormatError::BackendDecode(format!("zstd decompress error: {e}")))
    }
}
