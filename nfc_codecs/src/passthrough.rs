use nfc_core::{Codec, CodecKind, Result};

/// No-op codec: stores the filtered payload verbatim.
///
/// Useful for:
/// - Verifying the container round-trip independently of any compressor.
/// - Data that is already compressed, where a codec would only expand it.
pub struct PassThroughCodec;

impl Codec for PassThroughCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Passthrough
    }

    fn compress_block(&self, raw: &[u8], _level: i32) -> Result<Vec<u8>> {
        Ok(raw.to_vec())
    }

    fn decompress_block(&self, compressed: &[u8], _raw_len: usize) -> Result<Vec<u8>> {
        Ok(compressed.to_vec())
    }
}
