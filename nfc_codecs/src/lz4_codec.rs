use lz4_flex::block::{compress, decompress};
use nfc_core::{Codec, CodecKind, FormatError, Result};

/// LZ4 cannot expand data by more than this factor; a recorded length past
/// it means the frame is corrupt.
const MAX_EXPANSION: usize = 255;

/// LZ4 block codec.
///
/// Fastest decompression of all bundled codecs. The level is ignored.
///
/// Best for: hot data where decode speed matters more than size reduction.
pub struct Lz4Codec;

/// LZ4 high-compression variant.
///
/// Writes the same LZ4 block format as [`Lz4Codec`] under its own codec id,
/// so blocks record what was asked for. The bundled encoder has no
/// high-compression matcher and uses the fast one.
pub struct Lz4HcCodec;

fn lz4_decompress(compressed: &[u8], raw_len: usize) -> Result<Vec<u8>> {
    let limit = compressed.len().saturating_mul(MAX_EXPANSION).saturating_add(16);
    if raw_len > limit {
        return Err(FormatError::BackendDecode(format!(
            "lz4 frame claims {raw_len} bytes from {} compressed",
            compressed.len()
        )));
    }
    decompress(compressed, raw_len)
        .map_err(|e| FormatError::BackendDecode(format!("lz4 decompress error: {e}")))
}

impl Codec for Lz4Codec {
    fn kind(&self) -> CodecKind {
        CodecKind::Lz4
    }

    fn compress_block(&self, raw: &[u8], _level: i32) -> Result<Vec<u8>> {
        Ok(compress(raw))
    }

    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> Result<Vec<u8>> {
        lz4_decompress(compressed, raw_len)
    }
}

impl Codec for Lz4HcCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Lz4hc
    }

    fn compress_block(&self, raw: &[u8], _level: i32) -> Result<Vec<u8>> {
        Ok(compress(raw))
    }

    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> Result<Vec<u8>> {
        lz4_decompress(compressed, raw_len)
    }
}
