use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use nfc_core::{Codec, CodecKind, FormatError, Result};

/// zlib (DEFLATE with an Adler-32 trailer). Levels are clamped to 0..=9.
pub struct ZlibCodec;

impl Codec for ZlibCodec {
    fn kind(&self) -> CodecKind {
        CodecKind::Zlib
    }

    fn compress_block(&self, raw: &[u8], level: i32) -> Result<Vec<u8>> {
        let level = level.clamp(0, 9) as u32;
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::new(level));
        encoder.write_all(raw)?;
        Ok(encoder.finish()?)
    }

    fn decompress_block(&self, compressed: &[u8], _raw_len: usize) -> Result<Vec<u8>> {
        let mut raw = Vec::new();
        ZlibDecoder::new(compressed)
            .read_to_end(&mut raw)
            .map_err(|e| FormatError::BackendDecode(format!("zlib decompress error: {e}")))?;
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_level_round_trips() {
        let raw = b"deflate me ".repeat(64);
        for level in [-1, 0, 1, 6, 9, 12] {
            let compressed = ZlibCodec.compress_block(&raw, level).unwrap();
            assert_eq!(ZlibCodec.decompress_block(&compressed, raw.len()).unwrap(), raw);
        }
    }

    #[test]
    fn adler_mismatch_is_a_backend_error() {
        let mut compressed = ZlibCodec.compress_block(b"checksummed", 6).unwrap();
        let last = compressed.len() - 1;
        compressed[last] ^= 0xFF;
        assert!(matches!(
            ZlibCodec.decompress_block(&compressed, 11),
            Err(FormatError::BackendDecode(_))
        ));
    }
}
