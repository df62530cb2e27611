mod filters;
mod frame;
mod lz4_codec;
mod passthrough;
#[cfg(feature = "entropy")]
mod rans;
mod zlib_codec;
mod zstd_codec;

pub use filters::{delta_decode, delta_encode, shuffle, unshuffle};
pub use frame::{FrameHeader, FRAME_VERSION};
pub use lz4_codec::{Lz4Codec, Lz4HcCodec};
pub use passthrough::PassThroughCodec;
#[cfg(feature = "entropy")]
pub use rans::RansCoder;
pub use zlib_codec::ZlibCodec;
pub use zstd_codec::ZstdCodec;

use std::sync::Arc;

use nfc_core::{
    BackendCompressor, BackendParams, Codec, CodecKind, CompressionConfig, Container, EntropyCoder,
    FormatError, Result,
};

/// The bundled implementation of a codec kind.
pub fn codec_for(kind: CodecKind) -> &'static dyn Codec {
    match kind {
        CodecKind::Passthrough => &PassThroughCodec,
        CodecKind::Zstd => &ZstdCodec,
        CodecKind::Lz4 => &Lz4Codec,
        CodecKind::Lz4hc => &Lz4HcCodec,
        CodecKind::Zlib => &ZlibCodec,
    }
}

/// Resolve a codec from its on-disk `codec_id`.
pub fn codec_by_id(id: u8) -> Result<&'static dyn Codec> {
    CodecKind::from_id(id).map(codec_for).ok_or_else(|| {
        FormatError::BackendDecode(format!(
            "unknown codec id {id}; supported: 0 (passthrough), 1 (zstd), 2 (lz4), 3 (lz4hc), 4 (zlib)"
        ))
    })
}

/// Filters plus a codec, wrapped in a self-describing [`FrameHeader`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FramedBackend;

impl BackendCompressor for FramedBackend {
    fn compress(&self, payload: &[u8], params: &BackendParams) -> Result<Vec<u8>> {
        if params.filters.len() > u8::MAX as usize {
            return Err(FormatError::InvalidConfig(format!(
                "{} filters requested; a backend frame records at most {}",
                params.filters.len(),
                u8::MAX
            )));
        }
        let typesize = params.typesize.clamp(1, u8::MAX as usize);
        let filtered = filters::apply(&params.filters, payload, typesize);
        let codec = codec_for(params.codec);
        let body = codec.compress_block(&filtered, params.level)?;

        let header = FrameHeader {
            codec: params.codec,
            typesize: typesize as u8,
            filters: params.filters.clone(),
            raw_len: payload.len() as u64,
        };
        let mut frame = Vec::with_capacity(header.encoded_len() + body.len());
        header.write_to(&mut frame);
        frame.extend_from_slice(&body);

        log::trace!(
            "{} (level {}, typesize {}, filters {:?}): {} -> {} bytes",
            codec.name(),
            params.level,
            typesize,
            params.filters,
            payload.len(),
            frame.len()
        );
        Ok(frame)
    }

    fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>> {
        let (header, body) = FrameHeader::parse(compressed)?;
        let raw_len = usize::try_from(header.raw_len).map_err(|_| {
            FormatError::BackendDecode(format!("frame length {} exceeds memory", header.raw_len))
        })?;
        let filtered = codec_for(header.codec).decompress_block(body, raw_len)?;
        if filtered.len() != raw_len {
            return Err(FormatError::BackendDecode(format!(
                "{} produced {} bytes, frame records {}",
                header.codec,
                filtered.len(),
                raw_len
            )));
        }
        Ok(filters::reverse(&header.filters, filtered, header.typesize as usize))
    }
}

/// The backend every bundled container uses.
pub fn default_backend() -> Arc<dyn BackendCompressor> {
    Arc::new(FramedBackend)
}

/// The bundled entropy coder, when this build includes one.
pub fn entropy_coder() -> Option<Arc<dyn EntropyCoder>> {
    #[cfg(feature = "entropy")]
    {
        Some(Arc::new(RansCoder))
    }
    #[cfg(not(feature = "entropy"))]
    {
        None
    }
}

/// A container wired to the bundled backend and entropy coder.
pub fn container(config: CompressionConfig) -> Container {
    Container::new(default_backend(), config).with_entropy_coder(entropy_coder())
}
