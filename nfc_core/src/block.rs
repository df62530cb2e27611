//! Block assembly and parsing.
//!
//! Each on-disk `version` byte selects an independent [`BlockFormat`]; the
//! registry below is the only place that knows which versions exist. A block
//! is laid out as
//!
//! ```text
//! [HEADER: header_len bytes]  magic, version, flags, segment lengths (big-endian)
//! [METADATA: meta_len bytes]  JSON record
//! [PAYLOAD: payload_len bytes] backend frame
//! [HASH: hash_len bytes]       SHA-256 of the original payload
//! ```
//!
//! Every segment offset is derived from the lengths the header declares and
//! checked against the buffer before slicing.

use crate::codec::{BackendCompressor, BackendParams, EntropyCoder};
use crate::config::CompressionConfig;
use crate::error::{FormatError, Result, Segment};
use crate::format::{check_magic, BlockHeader, FORMAT_VERSION, HEADER_LEN};
use crate::integrity::{self, DIGEST_LEN};
use crate::metadata::Metadata;
use crate::pipeline::TransformPipeline;
use crate::tensor::{ByteOrder, Tensor};

/// What a block carries.
#[derive(Debug, Clone, Copy)]
pub enum BlockInput<'a> {
    Bytes(&'a [u8]),
    Tensor(&'a Tensor),
}

/// Recovered content of a block.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Bytes(Vec<u8>),
    /// Element bytes in the declared byte order; see [`Tensor::to_native_order`].
    Tensor(Tensor),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Bytes(bytes) => bytes,
            Payload::Tensor(tensor) => tensor.as_bytes(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Payload::Bytes(bytes) => bytes,
            Payload::Tensor(tensor) => tensor.into_bytes(),
        }
    }

    pub fn into_tensor(self) -> Option<Tensor> {
        match self {
            Payload::Tensor(tensor) => Some(tensor),
            Payload::Bytes(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecodedBlock {
    pub header: BlockHeader,
    pub metadata: Metadata,
    pub payload: Payload,
}

/// The collaborators a block format drives.
#[derive(Clone, Copy)]
pub struct Engines<'a> {
    pub backend: &'a dyn BackendCompressor,
    pub entropy: Option<&'a dyn EntropyCoder>,
}

/// One on-disk block layout.
pub trait BlockFormat: Send + Sync {
    /// The version byte this format owns.
    fn version(&self) -> u8;

    fn assemble(
        &self,
        input: BlockInput<'_>,
        engines: Engines<'_>,
        config: &CompressionConfig,
    ) -> Result<Vec<u8>>;

    /// Parses exactly one block; `block` must end where the block ends.
    fn parse(&self, block: &[u8], engines: Engines<'_>) -> Result<DecodedBlock>;

    /// Reads the header and metadata without touching the payload.
    fn inspect(&self, block: &[u8]) -> Result<(BlockHeader, Metadata)>;
}

// ── Registry ───────────────────────────────────────────────────────────────

static FORMATS: &[&dyn BlockFormat] = &[&V2Format];

/// Versions this build can read.
pub fn supported_versions() -> Vec<u8> {
    FORMATS.iter().map(|f| f.version()).collect()
}

pub fn format_for_version(version: u8) -> Result<&'static dyn BlockFormat> {
    FORMATS
        .iter()
        .copied()
        .find(|f| f.version() == version)
        .ok_or_else(|| FormatError::VersionMismatch {
            found: version,
            supported: supported_versions(),
        })
}

/// The format new blocks are written in.
pub fn current_format() -> &'static dyn BlockFormat {
    &V2Format
}

/// Checks the magic and returns the version byte of `block`.
pub fn peek_version(block: &[u8]) -> Result<u8> {
    check_magic(block)?;
    Ok(block[4])
}

// ── Version 2 ──────────────────────────────────────────────────────────────

/// `NFC2` version 2: 34-byte header, JSON metadata, SHA-256 trailer.
pub struct V2Format;

/// Borrowed views of the three segments after the header.
struct Segments<'a> {
    metadata: &'a [u8],
    payload: &'a [u8],
    hash: &'a [u8],
}

impl<'a> Segments<'a> {
    /// Slices metadata, payload and hash in order, validating every declared
    /// length against the buffer before it is used.
    fn locate(header: &BlockHeader, block: &'a [u8]) -> Result<Self> {
        let total = block.len() as u64;
        let mut offset = 0u64;
        let mut take = |segment: Segment, declared: u64| -> Result<(usize, usize)> {
            let start = offset;
            let end = start
                .checked_add(declared)
                .filter(|&end| end <= total)
                .ok_or(FormatError::TruncatedBlock {
                    segment,
                    offset: start,
                    declared,
                    available: total.saturating_sub(start),
                })?;
            offset = end;
            Ok((start as usize, end as usize))
        };

        take(Segment::Header, header.header_len)?;
        let (m0, m1) = take(Segment::Metadata, header.meta_len)?;
        let (p0, p1) = take(Segment::Payload, header.payload_len)?;
        let (h0, h1) = take(Segment::Hash, header.hash_len as u64)?;

        if h1 != block.len() {
            return Err(FormatError::MalformedHeader(format!(
                "{} bytes follow the declared end of the block",
                block.len() - h1
            )));
        }

        Ok(Self {
            metadata: &block[m0..m1],
            payload: &block[p0..p1],
            hash: &block[h0..h1],
        })
    }
}

impl BlockFormat for V2Format {
    fn version(&self) -> u8 {
        FORMAT_VERSION
    }

    fn assemble(
        &self,
        input: BlockInput<'_>,
        engines: Engines<'_>,
        config: &CompressionConfig,
    ) -> Result<Vec<u8>> {
        let (original, tensor) = match input {
            BlockInput::Bytes(bytes) => (bytes, None),
            BlockInput::Tensor(tensor) => (tensor.as_bytes(), Some(tensor)),
        };
        let digest = integrity::digest(original);

        let transformed = TransformPipeline::new(engines.entropy).apply(original, tensor, config)?;
        let params = BackendParams {
            codec: config.codec,
            level: config.level,
            typesize: transformed.typesize,
            filters: config.filters.clone(),
        };
        let compressed = engines.backend.compress(&transformed.payload, &params)?;

        let mut metadata = match tensor {
            Some(tensor) => Metadata::for_tensor(tensor, &config.created_by),
            None => Metadata::for_bytes(original.len(), &config.created_by),
        };
        metadata.compression_stack = transformed.stages;
        metadata.compression_stack.push(config.codec.name().to_string());
        metadata.codec = Some(config.codec);
        metadata.level = Some(config.level);
        metadata.filters = config.filters.clone();
        metadata.entropy_coder = transformed.entropy_coder.map(str::to_string);
        if let Some(record) = transformed.prediction {
            metadata.prediction_model = Some(record.model);
            metadata.original_dtype = Some(record.original_dtype);
            metadata.original_shape = Some(record.original_shape);
            metadata.residuals_dtype = Some(record.residuals_dtype);
        }
        let meta_bytes = metadata.encode()?;

        let header = BlockHeader::new(
            transformed.flags,
            meta_bytes.len() as u64,
            compressed.len() as u64,
            DIGEST_LEN as u16,
        );

        let mut block =
            Vec::with_capacity(HEADER_LEN + meta_bytes.len() + compressed.len() + DIGEST_LEN);
        block.extend_from_slice(&header.to_bytes());
        block.extend_from_slice(&meta_bytes);
        block.extend_from_slice(&compressed);
        block.extend_from_slice(&digest);

        log::debug!(
            "assembled block: {} raw -> {} bytes (meta {}, payload {}), stack {:?}",
            original.len(),
            block.len(),
            meta_bytes.len(),
            compressed.len(),
            metadata.compression_stack
        );
        Ok(block)
    }

    fn parse(&self, block: &[u8], engines: Engines<'_>) -> Result<DecodedBlock> {
        let header = BlockHeader::from_bytes(block)?;
        let segments = Segments::locate(&header, block)?;
        let metadata = Metadata::decode(segments.metadata)?;

        let decompressed = engines.backend.decompress(segments.payload)?;
        let recovered =
            TransformPipeline::new(engines.entropy).reverse(decompressed, header.flags, &metadata)?;
        integrity::verify(&recovered, segments.hash)?;

        log::debug!(
            "parsed block: {} bytes -> {} raw, stack {:?}",
            block.len(),
            recovered.len(),
            metadata.compression_stack
        );

        let payload = if metadata.is_tensor() {
            Payload::Tensor(tensor_from_record(recovered, &metadata)?)
        } else {
            Payload::Bytes(recovered)
        };
        Ok(DecodedBlock {
            header,
            metadata,
            payload,
        })
    }

    fn inspect(&self, block: &[u8]) -> Result<(BlockHeader, Metadata)> {
        let header = BlockHeader::from_bytes(block)?;
        let segments = Segments::locate(&header, block)?;
        let metadata = Metadata::decode(segments.metadata)?;
        Ok((header, metadata))
    }
}

/// Rebuilds the tensor a `numpy_tensor` record describes around `bytes`.
fn tensor_from_record(bytes: Vec<u8>, metadata: &Metadata) -> Result<Tensor> {
    let malformed = |reason: String| FormatError::MalformedMetadata(reason);
    let dtype = metadata
        .dtype
        .ok_or_else(|| malformed("tensor record without dtype".to_string()))?;
    let shape = metadata
        .shape
        .clone()
        .ok_or_else(|| malformed("tensor record without shape".to_string()))?;
    let order = metadata.endianness.unwrap_or(ByteOrder::NotApplicable);
    Tensor::from_bytes(bytes, dtype, order, shape).map_err(|e| malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecKind;
    use crate::format::FLAG_ENTROPY_CODED;
    use crate::predict::PredictionModel;
    use crate::tensor::DType;

    /// Stores payloads verbatim behind a one-byte tag so tests can tell a
    /// decode failure from an integrity failure.
    struct StoreBackend;

    impl BackendCompressor for StoreBackend {
        fn compress(&self, payload: &[u8], _params: &BackendParams) -> Result<Vec<u8>> {
            let mut out = vec![0xB0];
            out.extend_from_slice(payload);
            Ok(out)
        }

        fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>> {
            match compressed.split_first() {
                Some((0xB0, rest)) => Ok(rest.to_vec()),
                _ => Err(FormatError::BackendDecode("missing store tag".to_string())),
            }
        }
    }

    fn engines() -> Engines<'static> {
        Engines {
            backend: &StoreBackend,
            entropy: None,
        }
    }

    fn assemble_bytes(data: &[u8]) -> Vec<u8> {
        V2Format
            .assemble(BlockInput::Bytes(data), engines(), &CompressionConfig::default())
            .unwrap()
    }

    #[test]
    fn block_length_is_sum_of_declared_segments() {
        let block = assemble_bytes(b"hello world");
        let header = BlockHeader::from_bytes(&block).unwrap();
        assert_eq!(header.header_len, 34);
        assert_eq!(header.hash_len, 32);
        assert_eq!(header.block_len(), Some(block.len() as u64));
        assert_eq!(header.flags & FLAG_ENTROPY_CODED, 0);
    }

    #[test]
    fn bytes_round_trip_with_bytes_hint() {
        let block = assemble_bytes(b"hello world");
        let decoded = V2Format.parse(&block, engines()).unwrap();
        assert_eq!(decoded.payload, Payload::Bytes(b"hello world".to_vec()));
        assert_eq!(decoded.metadata.compression_stack, vec!["zstd".to_string()]);
        assert_eq!(decoded.metadata.codec, Some(CodecKind::Zstd));
    }

    #[test]
    fn every_truncation_point_is_reported_as_truncated_block() {
        let block = assemble_bytes(b"some payload that spans every segment");
        for cut in 0..block.len() {
            let err = V2Format.parse(&block[..cut], engines()).unwrap_err();
            assert!(
                matches!(err, FormatError::TruncatedBlock { .. }),
                "cut at {cut}: {err:?}"
            );
        }
    }

    #[test]
    fn truncation_names_the_overflowing_segment() {
        let block = assemble_bytes(b"abc");
        let header = BlockHeader::from_bytes(&block).unwrap();
        let meta_end = (header.header_len + header.meta_len) as usize;
        match V2Format.parse(&block[..meta_end - 1], engines()) {
            Err(FormatError::TruncatedBlock { segment, offset, declared, available }) => {
                assert_eq!(segment, Segment::Metadata);
                assert_eq!(offset, 34);
                assert_eq!(declared, header.meta_len);
                assert_eq!(available, header.meta_len - 1);
            }
            other => panic!("expected metadata truncation, got {other:?}"),
        }
        match V2Format.parse(&block[..block.len() - 1], engines()) {
            Err(FormatError::TruncatedBlock { segment, .. }) => assert_eq!(segment, Segment::Hash),
            other => panic!("expected hash truncation, got {other:?}"),
        }
    }

    #[test]
    fn declared_lengths_are_trusted_over_the_constant() {
        // A future writer may extend the header; readers must skip what they
        // do not understand using the declared header_len.
        let block = assemble_bytes(b"extended");
        let mut header = BlockHeader::from_bytes(&block).unwrap();
        header.header_len += 6;
        let mut extended = header.to_bytes().to_vec();
        extended.extend_from_slice(&[0xEE; 6]);
        extended.extend_from_slice(&block[HEADER_LEN..]);
        let decoded = V2Format.parse(&extended, engines()).unwrap();
        assert_eq!(decoded.payload.as_bytes(), b"extended");
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut block = assemble_bytes(b"abc");
        block.push(0);
        assert!(matches!(
            V2Format.parse(&block, engines()),
            Err(FormatError::MalformedHeader(_))
        ));
    }

    #[test]
    fn flipped_payload_byte_is_an_integrity_failure() {
        let block = assemble_bytes(b"hello world");
        let header = BlockHeader::from_bytes(&block).unwrap();
        let payload_start = (header.header_len + header.meta_len) as usize + 1;
        let mut corrupted = block.clone();
        corrupted[payload_start + 3] ^= 0x01;
        let err = V2Format.parse(&corrupted, engines()).unwrap_err();
        assert!(err.is_integrity_failure(), "{err:?}");
    }

    #[test]
    fn corrupted_metadata_is_malformed() {
        let mut block = assemble_bytes(b"hello world");
        block[HEADER_LEN] = b'#';
        assert!(matches!(
            V2Format.parse(&block, engines()),
            Err(FormatError::MalformedMetadata(_))
        ));
    }

    #[test]
    fn registry_dispatches_on_version_byte() {
        assert_eq!(supported_versions(), vec![2]);
        assert_eq!(format_for_version(2).unwrap().version(), 2);
        assert!(matches!(
            format_for_version(1),
            Err(FormatError::VersionMismatch { found: 1, .. })
        ));
        assert_eq!(peek_version(&assemble_bytes(b"x")).unwrap(), 2);
    }

    #[test]
    fn predicted_tensor_records_residual_metadata() {
        let bytes: Vec<u8> = [1i32, 2, 3].iter().flat_map(|v| v.to_le_bytes()).collect();
        let tensor = Tensor::from_bytes(bytes, DType::Int32, ByteOrder::Little, vec![3]).unwrap();
        let config = CompressionConfig::default().with_prediction(PredictionModel::Delta);
        let block = V2Format
            .assemble(BlockInput::Tensor(&tensor), engines(), &config)
            .unwrap();

        let (_, metadata) = V2Format.inspect(&block).unwrap();
        assert_eq!(metadata.prediction_model, Some(PredictionModel::Delta));
        assert_eq!(metadata.original_dtype, Some(DType::Int32));
        assert_eq!(metadata.original_shape, Some(vec![3]));
        assert_eq!(metadata.residuals_dtype, Some(DType::Int64));
        assert_eq!(metadata.compression_stack, vec!["delta".to_string(), "zstd".to_string()]);

        let decoded = V2Format.parse(&block, engines()).unwrap();
        assert_eq!(decoded.payload, Payload::Tensor(tensor));
    }

    #[test]
    fn entropy_request_without_coder_is_a_configuration_error() {
        let config = CompressionConfig::default().with_entropy_coding(true);
        let err = V2Format
            .assemble(BlockInput::Bytes(b"abc"), engines(), &config)
            .unwrap_err();
        assert!(matches!(err, FormatError::MissingOptionalCodec(_)));
    }
}
