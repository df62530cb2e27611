use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{FormatError, Result};
use crate::format::{
    CODEC_LZ4, CODEC_LZ4HC, CODEC_PASSTHROUGH, CODEC_ZLIB, CODEC_ZSTD, FILTER_DELTA,
    FILTER_SHUFFLE,
};

// ── Codec selection ────────────────────────────────────────────────────────

/// Named selection among the backend compression algorithms.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum CodecKind {
    Passthrough,
    #[default]
    Zstd,
    Lz4,
    Lz4hc,
    Zlib,
}

impl CodecKind {
    pub const ALL: [CodecKind; 5] = [
        CodecKind::Passthrough,
        CodecKind::Zstd,
        CodecKind::Lz4,
        CodecKind::Lz4hc,
        CodecKind::Zlib,
    ];

    /// Stable id stored in the backend frame.
    pub fn id(self) -> u8 {
        match self {
            CodecKind::Passthrough => CODEC_PASSTHROUGH,
            CodecKind::Zstd => CODEC_ZSTD,
            CodecKind::Lz4 => CODEC_LZ4,
            CodecKind::Lz4hc => CODEC_LZ4HC,
            CodecKind::Zlib => CODEC_ZLIB,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            CodecKind::Passthrough => "passthrough",
            CodecKind::Zstd => "zstd",
            CodecKind::Lz4 => "lz4",
            CodecKind::Lz4hc => "lz4hc",
            CodecKind::Zlib => "zlib",
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CodecKind {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "passthrough" | "pass" | "none" => Ok(CodecKind::Passthrough),
            "zstd" => Ok(CodecKind::Zstd),
            "lz4" => Ok(CodecKind::Lz4),
            "lz4hc" => Ok(CodecKind::Lz4hc),
            "zlib" => Ok(CodecKind::Zlib),
            other => Err(FormatError::InvalidConfig(format!(
                "unknown codec '{other}'; valid options: passthrough, zstd, lz4, lz4hc, zlib"
            ))),
        }
    }
}

/// Byte-level transform the backend applies internally before compressing.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    /// Groups byte `k` of every element together (byte planes).
    Shuffle,
    /// Replaces every byte with its difference to the byte one element earlier.
    Delta,
}

impl Filter {
    pub fn id(self) -> u8 {
        match self {
            Filter::Shuffle => FILTER_SHUFFLE,
            Filter::Delta => FILTER_DELTA,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            FILTER_SHUFFLE => Some(Filter::Shuffle),
            FILTER_DELTA => Some(Filter::Delta),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Filter::Shuffle => "shuffle",
            Filter::Delta => "delta",
        }
    }
}

impl FromStr for Filter {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "shuffle" => Ok(Filter::Shuffle),
            "delta" => Ok(Filter::Delta),
            other => Err(FormatError::InvalidConfig(format!(
                "unknown filter '{other}'; valid options: shuffle, delta"
            ))),
        }
    }
}

/// Parameters handed to the backend for one payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendParams {
    pub codec: CodecKind,
    pub level: i32,
    /// Element width hint in bytes; 1 for opaque byte payloads.
    pub typesize: usize,
    /// Applied in order on compress, reversed on decompress.
    pub filters: Vec<Filter>,
}

// ── Collaborator traits ────────────────────────────────────────────────────

/// One byte-oriented compression algorithm.
///
/// Each `Codec` implementation:
/// - Is identified by its `CodecKind`, whose id is stored in the backend frame.
/// - Compresses a whole payload independently; no state is carried between calls.
pub trait Codec: Send + Sync {
    fn kind(&self) -> CodecKind;

    /// Human-readable codec name for CLI display and metadata.
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    fn compress_block(&self, raw: &[u8], level: i32) -> Result<Vec<u8>>;

    /// `raw_len` is the length the frame recorded for the decompressed bytes.
    fn decompress_block(&self, compressed: &[u8], raw_len: usize) -> Result<Vec<u8>>;
}

/// The external compression engine as the block assembler sees it.
///
/// `decompress` must be self-describing: everything needed to undo
/// `compress` (codec, filters, element width) is recovered from the bytes.
pub trait BackendCompressor: Send + Sync {
    fn compress(&self, payload: &[u8], params: &BackendParams) -> Result<Vec<u8>>;

    /// Fails with `FormatError::BackendDecode` on a malformed stream.
    fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>>;
}

/// Optional secondary coder applied before the backend.
///
/// Coders may be stateful across a payload, which is why the stream framer
/// never uses one.
pub trait EntropyCoder: Send + Sync {
    /// Recorded in metadata; a decoder must present a coder with the same name.
    fn name(&self) -> &'static str;

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>>;

    fn decompress(&self, coded: &[u8]) -> Result<Vec<u8>>;
}
