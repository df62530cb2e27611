//! The single error type for the NFC2 container.
//!
//! Every failure a block or stream operation can produce is a `FormatError`.
//! None of them are retried internally: corrupted or mismatched bytes do not
//! get better on a second read.

use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FormatError>;

/// Names the segment of a block whose declared length overflowed the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    Header,
    Metadata,
    Payload,
    Hash,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Segment::Header => "header",
            Segment::Metadata => "metadata",
            Segment::Payload => "payload",
            Segment::Hash => "hash",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum FormatError {
    // =========================================================================
    // === Structural errors (the bytes are not a well-formed block)
    // =========================================================================
    #[error("invalid magic: expected {expected:02x?}, found {found:02x?}")]
    BadMagic { expected: [u8; 4], found: Vec<u8> },

    #[error("unsupported format version {found} (supported: {supported:?})")]
    VersionMismatch { found: u8, supported: Vec<u8> },

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("malformed metadata: {0}")]
    MalformedMetadata(String),

    #[error(
        "truncated block: {segment} segment declares {declared} bytes at offset {offset}, \
         but the buffer holds only {available} bytes"
    )]
    TruncatedBlock {
        segment: Segment,
        offset: u64,
        declared: u64,
        available: u64,
    },

    #[error("truncated stream: block {block} needs {expected} more bytes, only {available} available")]
    TruncatedStream {
        block: u64,
        expected: u64,
        available: u64,
    },

    // =========================================================================
    // === Collaborator errors
    // =========================================================================
    #[error("backend decode failed: {0}")]
    BackendDecode(String),

    #[error("optional codec '{0}' is required but not available")]
    MissingOptionalCodec(String),

    #[error("transform stage '{stage}' failed: {reason}")]
    Transform { stage: &'static str, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // =========================================================================
    // === Content errors (well-formed, but not what was written)
    // =========================================================================
    #[error("integrity failure: expected digest {expected}, recovered bytes hash to {actual}")]
    IntegrityFailure { expected: String, actual: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FormatError {
    /// True when the block parsed cleanly but its recovered bytes do not match
    /// the stored digest.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, FormatError::IntegrityFailure { .. })
    }

    /// True for errors meaning "these bytes are not a well-formed block or stream".
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            FormatError::BadMagic { .. }
                | FormatError::VersionMismatch { .. }
                | FormatError::MalformedHeader(_)
                | FormatError::MalformedMetadata(_)
                | FormatError::TruncatedBlock { .. }
                | FormatError::TruncatedStream { .. }
        )
    }
}

impl From<serde_json::Error> for FormatError {
    fn from(err: serde_json::Error) -> Self {
        FormatError::MalformedMetadata(err.to_string())
    }
}
