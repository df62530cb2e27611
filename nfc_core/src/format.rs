use crate::error::{FormatError, Result, Segment};

/// Magic bytes opening every NFC2 block.
pub const MAGIC: &[u8; 4] = b"NFC2";

/// The block layout version this crate writes.
pub const FORMAT_VERSION: u8 = 2;

/// Fixed size of the version-2 block header in bytes.
///   magic[4] + version:u8 + flags:u8 + reserved[2]
///   + header_len:u64 + meta_len:u64 + payload_len:u64 + hash_len:u16
///   = 4 + 1 + 1 + 2 + 8 + 8 + 8 + 2 = 34
///
/// Readers size their first read with this constant but slice everything
/// after it using the `header_len` the block itself declares.
pub const HEADER_LEN: usize = 34;

/// Default chunk size for the stream framer: 64 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024 * 1024;

// ── Flags ──────────────────────────────────────────────────────────────────

/// The payload went through the entropy coder before the backend.
pub const FLAG_ENTROPY_CODED: u8 = 1 << 0;

// ── Backend codec ids ──────────────────────────────────────────────────────

pub const CODEC_PASSTHROUGH: u8 = 0;
pub const CODEC_ZSTD: u8 = 1;
pub const CODEC_LZ4: u8 = 2;
pub const CODEC_LZ4HC: u8 = 3;
pub const CODEC_ZLIB: u8 = 4;

// ── Backend filter ids ─────────────────────────────────────────────────────

pub const FILTER_SHUFFLE: u8 = 1;
pub const FILTER_DELTA: u8 = 2;

// ── Header ─────────────────────────────────────────────────────────────────

/// Decoded representation of the big-endian block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u8,
    pub flags: u8,
    /// Length of the header itself, as declared on disk.
    pub header_len: u64,
    pub meta_len: u64,
    /// Length of the compressed payload.
    pub payload_len: u64,
    pub hash_len: u16,
}

impl BlockHeader {
    /// Header for a version-2 block with the given segment lengths.
    pub fn new(flags: u8, meta_len: u64, payload_len: u64, hash_len: u16) -> Self {
        Self {
            version: FORMAT_VERSION,
            flags,
            header_len: HEADER_LEN as u64,
            meta_len,
            payload_len,
            hash_len,
        }
    }

    /// Serialize to exactly `HEADER_LEN` bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[..4].copy_from_slice(MAGIC);
        buf[4] = self.version;
        buf[5] = self.flags;
        // buf[6..8] reserved, stays zero
        buf[8..16].copy_from_slice(&self.header_len.to_be_bytes());
        buf[16..24].copy_from_slice(&self.meta_len.to_be_bytes());
        buf[24..32].copy_from_slice(&self.payload_len.to_be_bytes());
        buf[32..34].copy_from_slice(&self.hash_len.to_be_bytes());
        buf
    }

    /// Deserialize the fixed fields from the front of `buf`.
    ///
    /// Magic and version are checked before any length field is read.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        check_magic(buf)?;
        let version = buf[4];
        if version != FORMAT_VERSION {
            return Err(FormatError::VersionMismatch {
                found: version,
                supported: vec![FORMAT_VERSION],
            });
        }
        if buf.len() < HEADER_LEN {
            return Err(FormatError::TruncatedBlock {
                segment: Segment::Header,
                offset: 0,
                declared: HEADER_LEN as u64,
                available: buf.len() as u64,
            });
        }

        let header = Self {
            version,
            flags: buf[5],
            header_len: u64::from_be_bytes(field(buf, 8)),
            meta_len: u64::from_be_bytes(field(buf, 16)),
            payload_len: u64::from_be_bytes(field(buf, 24)),
            hash_len: u16::from_be_bytes(field(buf, 32)),
        };
        if header.header_len < HEADER_LEN as u64 {
            return Err(FormatError::MalformedHeader(format!(
                "declared header_len {} is shorter than the {} fixed header bytes",
                header.header_len, HEADER_LEN
            )));
        }
        Ok(header)
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }

    /// Bytes that follow the fixed header fields, as declared by this header.
    pub fn body_len(&self) -> Option<u64> {
        self.header_len
            .checked_sub(HEADER_LEN as u64)?
            .checked_add(self.meta_len)?
            .checked_add(self.payload_len)?
            .checked_add(self.hash_len as u64)
    }

    /// Declared length of the whole block.
    pub fn block_len(&self) -> Option<u64> {
        self.body_len()?.checked_add(HEADER_LEN as u64)
    }
}

/// Checks the 4-byte format tag.
pub fn check_magic(buf: &[u8]) -> Result<()> {
    if buf.len() < 5 {
        if MAGIC.starts_with(buf) {
            return Err(FormatError::TruncatedBlock {
                segment: Segment::Header,
                offset: 0,
                declared: HEADER_LEN as u64,
                available: buf.len() as u64,
            });
        }
        return Err(FormatError::BadMagic {
            expected: *MAGIC,
            found: buf.to_vec(),
        });
    }
    if &buf[..4] != MAGIC {
        return Err(FormatError::BadMagic {
            expected: *MAGIC,
            found: buf[..4].to_vec(),
        });
    }
    Ok(())
}

fn field<const N: usize>(buf: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[at..at + N]);
    out
}
