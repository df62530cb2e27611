use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Write};
use std::ops::Range;
use std::path::Path;

use rayon::prelude::*;

use crate::block::DecodedBlock;
use crate::container::Container;
use crate::error::{FormatError, Result};
use crate::format::{BlockHeader, HEADER_LEN};
use crate::metadata::Metadata;
use crate::writer::StreamSummary;

/// Sequential reader for a stream of concatenated NFC2 blocks.
///
/// # Read sequence
/// 1. Read `HEADER_LEN` bytes. Zero bytes at this point is a clean end of
///    stream; anything between 1 and `HEADER_LEN - 1` is a truncated stream.
/// 2. Validate magic and version, then read the body the header declares.
/// 3. Decode the block in isolation.
///
/// A stream cut exactly on a block boundary is indistinguishable from a
/// shorter stream; every other cut surfaces as
/// [`FormatError::TruncatedStream`].
pub struct StreamReader<R: Read> {
    source: R,
    container: Container,
    blocks_read: u64,
    bytes_read: u64,
}

impl StreamReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>, container: Container) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), container))
    }
}

impl<R: Read> StreamReader<R> {
    pub fn new(source: R, container: Container) -> Self {
        Self {
            source,
            container,
            blocks_read: 0,
            bytes_read: 0,
        }
    }

    /// Blocks consumed so far.
    pub fn blocks_read(&self) -> u64 {
        self.blocks_read
    }

    /// Reads the next whole block without decoding it.
    pub fn next_raw_block(&mut self) -> Result<Option<Vec<u8>>> {
        let mut header_buf = [0u8; HEADER_LEN];
        let got = read_full(&mut self.source, &mut header_buf)?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_LEN {
            return Err(FormatError::TruncatedStream {
                block: self.blocks_read,
                expected: HEADER_LEN as u64,
                available: got as u64,
            });
        }

        let header = BlockHeader::from_bytes(&header_buf)?;
        let body_len = header.body_len().ok_or_else(|| {
            FormatError::MalformedHeader("declared segment lengths overflow".to_string())
        })?;

        let mut block = Vec::with_capacity(HEADER_LEN + body_len.min(1 << 26) as usize);
        block.extend_from_slice(&header_buf);
        let read = (&mut self.source).take(body_len).read_to_end(&mut block)? as u64;
        if read < body_len {
            return Err(FormatError::TruncatedStream {
                block: self.blocks_read,
                expected: body_len,
                available: read,
            });
        }

        self.blocks_read += 1;
        self.bytes_read += block.len() as u64;
        Ok(Some(block))
    }

    /// Decodes the next block; `Ok(None)` at a clean end of stream.
    pub fn next_block(&mut self) -> Result<Option<DecodedBlock>> {
        match self.next_raw_block()? {
            Some(block) => self.container.decompress(&block).map(Some),
            None => Ok(None),
        }
    }

    /// Header and metadata of the next block, skipping payload decoding.
    pub fn next_header(&mut self) -> Result<Option<(BlockHeader, Metadata)>> {
        match self.next_raw_block()? {
            Some(block) => self.container.inspect(&block).map(Some),
            None => Ok(None),
        }
    }

    /// Decode every remaining block into `sink`, in order.
    pub fn copy_to<W: Write>(&mut self, mut sink: W) -> Result<StreamSummary> {
        let mut summary = StreamSummary::default();
        let start = self.bytes_read;
        while let Some(block) = self.next_block()? {
            let raw = block.payload.as_bytes();
            sink.write_all(raw)?;
            summary.blocks += 1;
            summary.raw_bytes += raw.len() as u64;
        }
        sink.flush()?;
        summary.stream_bytes = self.bytes_read - start;
        Ok(summary)
    }
}

impl<R: Read> Iterator for StreamReader<R> {
    type Item = Result<DecodedBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_block().transpose()
    }
}

/// Fills `buf` as far as the source allows; returns the bytes read.
fn read_full<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Byte ranges of every block in an in-memory stream.
///
/// Walks the declared lengths only; no block is decoded.
pub fn scan_blocks(stream: &[u8]) -> Result<Vec<Range<usize>>> {
    let mut ranges = Vec::new();
    let mut offset = 0usize;
    while offset < stream.len() {
        let rest = &stream[offset..];
        let block = ranges.len() as u64;
        let header = BlockHeader::from_bytes(rest).map_err(|e| match e {
            FormatError::TruncatedBlock { .. } => FormatError::TruncatedStream {
                block,
                expected: HEADER_LEN as u64,
                available: rest.len() as u64,
            },
            other => other,
        })?;
        let body_len = header.body_len().ok_or_else(|| {
            FormatError::MalformedHeader("declared segment lengths overflow".to_string())
        })?;
        let available = (rest.len() - HEADER_LEN) as u64;
        if body_len > available {
            return Err(FormatError::TruncatedStream {
                block,
                expected: body_len,
                available,
            });
        }
        let end = offset + HEADER_LEN + body_len as usize;
        ranges.push(offset..end);
        offset = end;
    }
    Ok(ranges)
}

/// Decode an in-memory stream with blocks spread across the rayon pool.
/// Output order matches block order.
pub fn decompress_parallel(stream: &[u8], container: &Container) -> Result<Vec<u8>> {
    let ranges = scan_blocks(stream)?;
    let parts: Vec<Vec<u8>> = ranges
        .par_iter()
        .map(|range| {
            container
                .decompress(&stream[range.clone()])
                .map(|block| block.payload.into_bytes())
        })
        .collect::<Result<_>>()?;
    log::debug!("decoded {} blocks in parallel", parts.len());
    Ok(parts.concat())
}
