use std::fs::File;
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use rayon::prelude::*;

use crate::config::StreamConfig;
use crate::container::Container;
use crate::error::Result;

/// Totals reported when a stream is sealed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub blocks: u64,
    pub raw_bytes: u64,
    pub stream_bytes: u64,
}

impl StreamSummary {
    /// Raw / stored size; 1.0 for an empty stream.
    pub fn ratio(&self) -> f64 {
        if self.stream_bytes == 0 {
            return 1.0;
        }
        self.raw_bytes as f64 / self.stream_bytes as f64
    }
}

/// Chunking writer producing a stream of concatenated NFC2 blocks.
///
/// # Write contract
/// Call [`write`] any number of times with arbitrary-sized byte slices.
/// The writer accumulates data and emits one complete, independent block
/// whenever `chunk_size` raw bytes have been gathered. Call [`finish`] to
/// emit the trailing partial chunk.
///
/// # Stream layout
/// ```text
/// [BLOCK 0] [BLOCK 1] ... [BLOCK N-1]
/// ```
/// There is no stream header, index or footer: each block is found by
/// reading the previous block's declared lengths. An empty input produces an
/// empty stream.
///
/// With `workers > 1`, up to `workers` full chunks are compressed in
/// parallel and written in input order.
///
/// [`write`]: StreamWriter::write
/// [`finish`]: StreamWriter::finish
pub struct StreamWriter<W: Write> {
    sink: W,
    container: Container,
    config: StreamConfig,
    /// Raw bytes not yet cut into a chunk.
    pending: Vec<u8>,
    /// Full chunks waiting for a parallel batch.
    batch: Vec<Vec<u8>>,
    summary: StreamSummary,
}

impl StreamWriter<BufWriter<File>> {
    /// Create a stream file at `path`, overwriting any existing file.
    pub fn create(path: impl AsRef<Path>, container: &Container, config: StreamConfig) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), container, config)
    }
}

impl<W: Write> StreamWriter<W> {
    /// Blocks are assembled with a stream-safe copy of the container's
    /// settings: prediction and entropy coding are dropped, since chunk
    /// boundaries ignore element boundaries.
    pub fn new(sink: W, container: &Container, config: StreamConfig) -> Result<Self> {
        config.validate()?;
        if !container.config().is_stream_safe() {
            log::warn!("prediction and entropy coding are not applied to streamed blocks");
        }
        let container = container.with_config(container.config().for_streaming());
        Ok(Self {
            sink,
            container,
            config,
            pending: Vec::new(),
            batch: Vec::with_capacity(config.workers),
            summary: StreamSummary::default(),
        })
    }

    /// Buffer `data` and emit complete chunks as they fill up.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(data);
        let chunk_size = self.config.chunk_size;
        while self.pending.len() >= chunk_size {
            let chunk: Vec<u8> = self.pending.drain(..chunk_size).collect();
            self.batch.push(chunk);
            if self.batch.len() >= self.config.workers {
                self.flush_batch()?;
            }
        }
        Ok(())
    }

    /// Compress every queued chunk and write the blocks in order.
    fn flush_batch(&mut self) -> Result<()> {
        let chunks = std::mem::take(&mut self.batch);
        let container = &self.container;
        let blocks: Vec<Vec<u8>> = if chunks.len() > 1 {
            chunks
                .par_iter()
                .map(|chunk| container.compress_bytes(chunk))
                .collect::<Result<_>>()?
        } else {
            chunks
                .iter()
                .map(|chunk| container.compress_bytes(chunk))
                .collect::<Result<_>>()?
        };

        for (chunk, block) in chunks.iter().zip(&blocks) {
            self.sink.write_all(block)?;
            self.summary.blocks += 1;
            self.summary.raw_bytes += chunk.len() as u64;
            self.summary.stream_bytes += block.len() as u64;
            log::debug!(
                "stream block {}: {} -> {} bytes",
                self.summary.blocks - 1,
                chunk.len(),
                block.len()
            );
        }
        Ok(())
    }

    /// Emit queued and partial chunks, flush the sink and return totals.
    pub fn finish(mut self) -> Result<StreamSummary> {
        if !self.pending.is_empty() {
            let tail = std::mem::take(&mut self.pending);
            self.batch.push(tail);
        }
        if !self.batch.is_empty() {
            self.flush_batch()?;
        }
        self.sink.flush()?;
        log::info!(
            "stream sealed: {} blocks, {} -> {} bytes",
            self.summary.blocks,
            self.summary.raw_bytes,
            self.summary.stream_bytes
        );
        Ok(self.summary)
    }
}

/// Chunk everything `source` yields into `sink`.
pub fn compress_stream<R: Read, W: Write>(
    mut source: R,
    sink: W,
    container: &Container,
    config: StreamConfig,
) -> Result<StreamSummary> {
    let mut writer = StreamWriter::new(sink, container, config)?;
    let mut buf = vec![0u8; config.chunk_size.min(1 << 20)];
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        writer.write(&buf[..n])?;
    }
    writer.finish()
}
