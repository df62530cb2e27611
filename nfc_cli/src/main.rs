use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use nfc_core::{
    compress_stream, decompress_parallel, ByteOrder, CodecKind, CompressionConfig, DType, Filter,
    Payload, PredictionModel, StreamConfig, StreamReader, Tensor,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "nfc",
    about = "NFC2 neural-format container: compress, decompress and inspect blocks and streams",
    version
)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a whole file into a single NFC2 block
    Compress {
        /// Source file ("-" reads stdin)
        input: PathBuf,
        /// Destination block file ("-" writes stdout)
        output: PathBuf,
        #[command(flatten)]
        settings: Settings,
        #[command(flatten)]
        tensor: TensorArgs,
    },
    /// Decode a single NFC2 block back to raw bytes
    Decompress {
        input: PathBuf,
        output: PathBuf,
    },
    /// Chunk a file into a stream of independent blocks
    StreamCompress {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        settings: Settings,
        /// Raw bytes per block (default: 64 MiB)
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Chunks compressed in parallel
        #[arg(short, long, default_value_t = 1)]
        workers: usize,
    },
    /// Decode a block stream back to raw bytes
    StreamDecompress {
        input: PathBuf,
        output: PathBuf,
        /// Decode blocks in parallel (loads the whole stream into memory)
        #[arg(short, long, default_value_t = 1)]
        workers: usize,
    },
    /// Print the header and metadata of every block in a file
    Inspect {
        file: PathBuf,
    },
}

/// Compression settings shared by the compress commands.
#[derive(Args)]
struct Settings {
    /// JSON file holding a compression config; flags override its fields
    #[arg(long)]
    config: Option<PathBuf>,
    /// Backend codec: passthrough | zstd | lz4 | lz4hc | zlib
    #[arg(short, long)]
    codec: Option<CodecKind>,
    /// Backend compression level
    #[arg(short, long)]
    level: Option<i32>,
    /// Comma-separated filters (shuffle,delta) or "none"
    #[arg(long)]
    filters: Option<String>,
    /// Prediction model: none | delta
    #[arg(long)]
    predict: Option<PredictionModel>,
    /// Run the entropy coder before the backend
    #[arg(long)]
    entropy: bool,
}

/// Describe the input as a tensor instead of opaque bytes.
#[derive(Args)]
struct TensorArgs {
    /// Element type, e.g. float32 or uint8
    #[arg(long)]
    dtype: Option<DType>,
    /// Comma-separated shape; defaults to one dimension
    #[arg(long, requires = "dtype")]
    shape: Option<String>,
    /// little | big | native (default: native)
    #[arg(long)]
    byte_order: Option<ByteOrder>,
}

// ── Helpers ────────────────────────────────────────────────────────────────

impl Settings {
    fn resolve(&self) -> anyhow::Result<CompressionConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read(path)
                    .with_context(|| format!("reading config file {:?}", path))?;
                serde_json::from_slice(&raw)
                    .with_context(|| format!("parsing config file {:?}", path))?
            }
            None => CompressionConfig::default(),
        };
        if let Some(codec) = self.codec {
            config = config.with_codec(codec);
        }
        if let Some(level) = self.level {
            config = config.with_level(level);
        }
        if let Some(filters) = &self.filters {
            config = config.with_filters(parse_filters(filters)?);
        }
        if let Some(predict) = self.predict {
            config = config.with_prediction(predict);
        }
        if self.entropy {
            config = config.with_entropy_coding(true);
        }
        log::debug!("compression config: {}", serde_json::to_string(&config)?);
        Ok(config)
    }
}

fn parse_filters(list: &str) -> anyhow::Result<Vec<Filter>> {
    if list.is_empty() || list == "none" {
        return Ok(Vec::new());
    }
    list.split(',')
        .map(|name| name.trim().parse::<Filter>().map_err(anyhow::Error::from))
        .collect()
}

fn parse_shape(shape: &str) -> anyhow::Result<Vec<usize>> {
    shape
        .split(',')
        .map(|dim| {
            dim.trim()
                .parse::<usize>()
                .with_context(|| format!("invalid shape dimension {:?}", dim))
        })
        .collect()
}

fn is_stdio(path: &Path) -> bool {
    path.to_str() == Some("-")
}

fn open_input(path: &Path) -> anyhow::Result<Box<dyn Read>> {
    if is_stdio(path) {
        return Ok(Box::new(io::stdin().lock()));
    }
    let file = File::open(path).with_context(|| format!("opening input file {:?}", path))?;
    Ok(Box::new(BufReader::new(file)))
}

fn open_output(path: &Path) -> anyhow::Result<Box<dyn Write>> {
    if is_stdio(path) {
        return Ok(Box::new(io::stdout().lock()));
    }
    let file = File::create(path).with_context(|| format!("creating output file {:?}", path))?;
    Ok(Box::new(BufWriter::new(file)))
}

fn read_all(path: &Path) -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    open_input(path)?
        .read_to_end(&mut buf)
        .with_context(|| format!("reading {:?}", path))?;
    Ok(buf)
}

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn ratio(raw: u64, stored: u64) -> f64 {
    if stored == 0 {
        return 1.0;
    }
    raw as f64 / stored as f64
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_compress(
    input: PathBuf,
    output: PathBuf,
    settings: Settings,
    tensor_args: TensorArgs,
) -> anyhow::Result<()> {
    let config = settings.resolve()?;
    let container = nfc_codecs::container(config);
    let data = read_all(&input)?;
    let raw_len = data.len() as u64;

    let t0 = Instant::now();
    let block = match tensor_args.dtype {
        Some(dtype) => {
            let shape = match &tensor_args.shape {
                Some(shape) => parse_shape(shape)?,
                None => vec![data.len() / dtype.itemsize()],
            };
            let tensor = match tensor_args.byte_order {
                Some(order) => Tensor::from_bytes(data, dtype, order, shape),
                None => Tensor::from_native(data, dtype, shape),
            }
            .context("input does not match the tensor description")?;
            log::debug!(
                "tensor {} {:?} ({})",
                tensor.dtype(),
                tensor.shape(),
                tensor.byte_order()
            );
            container.compress_tensor(&tensor)?
        }
        None => container.compress_bytes(&data)?,
    };
    let elapsed = t0.elapsed();

    let mut dst = open_output(&output)?;
    dst.write_all(&block)?;
    dst.flush()?;

    let config = container.config();
    eprintln!("  codec       : {} (level {})", config.codec, config.level);
    eprintln!("  prediction  : {}", config.prediction);
    eprintln!("  entropy     : {}", config.entropy_coding);
    eprintln!("  raw size    : {}", human_bytes(raw_len));
    eprintln!("  block       : {}", human_bytes(block.len() as u64));
    eprintln!("  ratio       : {:.2}x", ratio(raw_len, block.len() as u64));
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

/// One-line description of a decoded tensor payload.
fn describe_tensor(tensor: &Tensor) -> String {
    format!(
        "{} {:?} ({})",
        tensor.dtype(),
        tensor.shape(),
        tensor.byte_order()
    )
}

fn run_decompress(input: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let block = read_all(&input)?;
    let container = nfc_codecs::container(CompressionConfig::default());

    let t0 = Instant::now();
    let decoded = container
        .decompress(&block)
        .with_context(|| format!("decoding block {:?}", input))?;
    let elapsed = t0.elapsed();
    log::info!(
        "decoded {:?}: stack {:?}",
        input,
        decoded.metadata.compression_stack
    );

    if let Payload::Tensor(tensor) = &decoded.payload {
        eprintln!("  tensor      : {}", describe_tensor(tensor));
    }
    let raw = decoded.payload.into_bytes();
    let mut dst = open_output(&output)?;
    dst.write_all(&raw)?;
    dst.flush()?;

    eprintln!("  raw size    : {}", human_bytes(raw.len() as u64));
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_stream_compress(
    input: PathBuf,
    output: PathBuf,
    settings: Settings,
    chunk_size: Option<usize>,
    workers: usize,
) -> anyhow::Result<()> {
    let container = nfc_codecs::container(settings.resolve()?);
    let mut stream_config = StreamConfig::default().with_workers(workers);
    if let Some(chunk_size) = chunk_size {
        stream_config = stream_config.with_chunk_size(chunk_size);
    }

    let t0 = Instant::now();
    let summary = compress_stream(open_input(&input)?, open_output(&output)?, &container, stream_config)
        .with_context(|| format!("compressing {:?} into {:?}", input, output))?;
    let elapsed = t0.elapsed();

    eprintln!("  codec       : {}", container.config().codec);
    eprintln!("  chunk size  : {}", human_bytes(stream_config.chunk_size as u64));
    eprintln!("  blocks      : {}", summary.blocks);
    eprintln!("  raw size    : {}", human_bytes(summary.raw_bytes));
    eprintln!("  compressed  : {}", human_bytes(summary.stream_bytes));
    eprintln!("  ratio       : {:.2}x", summary.ratio());
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((summary.raw_bytes as f64 / elapsed.as_secs_f64()) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_stream_decompress(input: PathBuf, output: PathBuf, workers: usize) -> anyhow::Result<()> {
    let container = nfc_codecs::container(CompressionConfig::default());
    let t0 = Instant::now();

    let (blocks, raw_bytes) = if workers > 1 {
        let stream = read_all(&input)?;
        log::info!(
            "decoding {} in memory on {} workers",
            human_bytes(stream.len() as u64),
            workers
        );
        let pool = rayon_pool(workers)?;
        let raw = pool.install(|| decompress_parallel(&stream, &container))?;
        let mut dst = open_output(&output)?;
        dst.write_all(&raw)?;
        dst.flush()?;
        (nfc_core::scan_blocks(&stream)?.len() as u64, raw.len() as u64)
    } else {
        let mut reader = StreamReader::new(open_input(&input)?, container);
        let summary = reader
            .copy_to(open_output(&output)?)
            .with_context(|| format!("decoding stream {:?}", input))?;
        (summary.blocks, summary.raw_bytes)
    };

    let elapsed = t0.elapsed();
    eprintln!("  blocks      : {}", blocks);
    eprintln!("  raw size    : {}", human_bytes(raw_bytes));
    eprintln!(
        "  throughput  : {}/s",
        human_bytes((raw_bytes as f64 / elapsed.as_secs_f64()) as u64)
    );
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn rayon_pool(workers: usize) -> anyhow::Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .context("building worker pool")
}

fn run_inspect(file: PathBuf) -> anyhow::Result<()> {
    let container = nfc_codecs::container(CompressionConfig::default());
    let mut reader = StreamReader::new(open_input(&file)?, container);
    let file_size = std::fs::metadata(&file).map(|m| m.len()).ok();

    println!("=== NFC2: {:?} ===", file);
    if let Some(size) = file_size {
        println!("  file on disk   : {}", human_bytes(size));
    }

    let mut total_raw = 0u64;
    let mut total_stored = 0u64;
    while let Some((header, metadata)) = reader.next_header()? {
        let index = reader.blocks_read() - 1;
        let stored = header.block_len().unwrap_or(0);
        total_raw += metadata.orig_bytes;
        total_stored += stored;

        println!();
        println!("  block {}", index);
        println!("    version      : {}", header.version);
        println!("    flags        : 0x{:02x}", header.flags);
        println!(
            "    segments     : header {} / meta {} / payload {} / hash {}",
            header.header_len, header.meta_len, header.payload_len, header.hash_len
        );
        println!("    raw size     : {}", human_bytes(metadata.orig_bytes));
        println!("    ratio        : {:.2}x", ratio(metadata.orig_bytes, stored));
        println!("    metadata     : {}", serde_json::to_string_pretty(&metadata)?);
    }

    println!();
    println!("  blocks         : {}", reader.blocks_read());
    println!("  raw size       : {}", human_bytes(total_raw));
    println!("  stored         : {}", human_bytes(total_stored));
    println!("  ratio          : {:.2}x", ratio(total_raw, total_stored));
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Compress {
            input,
            output,
            settings,
            tensor,
        } => run_compress(input, output, settings, tensor),
        Commands::Decompress { input, output } => run_decompress(input, output),
        Commands::StreamCompress {
            input,
            output,
            settings,
            chunk_size,
            workers,
        } => run_stream_compress(input, output, settings, chunk_size, workers),
        Commands::StreamDecompress {
            input,
            output,
            workers,
        } => run_stream_decompress(input, output, workers),
        Commands::Inspect { file } => run_inspect(file),
    }
}
