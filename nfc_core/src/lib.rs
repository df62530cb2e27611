pub mod block;
pub mod codec;
pub mod config;
pub mod container;
pub mod error;
pub mod format;
pub mod integrity;
pub mod metadata;
pub mod pipeline;
pub mod predict;
pub mod reader;
pub mod tensor;
pub mod writer;

pub use block::{BlockFormat, BlockInput, DecodedBlock, Payload};
pub use codec::{BackendCompressor, BackendParams, Codec, CodecKind, EntropyCoder, Filter};
pub use config::{CompressionConfig, StreamConfig};
pub use container::Container;
pub use error::{FormatError, Result, Segment};
pub use format::{BlockHeader, FORMAT_VERSION, HEADER_LEN, MAGIC};
pub use metadata::{FormatHint, Metadata};
pub use predict::PredictionModel;
pub use reader::{decompress_parallel, scan_blocks, StreamReader};
pub use tensor::{ByteOrder, DType, Tensor};
pub use writer::{compress_stream, StreamSummary, StreamWriter};
