//! # chunk-encoder
//!
//! Encode decoded video frame chunks into per-video embeddings, discrete frame
//! tokens, or generated captions.
//!
//! A chunk holds the frames of one or more videos back to back. `chunk-encoder`
//! batches those frames through a model-like [`Mapper`], slices the
//! concatenated output back into per-video segments following an
//! [`IndexMapping`], merges each segment with the video's metadata, and hands
//! every result to a [`RecordWriter`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chunk_encoder::{
//!     DirectoryWriter, EncodeError, EncodeOptions, FrameChunk, HistogramMapper, IndexMapping,
//!     RecordMetadata, encode_chunk,
//! };
//! use image::RgbImage;
//! use serde_json::json;
//!
//! # async fn example(first: Vec<RgbImage>, second: Vec<RgbImage>) -> Result<(), EncodeError> {
//! let index = IndexMapping::from_frame_counts([
//!     ("first.mp4", first.len()),
//!     ("second.mp4", second.len()),
//! ]);
//! let chunk = FrameChunk::new(vec![first, second]);
//! let metadata = RecordMetadata::from_json(json!([
//!     {"json": {"caption": "a red balloon"}},
//!     {"json": {"caption": "the blue sea"}},
//! ]))?;
//!
//! let mut writer = DirectoryWriter::create("encoded").await?;
//! let encoded = encode_chunk(
//!     chunk,
//!     &index,
//!     &mut writer,
//!     Arc::new(HistogramMapper::new()),
//!     &metadata,
//!     &[],
//!     &EncodeOptions::new().with_use_dst_name(true),
//! )
//! .await?;
//!
//! for (payload, video_id, record) in encoded.records() {
//!     println!("{video_id}: {} frames, {}", payload.map_or(0, |p| p.rows()), record["json"]);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Strategies
//!
//! | Strategy | Selected by | Payload | Metadata enrichment |
//! |----------|-------------|---------|---------------------|
//! | Embedding | default | per-frame embeddings | `txt`, `json.clip_frame_similarity` |
//! | Frame tokenization | `with_frame_tokenization_strategy` | per-frame token ids | `txt` |
//! | Captioning | `with_captioning_strategy` (wins over tokenization) | none | `json.<generated_caption_key>` |
//!
//! ## Features
//!
//! - **Ordered batching**: frames are preprocessed on a bounded rayon pool
//!   ahead of inference, without reordering
//! - **Two metadata shapes**: columnar tables and per-video records behind one
//!   [`MetadataSource`] trait
//! - **Caption similarity**: cosine similarity between each frame and the
//!   video's reference caption when the mapper has a text tokenizer
//! - **Low-priority mode**: an unconditional cooperative yield before every
//!   batch
//! - **Progress & cancellation**: [`ProgressCallback`] and
//!   [`CancellationToken`], checked at every batch and every write
//! - **Writers**: in-memory [`MemoryWriter`] and atomic-per-record
//!   [`DirectoryWriter`]
//! - **Reference mapper**: [`HistogramMapper`], a deterministic colour-based
//!   mapper implementing every capability

pub mod batch;
pub mod chunk;
pub mod configuration;
pub mod encoder;
pub mod error;
pub mod histogram;
pub mod mapper;
pub mod metadata;
pub mod payload;
pub mod progress;
mod strategy;
mod utilities;
pub mod writer;

pub use batch::{BatchStream, PreparedBatch};
pub use chunk::{FrameChunk, IndexEntry, IndexMapping};
pub use configuration::{
    DEFAULT_BATCH_SIZE, DEFAULT_GENERATED_CAPTION_KEY, DEFAULT_WORKER_COUNT, Device, EncodeOptions,
    StrategyKind,
};
pub use encoder::{EncodeStats, EncodedChunk, encode_chunk, resolve_video_id};
pub use error::EncodeError;
pub use histogram::HistogramMapper;
pub use mapper::Mapper;
pub use metadata::{ColumnarMetadata, MetadataSource, RecordMetadata, VideoRecord};
pub use payload::Payload;
pub use progress::{CancellationToken, OperationType, ProgressCallback, ProgressInfo};
pub use writer::{DirectoryWriter, MemoryWriter, RecordWriter, WrittenRecord};
