//! Chunk encoding entry point.
//!
//! [`encode_chunk`] runs the three phases of one chunk in order:
//!
//! 1. batches are prepared from the concatenated frames
//!    (see [`batch`](crate::batch)),
//! 2. the selected strategy runs the mapper over every batch,
//! 3. the output stream is sliced back into videos following the
//!    [`IndexMapping`], each slice is merged with its metadata, and written.
//!
//! Writes are awaited one at a time in index order. If anything fails, the
//! call returns the error and no further videos are written; records already
//! written stay written.

use std::sync::Arc;

use tokio_stream::StreamExt;

use crate::batch::spawn_batches;
use crate::chunk::{FrameChunk, IndexEntry, IndexMapping};
use crate::configuration::{EncodeOptions, StrategyKind};
use crate::error::EncodeError;
use crate::mapper::Mapper;
use crate::metadata::{MetadataSource, VideoRecord};
use crate::payload::Payload;
use crate::progress::{OperationType, ProgressTracker};
use crate::strategy::ChunkStrategy;
use crate::utilities::strip_extension;
use crate::writer::RecordWriter;

/// Counters describing one [`encode_chunk`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeStats {
    /// The strategy that ran.
    pub strategy: StrategyKind,
    /// Frames in the chunk.
    pub frames: usize,
    /// Batches run through the mapper.
    pub batches: usize,
    /// Cooperative yields performed (low-priority mode only).
    pub yields: usize,
    /// Records handed to the writer.
    pub videos_written: usize,
    /// Whether reference captions were embedded for similarity scores.
    pub caption_embeddings: bool,
}

/// Everything written for one chunk, as three parallel sequences in index
/// order.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    /// Per-video payloads; `None` for caption-only records.
    pub payloads: Vec<Option<Payload>>,
    /// Per-video resolved ids.
    pub video_ids: Vec<String>,
    /// Per-video enriched metadata.
    pub metadata: Vec<VideoRecord>,
    /// Counters for the call.
    pub stats: EncodeStats,
}

impl EncodedChunk {
    /// Number of videos emitted.
    pub fn len(&self) -> usize {
        self.video_ids.len()
    }

    /// Returns `true` if no video was emitted.
    pub fn is_empty(&self) -> bool {
        self.video_ids.is_empty()
    }

    /// `(payload, video_id, metadata)` triples in emission order.
    pub fn records(&self) -> impl Iterator<Item = (Option<&Payload>, &str, &VideoRecord)> {
        self.payloads
            .iter()
            .zip(&self.video_ids)
            .zip(&self.metadata)
            .map(|((payload, video_id), metadata)| (payload.as_ref(), video_id.as_str(), metadata))
    }
}

/// Resolve the id a video is written under.
///
/// With `use_dst_name` the destination name minus its four-character
/// extension is used; otherwise the id list is indexed by the entry's
/// reference.
///
/// # Example
///
/// ```
/// use chunk_encoder::{IndexMapping, resolve_video_id};
///
/// let mapping = IndexMapping::from_frame_counts([("abcd.mp4", 3)]);
/// let entry = mapping.iter().next().unwrap();
/// assert_eq!(resolve_video_id(entry, &[], true).unwrap(), "abcd");
/// assert_eq!(resolve_video_id(entry, &["yt-42".to_string()], false).unwrap(), "yt-42");
/// ```
pub fn resolve_video_id(
    entry: &IndexEntry,
    ids: &[String],
    use_dst_name: bool,
) -> Result<String, EncodeError> {
    if use_dst_name {
        return Ok(strip_extension(&entry.dst_name));
    }
    ids.get(entry.reference)
        .cloned()
        .ok_or(EncodeError::MissingVideoId {
            reference: entry.reference,
        })
}

/// Encode one chunk of frames and write one record per video.
///
/// # Arguments
///
/// * `chunk` — Decoded frames, one segment per video.
/// * `index` — Per-video frame ranges and destination names; emission order.
/// * `writer` — Sink receiving each record; awaited once per video.
/// * `mapper` — Model performing preprocessing and inference.
/// * `metadata` — Per-video metadata, resolved by reference.
/// * `ids` — External video ids indexed by reference (unused with
///   [`with_use_dst_name`](EncodeOptions::with_use_dst_name)).
/// * `options` — Batching, strategy, scheduling, and naming settings.
///
/// Must be called from within a Tokio runtime.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use chunk_encoder::{
///     ColumnarMetadata, EncodeOptions, FrameChunk, HistogramMapper, IndexMapping,
///     MemoryWriter, encode_chunk,
/// };
/// use image::{Rgb, RgbImage};
///
/// # async fn example() -> Result<(), chunk_encoder::EncodeError> {
/// let frame = RgbImage::from_pixel(16, 16, Rgb([200, 30, 30]));
/// let chunk = FrameChunk::new(vec![vec![frame.clone(); 3], vec![frame; 5]]);
/// let index = IndexMapping::from_frame_counts([("a.mp4", 3), ("b.mp4", 5)]);
/// let metadata = ColumnarMetadata::new();
/// let mut writer = MemoryWriter::new();
///
/// let encoded = encode_chunk(
///     chunk,
///     &index,
///     &mut writer,
///     Arc::new(HistogramMapper::new()),
///     &metadata,
///     &[],
///     &EncodeOptions::new().with_use_dst_name(true),
/// )
/// .await?;
/// assert_eq!(encoded.video_ids, vec!["a", "b"]);
/// # Ok(())
/// # }
/// ```
pub async fn encode_chunk<M, S, W>(
    chunk: FrameChunk,
    index: &IndexMapping,
    writer: &mut W,
    mapper: Arc<M>,
    metadata: &S,
    ids: &[String],
    options: &EncodeOptions,
) -> Result<EncodedChunk, EncodeError>
where
    M: Mapper + ?Sized + 'static,
    S: MetadataSource + ?Sized,
    W: RecordWriter,
{
    let kind = options.strategy()?;
    let frames = chunk.total_frames();
    index.validate(frames)?;

    let mut batches = spawn_batches(Arc::new(chunk), Arc::clone(&mapper), options)?;
    let batch_total = batches.batch_count();
    log::debug!(
        "Encoding chunk (strategy={:?}, frames={}, videos={}, batches={}, device={})",
        kind,
        frames,
        index.len(),
        batch_total,
        options.device()
    );

    let mut stats = EncodeStats {
        strategy: kind,
        frames,
        batches: 0,
        yields: 0,
        videos_written: 0,
        caption_embeddings: false,
    };

    let mut strategy = ChunkStrategy::new(kind, options);
    let mut tracker = ProgressTracker::new(
        Arc::clone(&options.progress),
        OperationType::Inference,
        Some(batch_total as u64),
    );
    while let Some(batch) = batches.next().await {
        let batch = batch?;
        if options.low_priority {
            tokio::task::yield_now().await;
            stats.yields += 1;
        }
        options.check_cancelled()?;

        log::trace!(
            "Running batch {} (frames {}..{})",
            batch.index,
            batch.offset,
            batch.offset + batch.len()
        );
        strategy.run_batch(mapper.as_ref(), batch, options.device())?;
        stats.batches += 1;
        tracker.advance();
    }
    drop(batches);

    stats.caption_embeddings = strategy.prepare(mapper.as_ref(), index, metadata, options.device())?;

    let mut encoded = EncodedChunk {
        payloads: Vec::with_capacity(index.len()),
        video_ids: Vec::with_capacity(index.len()),
        metadata: Vec::with_capacity(index.len()),
        stats,
    };
    let mut tracker = ProgressTracker::new(
        Arc::clone(&options.progress),
        OperationType::Emission,
        Some(index.len() as u64),
    );
    for (position, entry) in index.iter().enumerate() {
        let video_id = resolve_video_id(entry, ids, options.use_dst_name)?;
        let mut record = metadata.record_for(entry.reference)?;
        let payload = strategy.finalize(position, entry, &mut record)?;

        options.check_cancelled()?;
        log::debug!(
            "Writing {} ({} frames, {:?})",
            video_id,
            entry.len(),
            strategy.kind()
        );
        writer.write(payload.as_ref(), &video_id, &record).await?;

        encoded.payloads.push(payload);
        encoded.video_ids.push(video_id);
        encoded.metadata.push(record);
        encoded.stats.videos_written += 1;
        tracker.advance();
    }

    log::info!(
        "Encoded chunk: {} frames in {} batches, {} videos written",
        encoded.stats.frames,
        encoded.stats.batches,
        encoded.stats.videos_written
    );
    Ok(encoded)
}
