//! Error types for the `chunk-encoder` crate.
//!
//! This module defines [`EncodeError`], the unified error type returned by all
//! fallible operations in the crate. Errors carry enough context (frame index,
//! batch index, video reference) to locate the failing unit of a chunk without
//! extra logging at the call site.

use std::io::Error as IoError;

use image::ImageError;
use serde_json::Error as JsonError;
use thiserror::Error;

/// The unified error type for all `chunk-encoder` operations.
///
/// A chunk either encodes and emits completely or fails with one of these
/// variants. Records written before the failure stay written; nothing after
/// it is attempted.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// A frame could not be converted into model input.
    #[error("Failed to preprocess frame {frame_index}: {reason}")]
    Preprocess {
        /// Global offset of the frame within the chunk.
        frame_index: usize,
        /// Reason reported by the mapper.
        reason: String,
    },

    /// Preprocessed frames in one batch could not be stacked into a tensor.
    #[error("Failed to assemble batch {batch_index}: {reason}")]
    BatchShape {
        /// Zero-based batch number.
        batch_index: usize,
        /// Shape mismatch description.
        reason: String,
    },

    /// The mapper failed while running a batch.
    #[error("Inference failed on batch {batch_index}: {reason}")]
    Inference {
        /// Zero-based batch number.
        batch_index: usize,
        /// Reason reported by the mapper or the shape check.
        reason: String,
    },

    /// Reference captions could not be embedded.
    #[error("Caption encoding failed: {0}")]
    CaptionEncoding(String),

    /// A failure reported by a mapper implementation.
    #[error("Mapper error: {0}")]
    Mapper(String),

    /// The mapper does not implement a capability the selected strategy needs.
    #[error("Mapper does not support {0}")]
    Unsupported(&'static str),

    /// A video reference has no metadata record.
    #[error("No metadata record for video reference {reference}")]
    MissingMetadata {
        /// The reference that failed to resolve.
        reference: usize,
    },

    /// A video reference has no entry in the id list.
    #[error("No video id for video reference {reference}")]
    MissingVideoId {
        /// The reference that failed to resolve.
        reference: usize,
    },

    /// An index entry is reversed or reaches past the output stream.
    #[error("Invalid segment [{start}, {end}) for video reference {reference} (stream has {total} items)")]
    InvalidSegment {
        /// Video reference of the entry.
        reference: usize,
        /// Inclusive start offset.
        start: usize,
        /// Exclusive end offset.
        end: usize,
        /// Length of the stream being sliced.
        total: usize,
    },

    /// Two index entries claim the same frames.
    #[error("Segments for video references {first} and {second} overlap")]
    OverlappingSegments {
        /// Reference of the earlier segment.
        first: usize,
        /// Reference of the later segment.
        second: usize,
    },

    /// The index mapping does not cover exactly the frames in the chunk.
    #[error("Index mapping covers {covered} frames but the chunk has {total}")]
    CoverageMismatch {
        /// Sum of all segment lengths.
        covered: usize,
        /// Frames in the chunk.
        total: usize,
    },

    /// The caption stream has nothing at the start of a video's segment.
    #[error("No generated caption for video reference {reference}")]
    MissingCaption {
        /// Video reference of the entry.
        reference: usize,
    },

    /// The writer failed to persist a record.
    #[error("Failed to write record {video_id}: {reason}")]
    Write {
        /// Id of the record being written.
        video_id: String,
        /// Underlying reason.
        reason: String,
    },

    /// An option value was rejected.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// JSON (de)serialisation failed.
    #[error("JSON error: {0}")]
    Json(#[from] JsonError),

    /// An error from the `image` crate while loading frames.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,
}
