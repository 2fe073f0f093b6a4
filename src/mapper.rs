//! The model capability set consumed by the encoder.
//!
//! A [`Mapper`] wraps whatever model produces embeddings, tokens, or captions.
//! The encoder only calls the capabilities the selected strategy needs, so a
//! mapper may leave the others at their default, which reports
//! [`EncodeError::Unsupported`].
//!
//! Tensor layouts:
//!
//! - [`preprocess`](Mapper::preprocess) returns one frame as `(height, width, channels)`.
//! - Embedding and captioning batches are stacked preprocessed frames,
//!   `(frames, height, width, channels)`.
//! - Tokenization batches are channel-first, `(frames, channels, height, width)`,
//!   with values divided by 255.

use image::RgbImage;
use ndarray::{Array2, Array3, ArrayView4};

use crate::configuration::Device;
use crate::error::EncodeError;

/// Model-like component performing preprocessing and inference.
///
/// Implementations must be [`Send`] and [`Sync`]: preprocessing runs on a
/// pool of worker threads while inference runs on the calling task.
pub trait Mapper: Send + Sync {
    /// Convert one decoded frame into model input.
    fn preprocess(&self, frame: &RgbImage) -> Result<Array3<f32>, EncodeError>;

    /// Per-frame embeddings, one row per frame in the batch.
    ///
    /// Reduced-precision execution, if any, is the mapper's concern.
    fn embed(&self, batch: ArrayView4<'_, f32>, device: Device) -> Result<Array2<f32>, EncodeError> {
        let _ = (batch, device);
        Err(EncodeError::Unsupported("frame embedding"))
    }

    /// Whether the mapper carries a text tokenizer.
    ///
    /// When `true`, the embedding strategy also embeds reference captions and
    /// attaches per-frame similarity scores.
    fn has_tokenizer(&self) -> bool {
        false
    }

    /// Embed reference captions, one row per caption.
    fn encode_captions(&self, captions: &[String], device: Device) -> Result<Array2<f32>, EncodeError> {
        let _ = (captions, device);
        Err(EncodeError::Unsupported("caption encoding"))
    }

    /// Generate captions for a batch, in frame order.
    fn generate_captions(&self, batch: ArrayView4<'_, f32>, device: Device) -> Result<Vec<String>, EncodeError> {
        let _ = (batch, device);
        Err(EncodeError::Unsupported("caption generation"))
    }

    /// Discrete tokens for a channel-first, `[0, 1]`-scaled batch, one row per frame.
    fn tokenize_frames(&self, batch: ArrayView4<'_, f32>, device: Device) -> Result<Array2<i64>, EncodeError> {
        let _ = (batch, device);
        Err(EncodeError::Unsupported("frame tokenization"))
    }
}
