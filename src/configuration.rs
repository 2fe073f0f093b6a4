//! Chunk encoding configuration.
//!
//! [`EncodeOptions`] is a builder that threads batching, strategy selection,
//! naming, scheduling, progress, and cancellation settings through
//! [`encode_chunk`](crate::encode_chunk) without a long argument list.
//!
//! # Example
//!
//! ```
//! use chunk_encoder::{CancellationToken, Device, EncodeOptions, StrategyKind};
//!
//! let token = CancellationToken::new();
//! let options = EncodeOptions::new()
//!     .with_batch_size(64)
//!     .with_captioning_strategy("coca")
//!     .with_generated_caption_key("caption")
//!     .with_device(Device::Cuda(0))
//!     .with_low_priority(true)
//!     .with_cancellation(token.clone());
//!
//! assert_eq!(options.strategy().unwrap(), StrategyKind::Captioning);
//! ```

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::EncodeError;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};

/// Frames per inference batch unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 128;

/// Parallel preprocessing workers unless configured otherwise.
pub const DEFAULT_WORKER_COUNT: usize = 6;

/// Metadata key that receives generated captions unless configured otherwise.
pub const DEFAULT_GENERATED_CAPTION_KEY: &str = "generated_caption";

/// Strategy value meaning "not selected".
const STRATEGY_NONE: &str = "none";

/// Compute device handed through to the mapper.
///
/// The encoder never inspects the device; it only forwards it so a mapper can
/// place each batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    /// Host CPU. This is the default.
    #[default]
    Cpu,
    /// CUDA device with the given ordinal.
    Cuda(u32),
}

impl Display for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
        }
    }
}

impl FromStr for Device {
    type Err = EncodeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lowered = value.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|ordinal| ordinal.parse().ok())
                .map(Device::Cuda)
                .ok_or_else(|| EncodeError::Configuration(format!("unknown device: {value}"))),
        }
    }
}

/// The output-producing strategy for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Per-frame embeddings, with caption similarity when available.
    Embedding,
    /// Per-frame discrete tokens.
    FrameTokenization,
    /// Generated captions merged into metadata.
    Captioning,
}

impl Display for StrategyKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StrategyKind::Embedding => write!(f, "embedding"),
            StrategyKind::FrameTokenization => write!(f, "frame_tokenization"),
            StrategyKind::Captioning => write!(f, "captioning"),
        }
    }
}

/// Configuration for [`encode_chunk`](crate::encode_chunk).
///
/// All fields have defaults; a default-constructed value runs the embedding
/// strategy with 128-frame batches and six preprocessing workers.
#[derive(Clone)]
pub struct EncodeOptions {
    pub(crate) batch_size: usize,
    pub(crate) worker_count: usize,
    /// Bounded channel capacity between batch preparation and inference.
    pub(crate) prefetch: Option<usize>,
    pub(crate) captioning_strategy: Option<String>,
    pub(crate) frame_tokenization_strategy: Option<String>,
    pub(crate) strict_strategy: bool,
    pub(crate) generated_caption_key: String,
    pub(crate) use_dst_name: bool,
    pub(crate) low_priority: bool,
    pub(crate) device: Device,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl Debug for EncodeOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("EncodeOptions")
            .field("batch_size", &self.batch_size)
            .field("worker_count", &self.worker_count)
            .field("prefetch", &self.prefetch_capacity())
            .field("captioning_strategy", &self.captioning_strategy)
            .field("frame_tokenization_strategy", &self.frame_tokenization_strategy)
            .field("strict_strategy", &self.strict_strategy)
            .field("generated_caption_key", &self.generated_caption_key)
            .field("use_dst_name", &self.use_dst_name)
            .field("low_priority", &self.low_priority)
            .field("device", &self.device)
            .field("has_cancellation", &self.cancellation.is_some())
            .finish()
    }
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            worker_count: DEFAULT_WORKER_COUNT,
            prefetch: None,
            captioning_strategy: None,
            frame_tokenization_strategy: None,
            strict_strategy: false,
            generated_caption_key: DEFAULT_GENERATED_CAPTION_KEY.to_string(),
            use_dst_name: false,
            low_priority: false,
            device: Device::Cpu,
            progress: Arc::new(NoOpProgress),
            cancellation: None,
        }
    }

    /// Set the number of frames per inference batch. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the number of parallel preprocessing workers. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    /// Set how many prepared batches may wait ahead of inference.
    ///
    /// Defaults to the worker count.
    #[must_use]
    pub fn with_prefetch(mut self, batches: usize) -> Self {
        self.prefetch = Some(batches.max(1));
        self
    }

    /// Select the captioning strategy by name. `"none"` clears it.
    #[must_use]
    pub fn with_captioning_strategy(mut self, strategy: &str) -> Self {
        self.captioning_strategy = normalize_strategy(strategy);
        self
    }

    /// Select the frame tokenization strategy by name. `"none"` clears it.
    #[must_use]
    pub fn with_frame_tokenization_strategy(mut self, strategy: &str) -> Self {
        self.frame_tokenization_strategy = normalize_strategy(strategy);
        self
    }

    /// Reject configurations that select both captioning and tokenization
    /// instead of running captioning.
    #[must_use]
    pub fn with_strict_strategy(mut self, strict: bool) -> Self {
        self.strict_strategy = strict;
        self
    }

    /// Set the metadata key that receives generated captions.
    #[must_use]
    pub fn with_generated_caption_key(mut self, key: impl Into<String>) -> Self {
        self.generated_caption_key = key.into();
        self
    }

    /// Derive video ids from destination names instead of the id list.
    #[must_use]
    pub fn with_use_dst_name(mut self, use_dst_name: bool) -> Self {
        self.use_dst_name = use_dst_name;
        self
    }

    /// Yield to the scheduler before every batch.
    #[must_use]
    pub fn with_low_priority(mut self, low_priority: bool) -> Self {
        self.low_priority = low_priority;
        self
    }

    /// Set the device forwarded to the mapper.
    #[must_use]
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// When the token is cancelled, encoding stops at the next batch or write
    /// and returns [`EncodeError::Cancelled`].
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Frames per batch.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Preprocessing worker count.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Metadata key for generated captions.
    pub fn generated_caption_key(&self) -> &str {
        &self.generated_caption_key
    }

    /// Device forwarded to the mapper.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Resolve which strategy runs.
    ///
    /// Captioning takes precedence over tokenization; embedding runs when
    /// neither is selected. With [`with_strict_strategy`](Self::with_strict_strategy)
    /// selecting both is an error.
    pub fn strategy(&self) -> Result<StrategyKind, EncodeError> {
        match (&self.captioning_strategy, &self.frame_tokenization_strategy) {
            (Some(captioning), Some(tokenization)) => {
                if self.strict_strategy {
                    return Err(EncodeError::Configuration(format!(
                        "captioning strategy {captioning:?} and frame tokenization strategy \
                         {tokenization:?} are mutually exclusive"
                    )));
                }
                log::warn!(
                    "Both captioning ({}) and frame tokenization ({}) selected; running captioning",
                    captioning,
                    tokenization
                );
                Ok(StrategyKind::Captioning)
            }
            (Some(_), None) => Ok(StrategyKind::Captioning),
            (None, Some(_)) => Ok(StrategyKind::FrameTokenization),
            (None, None) => Ok(StrategyKind::Embedding),
        }
    }

    pub(crate) fn prefetch_capacity(&self) -> usize {
        self.prefetch.unwrap_or(self.worker_count).max(1)
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), EncodeError> {
        if self
            .cancellation
            .as_ref()
            .is_some_and(|token| token.is_cancelled())
        {
            return Err(EncodeError::Cancelled);
        }
        Ok(())
    }
}

fn normalize_strategy(strategy: &str) -> Option<String> {
    let trimmed = strategy.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(STRATEGY_NONE) {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_strategy_is_unset() {
        let options = EncodeOptions::new()
            .with_captioning_strategy("none")
            .with_frame_tokenization_strategy("NONE");
        assert_eq!(options.strategy().unwrap(), StrategyKind::Embedding);
    }

    #[test]
    fn device_parsing() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("cuda".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!("cuda:3".parse::<Device>().unwrap(), Device::Cuda(3));
        assert!("tpu".parse::<Device>().is_err());
        assert_eq!(Device::Cuda(1).to_string(), "cuda:1");
    }

    #[test]
    fn prefetch_defaults_to_worker_count() {
        let options = EncodeOptions::new().with_worker_count(3);
        assert_eq!(options.prefetch_capacity(), 3);
        assert_eq!(options.with_prefetch(0).prefetch_capacity(), 1);
    }
}
