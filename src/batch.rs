//! Batch preparation ahead of inference.
//!
//! [`BatchStream`] yields fixed-size batches of preprocessed frames in chunk
//! order. Preparation runs on a dedicated blocking thread that drives a
//! bounded [`rayon`] pool: the frames of one batch are preprocessed in
//! parallel, stacked into a single tensor, and sent through a bounded
//! channel. While the caller runs inference on one batch, the next ones are
//! already being prepared, up to the channel capacity.
//!
//! Dropping the stream closes the channel, which stops the preparation
//! thread at the next batch boundary.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use ndarray::{Array3, Array4, Axis, stack};
use rayon::ThreadPool;
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use tokio::sync::mpsc::{Receiver, Sender};

use crate::chunk::FrameChunk;
use crate::configuration::EncodeOptions;
use crate::error::EncodeError;
use crate::mapper::Mapper;

/// A batch of preprocessed frames.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    /// Zero-based batch number.
    pub index: usize,
    /// Global offset of the first frame in the batch.
    pub offset: usize,
    /// Stacked frames, `(frames, height, width, channels)`.
    pub frames: Array4<f32>,
}

impl PreparedBatch {
    /// Number of frames in the batch.
    pub fn len(&self) -> usize {
        self.frames.len_of(Axis(0))
    }

    /// Returns `true` if the batch holds no frames.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type BatchResult = Result<PreparedBatch, EncodeError>;

/// Ordered stream of prepared batches for one chunk.
///
/// Implements [`futures_core::Stream`]; use
/// [`StreamExt`](tokio_stream::StreamExt) to pull batches.
pub struct BatchStream {
    receiver: Receiver<BatchResult>,
    batch_size: usize,
    expected: usize,
    received: usize,
    finished: bool,
}

impl BatchStream {
    /// Number of batches the chunk splits into.
    pub fn batch_count(&self) -> usize {
        self.expected
    }
}

impl Stream for BatchStream {
    type Item = BatchResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }

        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(item)) => {
                match &item {
                    Ok(_) => self.received += 1,
                    Err(_) => self.finished = true,
                }
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                self.finished = true;
                if self.received < self.expected {
                    // The preparation thread went away without reporting why.
                    Poll::Ready(Some(Err(EncodeError::Preprocess {
                        frame_index: self.received * self.batch_size,
                        reason: "batch preparation stopped early".to_string(),
                    })))
                } else {
                    Poll::Ready(None)
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.expected.saturating_sub(self.received);
        (0, Some(remaining))
    }
}

/// Number of batches needed for `frames` at `batch_size`.
pub fn batch_count(frames: usize, batch_size: usize) -> usize {
    frames.div_ceil(batch_size.max(1))
}

/// Start preparing batches for `chunk` on a blocking thread.
///
/// Must be called from within a Tokio runtime.
pub(crate) fn spawn_batches<M>(
    chunk: Arc<FrameChunk>,
    mapper: Arc<M>,
    options: &EncodeOptions,
) -> Result<BatchStream, EncodeError>
where
    M: Mapper + ?Sized + 'static,
{
    let batch_size = options.batch_size();
    let expected = batch_count(chunk.total_frames(), batch_size);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.worker_count())
        .thread_name(|index| format!("chunk-prep-{index}"))
        .build()
        .map_err(|error| EncodeError::Configuration(format!("worker pool: {error}")))?;

    let (sender, receiver) = tokio::sync::mpsc::channel(options.prefetch_capacity());

    tokio::task::spawn_blocking(move || {
        prepare_batches_blocking(&chunk, mapper.as_ref(), &pool, batch_size, &sender);
    });

    Ok(BatchStream {
        receiver,
        batch_size,
        expected,
        received: 0,
        finished: false,
    })
}

/// Background preparation loop. Runs on a blocking thread.
fn prepare_batches_blocking<M>(
    chunk: &FrameChunk,
    mapper: &M,
    pool: &ThreadPool,
    batch_size: usize,
    sender: &Sender<BatchResult>,
) where
    M: Mapper + ?Sized,
{
    let frames: Vec<_> = chunk.frames().collect();

    for (index, window) in frames.chunks(batch_size).enumerate() {
        let offset = index * batch_size;
        let prepared = pool
            .install(|| {
                window
                    .par_iter()
                    .enumerate()
                    .map(|(position, frame)| {
                        mapper
                            .preprocess(frame)
                            .map_err(|error| EncodeError::Preprocess {
                                frame_index: offset + position,
                                reason: error.to_string(),
                            })
                    })
                    .collect::<Result<Vec<Array3<f32>>, EncodeError>>()
            })
            .and_then(|tensors| stack_batch(index, &tensors))
            .map(|frames| PreparedBatch {
                index,
                offset,
                frames,
            });

        let failed = prepared.is_err();
        if sender.blocking_send(prepared).is_err() || failed {
            // Receiver dropped, or the chunk is already lost.
            return;
        }
        log::trace!("Prepared batch {} ({} frames)", index, window.len());
    }
}

fn stack_batch(index: usize, tensors: &[Array3<f32>]) -> Result<Array4<f32>, EncodeError> {
    let views: Vec<_> = tensors.iter().map(|tensor| tensor.view()).collect();
    stack(Axis(0), &views).map_err(|error| EncodeError::BatchShape {
        batch_index: index,
        reason: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_count_rounds_up() {
        assert_eq!(batch_count(0, 128), 0);
        assert_eq!(batch_count(128, 128), 1);
        assert_eq!(batch_count(129, 128), 2);
        assert_eq!(batch_count(8, 3), 3);
    }

    #[test]
    fn mismatched_shapes_fail_the_batch() {
        let tensors = vec![Array3::zeros((2, 2, 3)), Array3::zeros((3, 2, 3))];
        match stack_batch(4, &tensors) {
            Err(EncodeError::BatchShape { batch_index, .. }) => assert_eq!(batch_index, 4),
            other => panic!("expected BatchShape, got {other:?}"),
        }
    }
}
