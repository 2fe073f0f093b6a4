//! Output-producing strategies.
//!
//! Exactly one [`ChunkStrategy`] runs per chunk. Each variant accumulates
//! output over every batch ([`run_batch`](ChunkStrategy::run_batch)), settles
//! its chunk-wide state once inference is done
//! ([`prepare`](ChunkStrategy::prepare)), then turns each video's slice of
//! the output stream into a payload and metadata enrichment
//! ([`finalize`](ChunkStrategy::finalize)).

use ndarray::{Array1, Array2, ArrayView2, Axis, concatenate, s};
use serde_json::{Value, json};

use crate::batch::PreparedBatch;
use crate::chunk::{IndexEntry, IndexMapping};
use crate::configuration::{Device, EncodeOptions, StrategyKind};
use crate::error::EncodeError;
use crate::mapper::Mapper;
use crate::metadata::{MetadataSource, SIMILARITY_KEY, VideoRecord, copy_caption_text, structured_mut};
use crate::payload::Payload;
use crate::utilities::{cosine_similarities, l2_normalize_rows};

/// Per-chunk state of the selected strategy.
#[derive(Debug)]
pub(crate) enum ChunkStrategy {
    Embedding {
        batches: Vec<Array2<f32>>,
        embeddings: Array2<f32>,
        /// Normalised caption embeddings, one per index entry in order.
        captions: Option<Array2<f32>>,
    },
    FrameTokenization {
        batches: Vec<Array2<i64>>,
        tokens: Array2<i64>,
    },
    Captioning {
        captions: Vec<String>,
        key: String,
    },
}

/// Wrap a mapper failure with the batch it happened on.
fn inference_error(batch_index: usize) -> impl Fn(EncodeError) -> EncodeError {
    move |error| match error {
        EncodeError::Unsupported(_) | EncodeError::Cancelled => error,
        other => EncodeError::Inference {
            batch_index,
            reason: other.to_string(),
        },
    }
}

fn check_rows(batch_index: usize, frames: usize, rows: usize) -> Result<(), EncodeError> {
    if rows != frames {
        return Err(EncodeError::Inference {
            batch_index,
            reason: format!("mapper returned {rows} rows for {frames} frames"),
        });
    }
    Ok(())
}

fn concatenate_rows<A: Clone + Default>(batches: &[Array2<A>]) -> Result<Array2<A>, EncodeError> {
    let views: Vec<ArrayView2<'_, A>> = batches.iter().map(|batch| batch.view()).collect();
    if views.is_empty() {
        return Ok(Array2::default((0, 0)));
    }
    concatenate(Axis(0), &views).map_err(|error| EncodeError::Inference {
        batch_index: 0,
        reason: format!("batch outputs have different widths: {error}"),
    })
}

fn segment_of(entry: &IndexEntry, total: usize) -> Result<(usize, usize), EncodeError> {
    if entry.start > entry.end || entry.end > total {
        return Err(EncodeError::InvalidSegment {
            reference: entry.reference,
            start: entry.start,
            end: entry.end,
            total,
        });
    }
    Ok((entry.start, entry.end))
}

impl ChunkStrategy {
    pub(crate) fn new(kind: StrategyKind, options: &EncodeOptions) -> Self {
        match kind {
            StrategyKind::Embedding => ChunkStrategy::Embedding {
                batches: Vec::new(),
                embeddings: Array2::zeros((0, 0)),
                captions: None,
            },
            StrategyKind::FrameTokenization => ChunkStrategy::FrameTokenization {
                batches: Vec::new(),
                tokens: Array2::zeros((0, 0)),
            },
            StrategyKind::Captioning => ChunkStrategy::Captioning {
                captions: Vec::new(),
                key: options.generated_caption_key().to_string(),
            },
        }
    }

    pub(crate) fn kind(&self) -> StrategyKind {
        match self {
            ChunkStrategy::Embedding { .. } => StrategyKind::Embedding,
            ChunkStrategy::FrameTokenization { .. } => StrategyKind::FrameTokenization,
            ChunkStrategy::Captioning { .. } => StrategyKind::Captioning,
        }
    }

    /// Run the mapper over one batch and keep its output.
    pub(crate) fn run_batch<M>(
        &mut self,
        mapper: &M,
        batch: PreparedBatch,
        device: Device,
    ) -> Result<(), EncodeError>
    where
        M: Mapper + ?Sized,
    {
        let (batch_index, frames) = (batch.index, batch.len());
        let wrap = inference_error(batch_index);
        match self {
            ChunkStrategy::Embedding { batches, .. } => {
                let output = mapper.embed(batch.frames.view(), device).map_err(wrap)?;
                check_rows(batch_index, frames, output.nrows())?;
                batches.push(output);
            }
            ChunkStrategy::FrameTokenization { batches, .. } => {
                let mut channel_first = batch.frames.permuted_axes([0, 3, 1, 2]);
                channel_first.mapv_inplace(|value| value / 255.0);
                let output = mapper
                    .tokenize_frames(channel_first.view(), device)
                    .map_err(wrap)?;
                check_rows(batch_index, frames, output.nrows())?;
                batches.push(output);
            }
            ChunkStrategy::Captioning { captions, .. } => {
                let generated = mapper
                    .generate_captions(batch.frames.view(), device)
                    .map_err(wrap)?;
                captions.extend(generated);
            }
        }
        Ok(())
    }

    /// Settle chunk-wide state after the last batch.
    ///
    /// Returns `true` if caption embeddings were computed.
    pub(crate) fn prepare<M, S>(
        &mut self,
        mapper: &M,
        index: &IndexMapping,
        metadata: &S,
        device: Device,
    ) -> Result<bool, EncodeError>
    where
        M: Mapper + ?Sized,
        S: MetadataSource + ?Sized,
    {
        match self {
            ChunkStrategy::Embedding {
                batches,
                embeddings,
                captions,
            } => {
                *embeddings = concatenate_rows(batches)?;
                batches.clear();

                if !mapper.has_tokenizer() {
                    return Ok(false);
                }

                let texts = index
                    .iter()
                    .map(|entry| metadata.caption_for(entry.reference))
                    .collect::<Result<Vec<String>, EncodeError>>()?;
                if texts.iter().all(String::is_empty) {
                    log::debug!("No reference captions in chunk; skipping caption similarity");
                    return Ok(false);
                }

                let encoded = mapper
                    .encode_captions(&texts, device)
                    .map_err(|error| match error {
                        EncodeError::Unsupported(_) => error,
                        other => EncodeError::CaptionEncoding(other.to_string()),
                    })?;
                if encoded.nrows() != texts.len() {
                    return Err(EncodeError::CaptionEncoding(format!(
                        "mapper returned {} rows for {} captions",
                        encoded.nrows(),
                        texts.len()
                    )));
                }
                if embeddings.nrows() > 0 && encoded.ncols() != embeddings.ncols() {
                    return Err(EncodeError::CaptionEncoding(format!(
                        "caption width {} does not match frame embedding width {}",
                        encoded.ncols(),
                        embeddings.ncols()
                    )));
                }
                *captions = Some(l2_normalize_rows(encoded.view()));
                Ok(true)
            }
            ChunkStrategy::FrameTokenization { batches, tokens } => {
                *tokens = concatenate_rows(batches)?;
                batches.clear();
                Ok(false)
            }
            ChunkStrategy::Captioning { .. } => Ok(false),
        }
    }

    /// Produce one video's payload and enrich its metadata.
    ///
    /// `position` is the entry's position in the index mapping.
    pub(crate) fn finalize(
        &self,
        position: usize,
        entry: &IndexEntry,
        record: &mut VideoRecord,
    ) -> Result<Option<Payload>, EncodeError> {
        match self {
            ChunkStrategy::Embedding {
                embeddings,
                captions,
                ..
            } => {
                let (start, end) = segment_of(entry, embeddings.nrows())?;
                let frame_embeddings = embeddings.slice(s![start..end, ..]).to_owned();

                copy_caption_text(record);
                if let Some(captions) = captions {
                    let caption: Array1<f32> = captions.row(position).to_owned();
                    let similarities = cosine_similarities(frame_embeddings.view(), caption.view());
                    structured_mut(record).insert(SIMILARITY_KEY.to_string(), json!(similarities));
                }
                Ok(Some(Payload::Embeddings(frame_embeddings)))
            }
            ChunkStrategy::FrameTokenization { tokens, .. } => {
                let (start, end) = segment_of(entry, tokens.nrows())?;
                copy_caption_text(record);
                Ok(Some(Payload::Tokens(tokens.slice(s![start..end, ..]).to_owned())))
            }
            ChunkStrategy::Captioning { captions, key } => {
                // Only the first caption of the segment is kept, even when the
                // mapper produced one per frame.
                let caption = captions
                    .get(entry.start..entry.end)
                    .and_then(|segment| segment.first())
                    .ok_or(EncodeError::MissingCaption {
                        reference: entry.reference,
                    })?;
                structured_mut(record).insert(key.clone(), Value::String(caption.clone()));
                Ok(None)
            }
        }
    }
}
