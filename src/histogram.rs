//! A deterministic reference mapper built on colour statistics.
//!
//! [`HistogramMapper`] implements every [`Mapper`] capability without a
//! neural network, which makes it useful for the CLI, for benchmarks, and for
//! exercising the full encode path in tests:
//!
//! - embeddings are per-channel colour histograms,
//! - reference captions are embedded by summing the histograms of the colour
//!   words they mention, so "a red car" scores high against red frames,
//! - captions name the colour closest to the frame's mean,
//! - tokens are quantised luminance levels over a coarse grid.

use image::{RgbImage, imageops::FilterType};
use ndarray::{Array2, Array3, ArrayView3, ArrayView4, Axis, s};

use crate::configuration::Device;
use crate::error::EncodeError;
use crate::mapper::Mapper;

/// Histogram bins per colour channel.
const BINS: usize = 8;

/// Width of every embedding row.
pub const EMBEDDING_DIM: usize = BINS * 3;

/// Grid cells per side used for tokenization.
const GRID: usize = 4;

/// Tokens emitted per frame.
pub const TOKENS_PER_FRAME: usize = GRID * GRID;

/// Distinct token ids.
pub const TOKEN_LEVELS: i64 = 16;

const NAMED_COLOURS: &[(&str, [f32; 3])] = &[
    ("black", [0.0, 0.0, 0.0]),
    ("white", [255.0, 255.0, 255.0]),
    ("gray", [128.0, 128.0, 128.0]),
    ("red", [255.0, 0.0, 0.0]),
    ("green", [0.0, 255.0, 0.0]),
    ("blue", [0.0, 0.0, 255.0]),
    ("yellow", [255.0, 255.0, 0.0]),
    ("cyan", [0.0, 255.0, 255.0]),
    ("magenta", [255.0, 0.0, 255.0]),
];

/// Colour-statistics mapper.
///
/// # Example
///
/// ```
/// use chunk_encoder::{HistogramMapper, Mapper};
/// use image::{Rgb, RgbImage};
///
/// let mapper = HistogramMapper::new().with_side(8);
/// let tensor = mapper.preprocess(&RgbImage::from_pixel(64, 48, Rgb([255, 0, 0]))).unwrap();
/// assert_eq!(tensor.shape(), &[8, 8, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct HistogramMapper {
    side: u32,
    tokenizer: bool,
}

impl Default for HistogramMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl HistogramMapper {
    /// Create a mapper that resizes frames to 32×32 and embeds captions.
    pub fn new() -> Self {
        Self {
            side: 32,
            tokenizer: true,
        }
    }

    /// Set the square side frames are resized to. Clamped to a minimum of 1.
    #[must_use]
    pub fn with_side(mut self, side: u32) -> Self {
        self.side = side.max(1);
        self
    }

    /// Enable or disable caption embedding.
    #[must_use]
    pub fn with_tokenizer(mut self, tokenizer: bool) -> Self {
        self.tokenizer = tokenizer;
        self
    }
}

fn bin_of(value: f32) -> usize {
    let scaled = (value.clamp(0.0, 255.0) / 256.0 * BINS as f32) as usize;
    scaled.min(BINS - 1)
}

fn check_channels(channels: usize) -> Result<(), EncodeError> {
    if channels < 3 {
        return Err(EncodeError::Mapper(format!(
            "expected 3 colour channels, got {channels}"
        )));
    }
    Ok(())
}

fn histogram(frame: ArrayView3<'_, f32>) -> Vec<f32> {
    let mut bins = vec![0.0f32; EMBEDDING_DIM];
    let mut pixels = 0usize;
    for pixel in frame.lanes(Axis(2)) {
        for (channel, &value) in pixel.iter().take(3).enumerate() {
            bins[channel * BINS + bin_of(value)] += 1.0;
        }
        pixels += 1;
    }
    if pixels > 0 {
        bins.iter_mut().for_each(|bin| *bin /= pixels as f32);
    }
    bins
}

fn nearest_colour(mean: [f32; 3]) -> &'static str {
    NAMED_COLOURS
        .iter()
        .map(|(name, rgb)| {
            let distance: f32 = rgb.iter().zip(mean).map(|(a, b)| (a - b).powi(2)).sum();
            (name, distance)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(name, _)| *name)
        .unwrap_or("gray")
}

impl Mapper for HistogramMapper {
    fn preprocess(&self, frame: &RgbImage) -> Result<Array3<f32>, EncodeError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(EncodeError::Mapper("frame has no pixels".to_string()));
        }

        let resized = image::imageops::resize(frame, self.side, self.side, FilterType::Triangle);
        let side = self.side as usize;
        let values = resized.into_raw().into_iter().map(f32::from).collect();
        Array3::from_shape_vec((side, side, 3), values)
            .map_err(|error| EncodeError::Mapper(error.to_string()))
    }

    fn embed(&self, batch: ArrayView4<'_, f32>, _device: Device) -> Result<Array2<f32>, EncodeError> {
        check_channels(batch.len_of(Axis(3)))?;

        let frames = batch.len_of(Axis(0));
        let mut embeddings = Array2::zeros((frames, EMBEDDING_DIM));
        for (mut row, frame) in embeddings.rows_mut().into_iter().zip(batch.outer_iter()) {
            for (slot, value) in row.iter_mut().zip(histogram(frame)) {
                *slot = value;
            }
        }
        Ok(embeddings)
    }

    fn has_tokenizer(&self) -> bool {
        self.tokenizer
    }

    fn encode_captions(&self, captions: &[String], _device: Device) -> Result<Array2<f32>, EncodeError> {
        let mut embeddings = Array2::zeros((captions.len(), EMBEDDING_DIM));
        for (mut row, caption) in embeddings.rows_mut().into_iter().zip(captions) {
            let lowered = caption.to_lowercase();
            for word in lowered.split(|c: char| !c.is_alphabetic()) {
                let Some((_, rgb)) = NAMED_COLOURS.iter().find(|(name, _)| *name == word) else {
                    continue;
                };
                for (channel, value) in rgb.iter().enumerate() {
                    row[channel * BINS + bin_of(*value)] += 1.0;
                }
            }
        }
        Ok(embeddings)
    }

    fn generate_captions(&self, batch: ArrayView4<'_, f32>, _device: Device) -> Result<Vec<String>, EncodeError> {
        check_channels(batch.len_of(Axis(3)))?;

        Ok(batch
            .outer_iter()
            .map(|frame| {
                let mut mean = [0.0f32; 3];
                for (channel, slot) in mean.iter_mut().enumerate() {
                    *slot = frame.index_axis(Axis(2), channel).mean().unwrap_or(0.0);
                }
                format!("a mostly {} frame", nearest_colour(mean))
            })
            .collect())
    }

    fn tokenize_frames(&self, batch: ArrayView4<'_, f32>, _device: Device) -> Result<Array2<i64>, EncodeError> {
        let (frames, channels, height, width) = batch.dim();
        check_channels(channels)?;
        if height == 0 || width == 0 {
            return Err(EncodeError::Mapper("batch frames have no pixels".to_string()));
        }

        let bounds = |cell: usize, extent: usize| {
            let start = cell * extent / GRID;
            let end = ((cell + 1) * extent / GRID).max(start + 1).min(extent);
            start..end
        };

        let mut tokens = Array2::zeros((frames, TOKENS_PER_FRAME));
        for (mut row, frame) in tokens.rows_mut().into_iter().zip(batch.outer_iter()) {
            for grid_y in 0..GRID {
                for grid_x in 0..GRID {
                    let cell = frame.slice(s![.., bounds(grid_y, height), bounds(grid_x, width)]);
                    let mean = |channel: usize| cell.index_axis(Axis(0), channel).mean().unwrap_or(0.0);
                    let luminance = 0.299 * mean(0) + 0.587 * mean(1) + 0.114 * mean(2);
                    let level = (luminance.clamp(0.0, 1.0) * TOKEN_LEVELS as f32) as i64;
                    row[grid_y * GRID + grid_x] = level.min(TOKEN_LEVELS - 1);
                }
            }
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;
    use ndarray::{Array4, stack};

    use super::*;

    fn batch_of(mapper: &HistogramMapper, colours: &[[u8; 3]]) -> Array4<f32> {
        let tensors: Vec<Array3<f32>> = colours
            .iter()
            .map(|rgb| mapper.preprocess(&RgbImage::from_pixel(10, 6, Rgb(*rgb))).unwrap())
            .collect();
        let views: Vec<_> = tensors.iter().map(|t| t.view()).collect();
        stack(Axis(0), &views).unwrap()
    }

    #[test]
    fn solid_frame_histogram_has_one_bin_per_channel() {
        let mapper = HistogramMapper::new().with_side(4);
        let batch = batch_of(&mapper, &[[255, 0, 0]]);
        let embeddings = mapper.embed(batch.view(), Device::Cpu).unwrap();
        assert_eq!(embeddings.shape(), &[1, EMBEDDING_DIM]);
        assert_eq!(embeddings.row(0).sum(), 3.0);
        assert_eq!(embeddings[[0, BINS - 1]], 1.0);
        assert_eq!(embeddings[[0, BINS]], 1.0);
    }

    #[test]
    fn captions_name_the_dominant_colour() {
        let mapper = HistogramMapper::new().with_side(4);
        let batch = batch_of(&mapper, &[[250, 5, 5], [0, 0, 240]]);
        let captions = mapper.generate_captions(batch.view(), Device::Cpu).unwrap();
        assert_eq!(captions, vec!["a mostly red frame", "a mostly blue frame"]);
    }

    #[test]
    fn caption_without_colour_words_is_zero() {
        let mapper = HistogramMapper::new();
        let embeddings = mapper
            .encode_captions(&["".to_string(), "a Red kite".to_string()], Device::Cpu)
            .unwrap();
        assert_eq!(embeddings.row(0).sum(), 0.0);
        assert_eq!(embeddings.row(1).sum(), 3.0);
    }

    #[test]
    fn tokens_span_the_luminance_range() {
        let mapper = HistogramMapper::new().with_side(8);
        let batch = batch_of(&mapper, &[[0, 0, 0], [255, 255, 255]]);
        let mut channel_first = batch.permuted_axes([0, 3, 1, 2]);
        channel_first.mapv_inplace(|v| v / 255.0);
        let tokens = mapper.tokenize_frames(channel_first.view(), Device::Cpu).unwrap();
        assert!(tokens.row(0).iter().all(|&t| t == 0));
        assert!(tokens.row(1).iter().all(|&t| t == TOKEN_LEVELS - 1));
    }
}
