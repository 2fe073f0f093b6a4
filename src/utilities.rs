//! Internal utility functions.
//!
//! Vector normalisation, caption similarity, and destination-name handling
//! shared by the strategies and the encoder.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

/// Length of the extension stripped from destination names (e.g. `".mp4"`).
const EXTENSION_LENGTH: usize = 4;

/// L2-normalise every row of a matrix. Zero rows stay zero.
pub fn l2_normalize_rows(matrix: ArrayView2<'_, f32>) -> Array2<f32> {
    let mut normalized = matrix.to_owned();
    for mut row in normalized.axis_iter_mut(Axis(0)) {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|value| value / norm);
        }
    }
    normalized
}

/// Cosine similarity of every frame embedding against one caption embedding.
///
/// `caption` is expected to be normalised already; frames are normalised
/// here. Results are clamped to `[-1, 1]`. A segment with no frames has no
/// similarities, whatever the caption width.
pub fn cosine_similarities(frames: ArrayView2<'_, f32>, caption: ArrayView1<'_, f32>) -> Vec<f32> {
    if frames.nrows() == 0 {
        return Vec::new();
    }
    l2_normalize_rows(frames)
        .dot(&caption)
        .iter()
        .map(|similarity| similarity.clamp(-1.0, 1.0))
        .collect()
}

/// Drop the trailing four-character extension from a destination name.
///
/// `"abcd.mp4"` becomes `"abcd"`. Names shorter than the extension yield an
/// empty string.
pub fn strip_extension(dst_name: &str) -> String {
    let keep = dst_name.chars().count().saturating_sub(EXTENSION_LENGTH);
    dst_name.chars().take(keep).collect()
}
