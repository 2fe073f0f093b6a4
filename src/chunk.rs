//! Frame chunks and the index mapping that slices them back into videos.
//!
//! A [`FrameChunk`] holds decoded frames for one or more videos, one segment
//! per video. Concatenating the segments in order defines the global offset
//! space; an [`IndexMapping`] records, for each video, the half-open range
//! `[start, end)` of that space it owns together with its destination name.

use std::slice::Iter;

use image::RgbImage;

use crate::error::EncodeError;

/// Decoded frames for one chunk, grouped into per-video segments.
#[derive(Debug, Clone, Default)]
pub struct FrameChunk {
    segments: Vec<Vec<RgbImage>>,
}

impl FrameChunk {
    /// Create a chunk from ordered frame segments.
    pub fn new(segments: Vec<Vec<RgbImage>>) -> Self {
        Self { segments }
    }

    /// Append the frames of one more video.
    pub fn push_segment(&mut self, frames: Vec<RgbImage>) {
        self.segments.push(frames);
    }

    /// Number of frames across all segments.
    pub fn total_frames(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    /// Frames in global offset order.
    pub fn frames(&self) -> impl Iterator<Item = &RgbImage> {
        self.segments.iter().flatten()
    }
}

/// One video's slice of a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Opaque per-video key used for id and metadata lookups.
    pub reference: usize,
    /// Inclusive start offset in the chunk's output stream.
    pub start: usize,
    /// Exclusive end offset in the chunk's output stream.
    pub end: usize,
    /// Destination file name, extension included (e.g. `"abcd.mp4"`).
    pub dst_name: String,
}

impl IndexEntry {
    /// Number of frames owned by this video.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Returns `true` if the segment owns no frames.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered per-video index of a chunk.
///
/// Iteration order is insertion order; records are emitted in this order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexMapping {
    entries: Vec<IndexEntry>,
}

impl IndexMapping {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a contiguous mapping from `(dst_name, frame_count)` pairs.
    ///
    /// References are assigned `0..n` in order and segments are laid out back
    /// to back, matching how frame segments are concatenated in a
    /// [`FrameChunk`].
    pub fn from_frame_counts<I, S>(videos: I) -> Self
    where
        I: IntoIterator<Item = (S, usize)>,
        S: Into<String>,
    {
        let mut mapping = Self::new();
        let mut offset = 0;
        for (reference, (dst_name, count)) in videos.into_iter().enumerate() {
            mapping.push(reference, offset, offset + count, dst_name);
            offset += count;
        }
        mapping
    }

    /// Append an entry.
    pub fn push(&mut self, reference: usize, start: usize, end: usize, dst_name: impl Into<String>) {
        self.entries.push(IndexEntry {
            reference,
            start,
            end,
            dst_name: dst_name.into(),
        });
    }

    /// Entries in emission order.
    pub fn iter(&self) -> Iter<'_, IndexEntry> {
        self.entries.iter()
    }

    /// Number of videos.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the mapping holds no videos.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all segment lengths.
    pub fn covered_frames(&self) -> usize {
        self.entries.iter().map(IndexEntry::len).sum()
    }

    /// Check that segments are well-formed, pairwise disjoint, and cover
    /// exactly `total` frames.
    pub fn validate(&self, total: usize) -> Result<(), EncodeError> {
        for entry in &self.entries {
            if entry.start > entry.end || entry.end > total {
                return Err(EncodeError::InvalidSegment {
                    reference: entry.reference,
                    start: entry.start,
                    end: entry.end,
                    total,
                });
            }
        }

        let mut ordered: Vec<&IndexEntry> =
            self.entries.iter().filter(|entry| !entry.is_empty()).collect();
        ordered.sort_by_key(|entry| entry.start);
        for pair in ordered.windows(2) {
            if pair[1].start < pair[0].end {
                return Err(EncodeError::OverlappingSegments {
                    first: pair[0].reference,
                    second: pair[1].reference,
                });
            }
        }

        let covered = self.covered_frames();
        if covered != total {
            return Err(EncodeError::CoverageMismatch { covered, total });
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a IndexMapping {
    type Item = &'a IndexEntry;
    type IntoIter = Iter<'a, IndexEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(count: usize, shade: u8) -> Vec<RgbImage> {
        (0..count)
            .map(|_| RgbImage::from_pixel(2, 2, image::Rgb([shade, shade, shade])))
            .collect()
    }

    #[test]
    fn frames_follow_segment_order() {
        let mut chunk = FrameChunk::new(vec![frames(2, 10), frames(0, 0)]);
        chunk.push_segment(frames(3, 20));
        assert_eq!(chunk.total_frames(), 5);
        let shades: Vec<u8> = chunk.frames().map(|frame| frame.get_pixel(0, 0)[0]).collect();
        assert_eq!(shades, vec![10, 10, 20, 20, 20]);
    }

    #[test]
    fn from_frame_counts_is_contiguous() {
        let mapping = IndexMapping::from_frame_counts([("a.mp4", 3), ("b.mp4", 5)]);
        let entries: Vec<_> = mapping.iter().map(|e| (e.reference, e.start, e.end)).collect();
        assert_eq!(entries, vec![(0, 0, 3), (1, 3, 8)]);
        assert!(mapping.validate(8).is_ok());
    }
}
