//! IndexMapping construction and validation tests.

use chunk_encoder::{EncodeError, IndexMapping, resolve_video_id};

#[test]
fn frame_counts_are_laid_out_back_to_back() {
    let mapping = IndexMapping::from_frame_counts([("a.mp4", 3), ("b.mp4", 0), ("c.mp4", 5)]);
    let ranges: Vec<(usize, usize, usize)> = mapping
        .iter()
        .map(|entry| (entry.reference, entry.start, entry.end))
        .collect();
    assert_eq!(ranges, vec![(0, 0, 3), (1, 3, 3), (2, 3, 8)]);
    assert_eq!(mapping.covered_frames(), 8);
    assert!(mapping.validate(8).is_ok());
}

#[test]
fn empty_mapping_covers_empty_chunk() {
    let mapping = IndexMapping::new();
    assert!(mapping.is_empty());
    assert!(mapping.validate(0).is_ok());
    assert!(matches!(
        mapping.validate(1),
        Err(EncodeError::CoverageMismatch { covered: 0, total: 1 })
    ));
}

#[test]
fn reversed_segment_is_invalid() {
    let mut mapping = IndexMapping::new();
    mapping.push(4, 5, 2, "x.mp4");
    assert!(matches!(
        mapping.validate(8),
        Err(EncodeError::InvalidSegment {
            reference: 4,
            start: 5,
            end: 2,
            total: 8
        })
    ));
}

#[test]
fn segment_past_the_end_is_invalid() {
    let mapping = IndexMapping::from_frame_counts([("a.mp4", 3), ("b.mp4", 6)]);
    assert!(matches!(
        mapping.validate(8),
        Err(EncodeError::InvalidSegment { reference: 1, .. })
    ));
}

#[test]
fn overlapping_segments_are_rejected() {
    let mut mapping = IndexMapping::new();
    mapping.push(0, 0, 4, "a.mp4");
    mapping.push(1, 3, 6, "b.mp4");
    assert!(matches!(
        mapping.validate(6),
        Err(EncodeError::OverlappingSegments { first: 0, second: 1 })
    ));
}

#[test]
fn out_of_order_disjoint_segments_are_valid() {
    let mut mapping = IndexMapping::new();
    mapping.push(7, 4, 6, "late.mp4");
    mapping.push(2, 0, 4, "early.mp4");
    assert!(mapping.validate(6).is_ok());

    let names: Vec<&str> = (&mapping).into_iter().map(|entry| entry.dst_name.as_str()).collect();
    assert_eq!(names, vec!["late.mp4", "early.mp4"]);
}

#[test]
fn gap_is_a_coverage_mismatch() {
    let mut mapping = IndexMapping::new();
    mapping.push(0, 0, 2, "a.mp4");
    mapping.push(1, 3, 5, "b.mp4");
    assert!(matches!(
        mapping.validate(5),
        Err(EncodeError::CoverageMismatch { covered: 4, total: 5 })
    ));
}

// ── Video id resolution ────────────────────────────────────────────

#[test]
fn dst_name_strips_four_characters() {
    let mapping = IndexMapping::from_frame_counts([("abcd.mp4", 1), ("x.webm", 1), ("ab", 1)]);
    let ids: Vec<String> = mapping
        .iter()
        .map(|entry| resolve_video_id(entry, &[], true).unwrap())
        .collect();
    assert_eq!(ids, vec!["abcd", "x.", ""]);
}

#[test]
fn ids_are_indexed_by_reference() {
    let mut mapping = IndexMapping::new();
    mapping.push(2, 0, 1, "ignored.mp4");
    let entry = mapping.iter().next().unwrap();
    let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];

    assert_eq!(resolve_video_id(entry, &ids, false).unwrap(), "c");
    assert!(matches!(
        resolve_video_id(entry, &ids[..2], false),
        Err(EncodeError::MissingVideoId { reference: 2 })
    ));
}
