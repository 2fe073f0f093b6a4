//! DirectoryWriter persistence tests.

use std::sync::Arc;

use chunk_encoder::{
    ColumnarMetadata, DirectoryWriter, EncodeError, EncodeOptions, FrameChunk, HistogramMapper,
    IndexMapping, Payload, RecordWriter, VideoRecord, encode_chunk,
};
use image::{Rgb, RgbImage};
use ndarray::array;
use serde_json::{Value, json};

fn record(value: Value) -> VideoRecord {
    match value {
        Value::Object(record) => record,
        other => panic!("not an object: {other}"),
    }
}

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).expect("file missing")).expect("invalid JSON")
}

#[tokio::test]
async fn writes_payload_and_metadata_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = DirectoryWriter::create(dir.path().join("out")).await.unwrap();

    let payload = Payload::Embeddings(array![[0.5f32, 0.25], [1.0, 0.0]]);
    writer
        .write(Some(&payload), "clip", &record(json!({"json": {"caption": "hi"}})))
        .await
        .unwrap();

    assert_eq!(writer.written(), 1);
    assert_eq!(
        read_json(&writer.metadata_path("clip")),
        json!({"json": {"caption": "hi"}})
    );
    let stored = read_json(&writer.payload_path("clip"));
    assert_eq!(stored["kind"], "embeddings");
    assert_eq!(stored["shape"], json!([2, 2]));
    assert_eq!(stored["data"], json!([[0.5, 0.25], [1.0, 0.0]]));

    // No temporary files are left behind.
    let names: Vec<String> = std::fs::read_dir(writer.root())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(names.iter().all(|name| !name.ends_with(".tmp")), "{names:?}");
}

#[tokio::test]
async fn caption_only_records_have_no_payload_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = DirectoryWriter::create(dir.path()).await.unwrap();

    writer
        .write(None, "captioned", &record(json!({"json": {"generated_caption": "a"}})))
        .await
        .unwrap();

    assert!(writer.metadata_path("captioned").is_file());
    assert!(!writer.payload_path("captioned").exists());
}

#[tokio::test]
async fn existing_record_is_not_overwritten_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = DirectoryWriter::create(dir.path()).await.unwrap();
    let metadata = record(json!({"json": {}}));

    writer.write(None, "dup", &metadata).await.unwrap();
    let result = writer.write(None, "dup", &metadata).await;
    match result {
        Err(EncodeError::Write { video_id, reason }) => {
            assert_eq!(video_id, "dup");
            assert!(reason.contains("already exists"));
        }
        other => panic!("Expected Write, got: {other:?}"),
    }
    assert_eq!(writer.written(), 1);

    let mut writer = writer.with_overwrite(true);
    writer
        .write(None, "dup", &record(json!({"json": {"v": 2}})))
        .await
        .unwrap();
    assert_eq!(read_json(&writer.metadata_path("dup")), json!({"json": {"v": 2}}));
}

#[tokio::test]
async fn path_like_ids_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = DirectoryWriter::create(dir.path()).await.unwrap();
    let metadata = record(json!({"json": {}}));

    for video_id in ["", ".", "..", "a/b", "a\\b"] {
        assert!(
            matches!(
                writer.write(None, video_id, &metadata).await,
                Err(EncodeError::Write { .. })
            ),
            "{video_id:?} should be rejected"
        );
    }
    assert_eq!(writer.written(), 0);
}

#[tokio::test]
async fn encode_chunk_into_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = DirectoryWriter::create(dir.path()).await.unwrap();
    let chunk = FrameChunk::new(vec![
        vec![RgbImage::from_pixel(8, 8, Rgb([0, 0, 250])); 2],
        vec![RgbImage::from_pixel(8, 8, Rgb([250, 250, 250])); 3],
    ]);
    let index = IndexMapping::from_frame_counts([("sea.mp4", 2), ("snow.mp4", 3)]);
    let metadata = ColumnarMetadata::new()
        .with_column("caption", vec![json!("blue sea"), json!("white snow")]);

    let encoded = encode_chunk(
        chunk,
        &index,
        &mut writer,
        Arc::new(HistogramMapper::new().with_side(4)),
        &metadata,
        &[],
        &EncodeOptions::new().with_use_dst_name(true),
    )
    .await
    .expect("encode failed");

    assert_eq!(encoded.video_ids, vec!["sea", "snow"]);
    assert_eq!(writer.written(), 2);

    let snow = read_json(&writer.metadata_path("snow"));
    assert_eq!(snow["txt"], "white snow");
    let similarities = snow["json"]["clip_frame_similarity"].as_array().unwrap();
    assert_eq!(similarities.len(), 3);
    assert_eq!(read_json(&writer.payload_path("snow"))["shape"], json!([3, 24]));
}
