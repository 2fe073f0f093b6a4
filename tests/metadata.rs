//! Columnar and record-oriented metadata source tests.

use chunk_encoder::metadata::caption_of;
use chunk_encoder::{ColumnarMetadata, EncodeError, MetadataSource, RecordMetadata};
use serde_json::{Value, json};

// ── ColumnarMetadata ───────────────────────────────────────────────

#[test]
fn columnar_record_gathers_every_column() {
    let table = ColumnarMetadata::new()
        .with_column("caption", vec![json!("a cat"), json!("a dog")])
        .with_column("width", vec![json!(640), json!(1280)]);

    let record = table.record_for(1).unwrap();
    assert_eq!(Value::Object(record), json!({"json": {"caption": "a dog", "width": 1280}}));
    assert_eq!(table.caption_for(0).unwrap(), "a cat");
    assert_eq!(table.row_count(), 2);
    assert_eq!(table.column_names().collect::<Vec<_>>(), vec!["caption", "width"]);
}

#[test]
fn columnar_without_columns_yields_empty_structured_record() {
    let table = ColumnarMetadata::new();
    let record = table.record_for(42).unwrap();
    assert_eq!(Value::Object(record), json!({"json": {}}));
    assert_eq!(table.caption_for(42).unwrap(), "");
}

#[test]
fn columnar_short_column_is_missing_metadata() {
    let mut table = ColumnarMetadata::new().with_column("a", vec![json!(1), json!(2)]);
    table.push_column("b", vec![json!(1)]);

    assert_eq!(table.row_count(), 1);
    assert!(matches!(
        table.record_for(1),
        Err(EncodeError::MissingMetadata { reference: 1 })
    ));
}

// ── RecordMetadata ─────────────────────────────────────────────────

#[test]
fn records_from_json_are_indexed_in_order() {
    let records = RecordMetadata::from_json(json!([
        {"json": {"caption": "first"}, "key": "000"},
        {"caption": "top level only"},
    ]))
    .unwrap();
    assert_eq!(records.len(), 2);

    let first = records.record_for(0).unwrap();
    assert_eq!(first["key"], "000");
    assert_eq!(records.caption_for(0).unwrap(), "first");

    // A structured object is always present; top-level captions still resolve.
    let second = records.record_for(1).unwrap();
    assert_eq!(second["json"], json!({}));
    assert_eq!(caption_of(&second), Some("top level only"));
}

#[test]
fn records_from_json_rejects_non_arrays() {
    assert!(matches!(
        RecordMetadata::from_json(json!({"json": {}})),
        Err(EncodeError::Configuration(_))
    ));
    assert!(matches!(
        RecordMetadata::from_json(json!([{"json": {}}, 3])),
        Err(EncodeError::Configuration(message)) if message.contains("entry 1")
    ));
}

#[test]
fn records_insert_sparse_references() {
    let mut records = RecordMetadata::new();
    assert!(records.is_empty());

    let Value::Object(record) = json!({"json": {"caption": "late"}}) else {
        unreachable!()
    };
    records.insert(10, record);

    assert_eq!(records.caption_for(10).unwrap(), "late");
    assert!(matches!(
        records.record_for(0),
        Err(EncodeError::MissingMetadata { reference: 0 })
    ));
}

#[test]
fn record_for_returns_independent_copies() {
    let records = RecordMetadata::from_json(json!([{"json": {"caption": "x"}}])).unwrap();
    let mut first = records.record_for(0).unwrap();
    first.insert("txt".to_string(), json!("mutated"));

    let second = records.record_for(0).unwrap();
    assert!(!second.contains_key("txt"));
}
