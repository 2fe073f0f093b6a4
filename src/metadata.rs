//! Per-video metadata sources.
//!
//! Metadata arrives in one of two shapes: a dense columnar table read
//! positionally by video reference ([`ColumnarMetadata`]), or records that are
//! already keyed per video ([`RecordMetadata`]). Both implement
//! [`MetadataSource`], so the encoder never needs to know which one it has.
//!
//! Every resolved record is a JSON object carrying at least the structured
//! field [`JSON_KEY`].

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::EncodeError;

/// A per-video metadata record.
pub type VideoRecord = Map<String, Value>;

/// Key of the nested structured-metadata object.
pub const JSON_KEY: &str = "json";

/// Key of the raw caption text copied out of the structured metadata.
pub const TEXT_KEY: &str = "txt";

/// Key of a video's reference caption.
pub const CAPTION_KEY: &str = "caption";

/// Key of the per-frame caption similarity list.
pub const SIMILARITY_KEY: &str = "clip_frame_similarity";

/// Resolves a video reference to its metadata record.
pub trait MetadataSource: Send + Sync {
    /// Build the record for `reference`.
    ///
    /// The returned record always contains an object under [`JSON_KEY`].
    fn record_for(&self, reference: usize) -> Result<VideoRecord, EncodeError>;

    /// The reference caption for `reference`, or an empty string.
    fn caption_for(&self, reference: usize) -> Result<String, EncodeError> {
        let record = self.record_for(reference)?;
        Ok(caption_of(&record).unwrap_or_default().to_string())
    }
}

/// The caption of a record: `json.caption` first, then a top-level `caption`.
pub fn caption_of(record: &VideoRecord) -> Option<&str> {
    record
        .get(JSON_KEY)
        .and_then(|structured| structured.get(CAPTION_KEY))
        .and_then(Value::as_str)
        .or_else(|| record.get(CAPTION_KEY).and_then(Value::as_str))
}

/// The structured-metadata object of a record, created empty if absent.
pub fn structured_mut(record: &mut VideoRecord) -> &mut VideoRecord {
    let slot = record
        .entry(JSON_KEY)
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    match slot {
        Value::Object(structured) => structured,
        _ => unreachable!("structured metadata slot was just made an object"),
    }
}

/// Copy `json.caption` to the raw-text field, if present.
pub(crate) fn copy_caption_text(record: &mut VideoRecord) {
    let caption = record
        .get(JSON_KEY)
        .and_then(|structured| structured.get(CAPTION_KEY))
        .cloned();
    if let Some(caption) = caption {
        record.insert(TEXT_KEY.to_string(), caption);
    }
}

/// Dense columnar metadata: one value per video in every column.
///
/// Columns keep insertion order. The record for reference `r` has every
/// column's `r`-th value under [`JSON_KEY`].
///
/// # Example
///
/// ```
/// use chunk_encoder::{ColumnarMetadata, MetadataSource};
/// use serde_json::json;
///
/// let table = ColumnarMetadata::new()
///     .with_column("caption", vec![json!("a cat"), json!("a dog")])
///     .with_column("duration", vec![json!(3.5), json!(1.0)]);
///
/// let record = table.record_for(1).unwrap();
/// assert_eq!(record["json"]["caption"], "a dog");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ColumnarMetadata {
    columns: Vec<(String, Vec<Value>)>,
}

impl ColumnarMetadata {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column.
    #[must_use]
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<Value>) -> Self {
        self.push_column(name, values);
        self
    }

    /// Add a column in place.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Value>) {
        self.columns.push((name.into(), values));
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// Number of rows, taken as the shortest column.
    pub fn row_count(&self) -> usize {
        self.columns
            .iter()
            .map(|(_, values)| values.len())
            .min()
            .unwrap_or(0)
    }
}

impl MetadataSource for ColumnarMetadata {
    fn record_for(&self, reference: usize) -> Result<VideoRecord, EncodeError> {
        let mut structured = Map::new();
        for (name, values) in &self.columns {
            let value = values
                .get(reference)
                .ok_or(EncodeError::MissingMetadata { reference })?;
            structured.insert(name.clone(), value.clone());
        }

        let mut record = Map::new();
        record.insert(JSON_KEY.to_string(), Value::Object(structured));
        Ok(record)
    }
}

/// Record-oriented metadata: one ready-made record per video reference.
///
/// Records are returned as stored, with an empty [`JSON_KEY`] object added
/// when missing.
#[derive(Debug, Clone, Default)]
pub struct RecordMetadata {
    records: HashMap<usize, VideoRecord>,
}

impl RecordMetadata {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store records under references `0..n` in order.
    pub fn from_records(records: Vec<VideoRecord>) -> Self {
        Self {
            records: records.into_iter().enumerate().collect(),
        }
    }

    /// Parse a JSON array of objects into records `0..n`.
    pub fn from_json(value: Value) -> Result<Self, EncodeError> {
        let Value::Array(items) = value else {
            return Err(EncodeError::Configuration(
                "metadata must be a JSON array of objects".to_string(),
            ));
        };

        let records = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(record) => Ok(record),
                other => Err(EncodeError::Configuration(format!(
                    "metadata entry {index} is not an object: {other}"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_records(records))
    }

    /// Store a record under `reference`, replacing any previous one.
    pub fn insert(&mut self, reference: usize, record: VideoRecord) {
        self.records.insert(reference, record);
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl MetadataSource for RecordMetadata {
    fn record_for(&self, reference: usize) -> Result<VideoRecord, EncodeError> {
        let mut record = self
            .records
            .get(&reference)
            .cloned()
            .ok_or(EncodeError::MissingMetadata { reference })?;
        structured_mut(&mut record);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn structured_mut_replaces_non_objects() {
        let mut record = Map::new();
        record.insert(JSON_KEY.to_string(), json!("oops"));
        structured_mut(&mut record).insert("k".to_string(), json!(1));
        assert_eq!(Value::Object(record), json!({"json": {"k": 1}}));
    }

    #[test]
    fn caption_prefers_structured_field() {
        let Value::Object(record) = json!({"caption": "outer", "json": {"caption": "inner"}}) else {
            unreachable!()
        };
        assert_eq!(caption_of(&record), Some("inner"));
    }

    #[test]
    fn copy_caption_text_is_noop_without_caption() {
        let mut record = Map::new();
        structured_mut(&mut record);
        copy_caption_text(&mut record);
        assert!(!record.contains_key(TEXT_KEY));
    }
}
