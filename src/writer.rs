//! Output sinks for encoded records.
//!
//! The encoder hands every video to a [`RecordWriter`] and awaits the write
//! before moving on, so a writer never sees two writes from the same chunk at
//! once. Two implementations are provided:
//!
//! - [`MemoryWriter`] keeps records in memory, in write order.
//! - [`DirectoryWriter`] persists each record as JSON files under a directory.

use std::future::Future;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::EncodeError;
use crate::metadata::VideoRecord;
use crate::payload::Payload;

/// An append target for `(payload, video_id, metadata)` records.
///
/// A write is expected to be durable once its future completes. Writers are
/// awaited sequentially many times per chunk.
pub trait RecordWriter: Send {
    /// Persist one record.
    fn write(
        &mut self,
        payload: Option<&Payload>,
        video_id: &str,
        metadata: &VideoRecord,
    ) -> impl Future<Output = Result<(), EncodeError>> + Send;
}

/// A record captured by [`MemoryWriter`].
#[derive(Debug, Clone, PartialEq)]
pub struct WrittenRecord {
    /// Model output, absent for caption-only records.
    pub payload: Option<Payload>,
    /// Resolved video id.
    pub video_id: String,
    /// Enriched metadata.
    pub metadata: VideoRecord,
}

/// Collects records in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    records: Vec<WrittenRecord>,
}

impl MemoryWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records written so far, in order.
    pub fn records(&self) -> &[WrittenRecord] {
        &self.records
    }

    /// Take ownership of the collected records.
    pub fn into_records(self) -> Vec<WrittenRecord> {
        self.records
    }
}

impl RecordWriter for MemoryWriter {
    async fn write(
        &mut self,
        payload: Option<&Payload>,
        video_id: &str,
        metadata: &VideoRecord,
    ) -> Result<(), EncodeError> {
        self.records.push(WrittenRecord {
            payload: payload.cloned(),
            video_id: video_id.to_string(),
            metadata: metadata.clone(),
        });
        Ok(())
    }
}

/// Persists records as JSON files.
///
/// For each record, `<video_id>.payload.json` (when there is a payload) and
/// then `<video_id>.json` (the metadata) are written. Each file is written
/// to a temporary name and renamed into place, so a reader never observes a
/// partially written file, and the metadata file appearing marks the record
/// as complete.
///
/// # Example
///
/// ```no_run
/// use chunk_encoder::{DirectoryWriter, EncodeError};
///
/// # async fn example() -> Result<(), EncodeError> {
/// let writer = DirectoryWriter::create("encoded").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryWriter {
    root: PathBuf,
    overwrite: bool,
    written: usize,
}

impl DirectoryWriter {
    /// Create the output directory (and parents) if needed.
    pub async fn create(root: impl AsRef<Path>) -> Result<Self, EncodeError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        log::debug!("Writing records to {}", root.display());
        Ok(Self {
            root,
            overwrite: false,
            written: 0,
        })
    }

    /// Allow replacing records that already exist. Defaults to `false`.
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// The output directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of records written by this writer.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Path of the metadata file for `video_id`.
    pub fn metadata_path(&self, video_id: &str) -> PathBuf {
        self.root.join(format!("{video_id}.json"))
    }

    /// Path of the payload file for `video_id`.
    pub fn payload_path(&self, video_id: &str) -> PathBuf {
        self.root.join(format!("{video_id}.payload.json"))
    }
}

fn check_video_id(video_id: &str) -> Result<(), EncodeError> {
    let invalid = video_id.is_empty()
        || video_id == "."
        || video_id == ".."
        || video_id.contains(['/', '\\']);
    if invalid {
        return Err(EncodeError::Write {
            video_id: video_id.to_string(),
            reason: "video id is not a valid file name".to_string(),
        });
    }
    Ok(())
}

async fn write_atomically(path: &Path, value: &Value) -> Result<(), EncodeError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let mut temporary = path.as_os_str().to_owned();
    temporary.push(".tmp");
    tokio::fs::write(&temporary, bytes).await?;
    tokio::fs::rename(&temporary, path).await?;
    Ok(())
}

impl RecordWriter for DirectoryWriter {
    async fn write(
        &mut self,
        payload: Option<&Payload>,
        video_id: &str,
        metadata: &VideoRecord,
    ) -> Result<(), EncodeError> {
        check_video_id(video_id)?;

        let metadata_path = self.metadata_path(video_id);
        if !self.overwrite && tokio::fs::try_exists(&metadata_path).await? {
            return Err(EncodeError::Write {
                video_id: video_id.to_string(),
                reason: format!("{} already exists", metadata_path.display()),
            });
        }

        if let Some(payload) = payload {
            write_atomically(&self.payload_path(video_id), &payload.to_json()).await?;
        }
        write_atomically(&metadata_path, &Value::Object(metadata.clone())).await?;

        self.written += 1;
        log::debug!("Wrote record {} to {}", video_id, metadata_path.display());
        Ok(())
    }
}
