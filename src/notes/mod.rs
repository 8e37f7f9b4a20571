//! Markdown notes keyed by word id.
//!
//! Notes are kept in one JSON object mapping word id to record, written
//! atomically on every upsert the same way the server registry is.

use crate::store::{read_json, run_blocking, write_json_atomic, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Debug, Error)]
pub enum NotesError {
    #[error("word_id_required")]
    MissingWordId,

    #[error("notes storage failed: {0}")]
    Storage(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRecord {
    pub word_id: String,
    pub content_md: String,
    pub updated_at: String,
}

impl NoteRecord {
    fn stamped(word_id: &str, content_md: String, at: DateTime<Utc>) -> Self {
        Self {
            word_id: word_id.to_string(),
            content_md,
            updated_at: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[async_trait]
pub trait NotesRepository: Send + Sync {
    async fn get(&self, word_id: &str) -> Result<Option<NoteRecord>, NotesError>;

    /// Creates or replaces the note; the timestamp is always assigned here.
    async fn upsert(&self, word_id: &str, content_md: String) -> Result<NoteRecord, NotesError>;
}

type NoteMap = BTreeMap<String, NoteRecord>;

/// Notes persisted to a single JSON file.
pub struct FileNotes {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileNotes {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }
}

fn checked_id(word_id: &str) -> Result<&str, NotesError> {
    let word_id = word_id.trim();
    if word_id.is_empty() {
        Err(NotesError::MissingWordId)
    } else {
        Ok(word_id)
    }
}

#[async_trait]
impl NotesRepository for FileNotes {
    async fn get(&self, word_id: &str) -> Result<Option<NoteRecord>, NotesError> {
        let word_id = checked_id(word_id)?.to_string();
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let note = run_blocking(move || {
            let mut notes: NoteMap = read_json(&path)?;
            Ok(notes.remove(&word_id))
        })
        .await?;
        Ok(note)
    }

    async fn upsert(&self, word_id: &str, content_md: String) -> Result<NoteRecord, NotesError> {
        let word_id = checked_id(word_id)?;
        let record = NoteRecord::stamped(word_id, content_md, Utc::now());

        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let saved = record.clone();
        run_blocking(move || {
            let mut notes: NoteMap = read_json(&path)?;
            notes.insert(saved.word_id.clone(), saved);
            write_json_atomic(&path, &notes)
        })
        .await?;

        info!(word_id = %record.word_id, "Saved note");
        Ok(record)
    }
}
