use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("file record not found: {0}")]
    NotFound(String),
    #[error("record backend error: {0}")]
    Backend(String),
}

/// The collaborator-owned file record, as the editor core sees it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    /// The logical path as recorded — which, for files predating a path
    /// migration, is not necessarily the blob key. See the resolver.
    pub path: String,
    /// Declared type string (`"text/csv"`, `"folder"`, …).
    pub kind: String,
    pub size: u64,
    /// Record id of the containing folder, when the file is in one.
    pub folder_id: Option<String>,
    /// Collaborator-defined extras; opaque to the editor core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a save is allowed to touch.
#[derive(Clone, Debug, Default)]
pub struct FileRecordPatch {
    pub name: Option<String>,
    pub path: Option<String>,
    pub kind: Option<String>,
    pub size: Option<u64>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// The file-record read/write contract the editor core consumes.
pub trait FileRecordStore: Send + Sync {
    fn read_by_id(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<FileRecord>, RecordError>> + Send;

    fn update(
        &self,
        id: &str,
        patch: FileRecordPatch,
    ) -> impl Future<Output = Result<FileRecord, RecordError>> + Send;

    fn insert_if_missing(
        &self,
        record: FileRecord,
    ) -> impl Future<Output = Result<FileRecord, RecordError>> + Send;
}

/// In-memory [`FileRecordStore`] for tests and local development.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<BTreeMap<String, FileRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: FileRecord) {
        self.records
            .lock()
            .expect("record mutex poisoned")
            .insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &str) -> Option<FileRecord> {
        self.records
            .lock()
            .expect("record mutex poisoned")
            .get(id)
            .cloned()
    }
}

impl FileRecordStore for MemoryRecordStore {
    async fn read_by_id(&self, id: &str) -> Result<Option<FileRecord>, RecordError> {
        Ok(self.get(id))
    }

    async fn update(&self, id: &str, patch: FileRecordPatch) -> Result<FileRecord, RecordError> {
        let mut records = self.records.lock().expect("record mutex poisoned");
        let record = records
            .get_mut(id)
            .ok_or_else(|| RecordError::NotFound(id.to_string()))?;
        if let Some(name) = patch.name {
            record.name = name;
        }
        if let Some(path) = patch.path {
            record.path = path;
        }
        if let Some(kind) = patch.kind {
            record.kind = kind;
        }
        if let Some(size) = patch.size {
            record.size = size;
        }
        if let Some(updated_at) = patch.updated_at {
            record.updated_at = updated_at;
        }
        Ok(record.clone())
    }

    async fn insert_if_missing(&self, record: FileRecord) -> Result<FileRecord, RecordError> {
        let mut records = self.records.lock().expect("record mutex poisoned");
        Ok(records
            .entry(record.id.clone())
            .or_insert(record)
            .clone())
    }
}
