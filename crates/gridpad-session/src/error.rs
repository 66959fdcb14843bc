use std::time::Duration;

use gridpad_io::{IngestError, SerializeError};
use gridpad_model::FileKind;
use gridpad_storage::{BlobError, RecordError, ResolveError};
use thiserror::Error;

/// The session-level error taxonomy.
///
/// "No safe decoder" conditions never appear here: they recover into a
/// placeholder document during load. Save failures leave the in-memory edits
/// intact and the session editable, so every variant below is retryable by
/// the user except [`SessionError::Validation`], which is rejected before
/// any mutation occurs.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Ingestion(#[from] IngestError),
    #[error(transparent)]
    Serialization(#[from] SerializeError),
    #[error("storage operation failed: {0}")]
    Storage(#[from] BlobError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error("save exceeded its {budget:?} budget")]
    Timeout { budget: Duration },
    #[error("invalid name: {0}")]
    Validation(String),
    #[error("file is not editable here ({0:?})")]
    NotEditable(FileKind),
    #[error("blob missing for resolved key `{0}`")]
    MissingBlob(String),
}
