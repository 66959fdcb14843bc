//! Storage contracts and key resolution for Gridpad.
//!
//! The editor core never talks to a concrete blob backend or database.
//! It consumes the [`BlobStore`] and [`FileRecordStore`] read/write
//! contracts defined here; hosts wire in real backends, tests wire in the
//! in-memory implementations. The one real algorithm in this crate is the
//! storage-key resolver, which locates a blob whose recorded path predates
//! one or more path-convention migrations.

mod blob;
mod records;
mod resolver;

pub use blob::{BlobEntry, BlobError, BlobStore, MemoryBlobStore};
pub use records::{FileRecord, FileRecordPatch, FileRecordStore, MemoryRecordStore, RecordError};
pub use resolver::{candidate_keys, resolve_key, KeyResolution, ResolveError, ResolveRequest};
