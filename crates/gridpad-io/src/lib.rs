//! Format sniffing, ingestion, and serialization for Gridpad documents.
//!
//! Three pipelines live here:
//! - grid ingestion: CSV and zip-container spreadsheets into a uniform
//!   [`gridpad_model::Grid`] plus sparse cell metadata;
//! - document ingestion: word-processor/text formats into normalized
//!   [`gridpad_model::RichDoc`], degrading to an informational placeholder
//!   where no safe decoder exists;
//! - serialization: the live grid/document back into bytes, with automatic
//!   format upgrade and tiered fallback.
//!
//! Everything operates on in-memory byte slices; fetching and storing those
//! bytes is `gridpad-storage`'s job.

use thiserror::Error;

mod detect;
pub mod doc;
pub mod grid;
pub mod write;

pub use detect::{detect_format, resolve_file_kind, DetectedFormat, SNIFF_LEN};
pub use doc::{convert_document, ConvertedDocument};
pub use grid::{read_csv_grid, read_sheet_container, GridIngestion};
pub use write::{
    export_document, save_grid, SaveFormat, SavePayload, SerializeError, CONTENT_TYPE_CSV,
    CONTENT_TYPE_DOC, CONTENT_TYPE_SHEET,
};

/// Unreadable or corrupt input bytes.
///
/// Ingestion pipelines return this only for structural damage in a format we
/// do decode. "No safe decoder exists" is not an error: those inputs recover
/// into a placeholder document instead.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("csv parse error at record {record}: {reason}")]
    Csv { record: u64, reason: String },
    #[error("missing required part: {0}")]
    MissingPart(&'static str),
    #[error("invalid cell reference: {0}")]
    InvalidCellRef(String),
}
