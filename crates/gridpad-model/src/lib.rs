//! Core in-memory data model for Gridpad documents.
//!
//! This crate holds the pure data types the rest of the workspace operates
//! on: the tabular [`Grid`], sparse per-cell formatting in a
//! [`CellMetadataStore`], normalized rich text ([`RichDoc`]), and the
//! [`FileKind`] classification resolved once at ingestion time. Nothing here
//! performs I/O; ingestion and persistence live in `gridpad-io` and
//! `gridpad-storage`.

mod file_kind;
mod format;
mod grid;
mod metadata;
mod rich_text;
mod selection;

pub use file_kind::{FileKind, FolderKind};
pub use format::{CellFormat, Color, ColorParseError, HorizontalAlignment};
pub use grid::{column_label, Grid, DEFAULT_COLUMNS, DEFAULT_ROWS};
pub use metadata::{CellMetadataStore, ShiftAction};
pub use rich_text::{Paragraph, RichDoc, TextRun};
pub use selection::Selection;
