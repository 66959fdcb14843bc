//! Serialization: the live grid/document back into bytes.
//!
//! The grid path enforces the format-upgrade policy: CSV output that would
//! silently discard formatting is never produced — the payload upgrades to
//! the spreadsheet container and reports a new file name. The document path
//! is tiered so a save cannot fail outright while any tier remains.

use gridpad_model::{CellMetadataStore, Grid};
use thiserror::Error;

mod csv;
mod doc;
mod sheet;

pub use doc::export_document;

pub const CONTENT_TYPE_CSV: &str = "text/csv";
pub const CONTENT_TYPE_SHEET: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const CONTENT_TYPE_DOC: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Target format tag for a save.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SaveFormat {
    Csv,
    /// Zip-container spreadsheet.
    Sheet,
    /// Zip-container word-processor document.
    Doc,
}

/// One serialized save: bytes, their content type, and — when the pipeline
/// upgraded the format — the file name the payload should be stored under.
#[derive(Clone, Debug)]
pub struct SavePayload {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub new_file_name: Option<String>,
}

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("csv write error: {0}")]
    Csv(#[from] ::csv::Error),
    #[error("document export failed in every tier: {0}")]
    AllTiersFailed(String),
}

/// Serialize the live grid + metadata for the requested target format.
///
/// The grid and header passed in are authoritative — not the snapshot the
/// session originally loaded. Requesting CSV with a non-empty metadata store
/// transparently upgrades the output to the spreadsheet container.
pub fn save_grid(
    grid: &Grid,
    metadata: &CellMetadataStore,
    target: SaveFormat,
    file_name: &str,
) -> Result<SavePayload, SerializeError> {
    match target {
        SaveFormat::Csv if metadata.is_empty() => Ok(SavePayload {
            bytes: csv::write_csv(grid)?,
            content_type: CONTENT_TYPE_CSV,
            new_file_name: None,
        }),
        SaveFormat::Csv => {
            let upgraded = upgraded_name(file_name);
            log::debug!("upgrading {file_name} to {upgraded}: formatting present");
            Ok(SavePayload {
                bytes: sheet::write_sheet_container(grid, metadata)?,
                content_type: CONTENT_TYPE_SHEET,
                new_file_name: Some(upgraded),
            })
        }
        SaveFormat::Sheet => Ok(SavePayload {
            bytes: sheet::write_sheet_container(grid, metadata)?,
            content_type: CONTENT_TYPE_SHEET,
            new_file_name: None,
        }),
        SaveFormat::Doc => Err(SerializeError::AllTiersFailed(
            "grid content cannot serialize as a word-processor document".to_string(),
        )),
    }
}

/// `report.csv` → `report.xlsx` (any old extension is replaced).
fn upgraded_name(file_name: &str) -> String {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    format!("{stem}.xlsx")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridpad_model::CellFormat;

    fn small_grid() -> Grid {
        Grid::new(
            vec!["Name".into(), "Zip".into()],
            vec![vec!["A".into(), "1".into()]],
        )
    }

    #[test]
    fn csv_without_metadata_stays_csv() {
        let payload = save_grid(
            &small_grid(),
            &CellMetadataStore::new(),
            SaveFormat::Csv,
            "data.csv",
        )
        .expect("save");
        assert_eq!(payload.content_type, CONTENT_TYPE_CSV);
        assert!(payload.new_file_name.is_none());
        assert_eq!(payload.bytes, b"Name,Zip\nA,1\n");
    }

    #[test]
    fn csv_with_metadata_upgrades_to_container() {
        let mut metadata = CellMetadataStore::new();
        metadata.set(
            0,
            0,
            &CellFormat {
                bold: Some(true),
                ..Default::default()
            },
        );

        let payload = save_grid(&small_grid(), &metadata, SaveFormat::Csv, "data.csv")
            .expect("save");
        assert_eq!(payload.content_type, CONTENT_TYPE_SHEET);
        assert_eq!(payload.new_file_name.as_deref(), Some("data.xlsx"));
        assert!(payload.bytes.starts_with(b"PK"));
    }

    #[test]
    fn upgraded_name_replaces_any_extension() {
        assert_eq!(upgraded_name("a.csv"), "a.xlsx");
        assert_eq!(upgraded_name("a.b.csv"), "a.b.xlsx");
        assert_eq!(upgraded_name("bare"), "bare.xlsx");
        assert_eq!(upgraded_name(".hidden"), ".hidden.xlsx");
    }
}
