//! Grid ingestion: delimited text and zip-container spreadsheets into a
//! uniform grid + metadata pair.

use gridpad_model::{CellMetadataStore, Grid};

mod csv;
mod sheet;

pub use csv::read_csv_grid;
pub use sheet::read_sheet_container;

/// What grid ingestion produces: the grid plus whatever per-cell formatting
/// the source format carried (always empty for CSV).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridIngestion {
    pub grid: Grid,
    pub metadata: CellMetadataStore,
}
