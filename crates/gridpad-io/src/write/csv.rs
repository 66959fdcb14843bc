use gridpad_model::Grid;

use super::SerializeError;

/// Write the header row followed by every data row.
pub fn write_csv(grid: &Grid) -> Result<Vec<u8>, SerializeError> {
    let mut writer = ::csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(grid.header())?;
    for row in grid.rows() {
        writer.write_record(row)?;
    }
    writer
        .into_inner()
        .map_err(|e| SerializeError::Io(e.into_error()))
}
