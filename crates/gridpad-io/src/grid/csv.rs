use std::borrow::Cow;

use encoding_rs::WINDOWS_1252;
use gridpad_model::{column_label, Grid};

use super::GridIngestion;
use crate::IngestError;

/// Delimiters tried by auto-detection, in tie-break order.
const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// How many records the delimiter detector samples.
const SAMPLE_RECORDS: usize = 50;

/// Decode a delimited-text upload into a grid.
///
/// - The delimiter is auto-detected over a leading sample.
/// - Empty records are skipped.
/// - Row 1 is the header iff every cell is non-empty text and more than one
///   record exists; otherwise alphabetic labels are synthesized and all
///   records become data.
/// - Data rows that exactly duplicate the header (a common export artifact)
///   are filtered out.
/// - Empty input synthesizes the default 20×5 grid.
pub fn read_csv_grid(bytes: &[u8]) -> Result<GridIngestion, IngestError> {
    let text = decode_text(bytes);
    if text.trim().is_empty() {
        return Ok(GridIngestion {
            grid: Grid::default_empty(),
            metadata: Default::default(),
        });
    }

    let delimiter = detect_delimiter(&text);
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records: Vec<Vec<String>> = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| IngestError::Csv {
            record: index as u64 + 1,
            reason: e.to_string(),
        })?;
        let row: Vec<String> = record.iter().map(str::to_string).collect();
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        records.push(row);
    }

    if records.is_empty() {
        return Ok(GridIngestion {
            grid: Grid::default_empty(),
            metadata: Default::default(),
        });
    }

    let (header, rows) = split_header(records);
    Ok(GridIngestion {
        grid: Grid::new(header, rows),
        metadata: Default::default(),
    })
}

/// UTF-8 with BOM stripping, falling back to Windows-1252 for invalid bytes.
fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF][..]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => {
            let (decoded, _, _) = WINDOWS_1252.decode(bytes);
            decoded
        }
    }
}

/// Pick the delimiter that yields the most consistent multi-field records
/// over a leading sample.
fn detect_delimiter(text: &str) -> u8 {
    let mut best = (b',', 0usize);
    for candidate in DELIMITERS {
        let mut reader = ::csv::ReaderBuilder::new()
            .delimiter(candidate)
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut widths: Vec<usize> = Vec::new();
        for record in reader.records().take(SAMPLE_RECORDS) {
            let Ok(record) = record else { break };
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            widths.push(record.len());
        }

        let Some(&first) = widths.first() else {
            continue;
        };
        if first < 2 {
            continue;
        }
        // Score: records agreeing with the first record's width.
        let score = widths.iter().filter(|&&w| w == first).count();
        if score > best.1 {
            best = (candidate, score);
        }
    }
    best.0
}

/// Apply the header heuristic and drop duplicated-header artifacts.
fn split_header(mut records: Vec<Vec<String>>) -> (Vec<String>, Vec<Vec<String>>) {
    let first_is_header = records.len() > 1
        && records[0]
            .iter()
            .all(|cell| !cell.trim().is_empty() && cell.parse::<f64>().is_err());

    if first_is_header {
        let header = records.remove(0);
        records.retain(|row| row != &header);
        (header, records)
    } else {
        let width = records.iter().map(Vec::len).max().unwrap_or(0);
        let header = (0..width).map(column_label).collect();
        (header, records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn reads_comma_separated_with_header() {
        let ingestion = read_csv_grid(b"Name,City,Zip\nA,B,1\nC,D,2\n").expect("read csv");
        assert_eq!(ingestion.grid.header(), cells(&["Name", "City", "Zip"]));
        assert_eq!(ingestion.grid.rows().len(), 2);
        assert_eq!(ingestion.grid.rows()[1], cells(&["C", "D", "2"]));
        assert!(ingestion.metadata.is_empty());
    }

    #[test]
    fn detects_semicolon_and_tab_delimiters() {
        let semi = read_csv_grid(b"Name;City\nA;B\n").expect("read csv");
        assert_eq!(semi.grid.header(), cells(&["Name", "City"]));

        let tab = read_csv_grid(b"Name\tCity\nA\tB\n").expect("read csv");
        assert_eq!(tab.grid.header(), cells(&["Name", "City"]));
    }

    #[test]
    fn synthesizes_header_when_first_row_is_not_one() {
        // A numeric first cell disqualifies the row as a header.
        let ingestion = read_csv_grid(b"1,2\n3,4\n").expect("read csv");
        assert_eq!(ingestion.grid.header(), cells(&["A", "B"]));
        assert_eq!(ingestion.grid.rows().len(), 2);

        // An empty header cell does too.
        let ingestion = read_csv_grid(b"Name,,Zip\nA,B,1\n").expect("read csv");
        assert_eq!(ingestion.grid.header(), cells(&["A", "B", "C"]));
        assert_eq!(ingestion.grid.rows().len(), 2);
    }

    #[test]
    fn single_record_is_data_not_header() {
        let ingestion = read_csv_grid(b"Name,City\n").expect("read csv");
        assert_eq!(ingestion.grid.header(), cells(&["A", "B"]));
        assert_eq!(ingestion.grid.rows(), [cells(&["Name", "City"])]);
    }

    #[test]
    fn drops_rows_duplicating_the_header() {
        let ingestion =
            read_csv_grid(b"Name,City\nName,City\nA,B\nName,City\n").expect("read csv");
        assert_eq!(ingestion.grid.rows(), [cells(&["A", "B"])]);
    }

    #[test]
    fn skips_empty_records_and_pads_short_ones() {
        let ingestion = read_csv_grid(b"Name,City,Zip\n\nA\n\nC,D\n").expect("read csv");
        assert_eq!(ingestion.grid.rows().len(), 2);
        assert_eq!(ingestion.grid.rows()[0], cells(&["A", "", ""]));
        assert_eq!(ingestion.grid.rows()[1], cells(&["C", "D", ""]));
    }

    #[test]
    fn empty_input_synthesizes_default_grid() {
        let ingestion = read_csv_grid(b"").expect("read csv");
        assert_eq!(ingestion.grid.row_count(), 20);
        assert_eq!(ingestion.grid.column_count(), 5);

        let ingestion = read_csv_grid(b"  \n \n").expect("read csv");
        assert_eq!(ingestion.grid.row_count(), 20);
    }

    #[test]
    fn strips_bom_and_decodes_windows_1252() {
        let ingestion = read_csv_grid(b"\xEF\xBB\xBFName,City\nA,B\n").expect("read csv");
        assert_eq!(ingestion.grid.header()[0], "Name");

        // 0xE9 is "é" in Windows-1252 and invalid UTF-8.
        let ingestion = read_csv_grid(b"Name,City\ncaf\xE9,B\n").expect("read csv");
        assert_eq!(ingestion.grid.rows()[0][0], "café");
    }

    #[test]
    fn quoted_fields_keep_embedded_delimiters() {
        let ingestion = read_csv_grid(b"Name,Notes\nA,\"x, y\"\n").expect("read csv");
        assert_eq!(ingestion.grid.rows()[0][1], "x, y");
    }
}
