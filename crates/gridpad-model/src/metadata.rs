use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::CellFormat;

/// A structural grid mutation, described for metadata reindexing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShiftAction {
    InsertRows,
    RemoveRows,
    InsertColumns,
    RemoveColumns,
}

/// Sparse per-cell formatting, keyed by `(row, col)` data coordinates.
///
/// An absent key means the default format. All structural reindexing goes
/// through [`CellMetadataStore::shift`], the sole mutation path for keys, so
/// a store never references a coordinate outside the grid it belongs to.
///
/// Serialized as a list of `{row, col, ...format}` entries: tuple map keys do
/// not survive JSON, and the host boundary is JSON-shaped.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellMetadataStore {
    cells: HashMap<(usize, usize), CellFormat>,
}

#[derive(Serialize, Deserialize)]
struct CellEntry {
    row: usize,
    col: usize,
    #[serde(flatten)]
    format: CellFormat,
}

impl Serialize for CellMetadataStore {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut entries: Vec<CellEntry> = self
            .cells
            .iter()
            .map(|(&(row, col), format)| CellEntry {
                row,
                col,
                format: format.clone(),
            })
            .collect();
        // Stable output for golden tests and diffable payloads.
        entries.sort_by_key(|e| (e.row, e.col));
        entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CellMetadataStore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = Vec::<CellEntry>::deserialize(deserializer)?;
        let mut store = CellMetadataStore::new();
        for entry in entries {
            store.set(entry.row, entry.col, &entry.format);
        }
        Ok(store)
    }
}

impl CellMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// The stored format, or the default for untouched cells.
    pub fn get(&self, row: usize, col: usize) -> CellFormat {
        self.cells.get(&(row, col)).cloned().unwrap_or_default()
    }

    /// The stored format without materializing a default.
    pub fn stored(&self, row: usize, col: usize) -> Option<&CellFormat> {
        self.cells.get(&(row, col))
    }

    /// Merge `patch` into the cell's format.
    ///
    /// Merging an empty patch into an untouched cell stores nothing.
    pub fn set(&mut self, row: usize, col: usize, patch: &CellFormat) {
        if patch.is_empty() && !self.cells.contains_key(&(row, col)) {
            return;
        }
        self.cells.entry((row, col)).or_default().merge(patch);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(usize, usize), &CellFormat)> {
        self.cells.iter()
    }

    /// Reindex stored keys after a structural grid mutation.
    ///
    /// - Inserting `count` rows at `index` moves keys with `row >= index` down
    ///   by `count`.
    /// - Removing `count` rows at `index` drops keys with
    ///   `row in [index, index + count)` and moves keys with
    ///   `row >= index + count` up by `count`.
    /// - Column actions are symmetric on the column axis.
    ///
    /// Removal after an identical insertion restores the original key set.
    pub fn shift(&mut self, action: ShiftAction, index: usize, count: usize) {
        if count == 0 {
            return;
        }
        let cells = std::mem::take(&mut self.cells);
        self.cells = cells
            .into_iter()
            .filter_map(|((row, col), format)| {
                let key = match action {
                    ShiftAction::InsertRows => (shift_up(row, index, count), col),
                    ShiftAction::RemoveRows => (shift_down(row, index, count)?, col),
                    ShiftAction::InsertColumns => (row, shift_up(col, index, count)),
                    ShiftAction::RemoveColumns => (row, shift_down(col, index, count)?),
                };
                Some((key, format))
            })
            .collect();
    }

    /// Drop any key outside `rows` × `cols`.
    ///
    /// Ingestion uses this after padding so foreign style references from a
    /// malformed container cannot outlive the grid they point into.
    pub fn retain_in_bounds(&mut self, rows: usize, cols: usize) {
        self.cells.retain(|&(row, col), _| row < rows && col < cols);
    }
}

fn shift_up(coord: usize, index: usize, count: usize) -> usize {
    if coord >= index {
        coord + count
    } else {
        coord
    }
}

fn shift_down(coord: usize, index: usize, count: usize) -> Option<usize> {
    if coord < index {
        Some(coord)
    } else if coord < index + count {
        None
    } else {
        Some(coord - count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HorizontalAlignment;

    fn bold() -> CellFormat {
        CellFormat {
            bold: Some(true),
            ..Default::default()
        }
    }

    #[test]
    fn get_returns_default_for_untouched_cells() {
        let store = CellMetadataStore::new();
        assert!(store.get(3, 4).is_empty());
        assert!(store.stored(3, 4).is_none());
    }

    #[test]
    fn set_merges_into_existing_format() {
        let mut store = CellMetadataStore::new();
        store.set(0, 0, &bold());
        store.set(
            0,
            0,
            &CellFormat {
                align: Some(HorizontalAlignment::Center),
                ..Default::default()
            },
        );

        let format = store.get(0, 0);
        assert_eq!(format.bold, Some(true));
        assert_eq!(format.align, Some(HorizontalAlignment::Center));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn set_with_empty_patch_stores_nothing() {
        let mut store = CellMetadataStore::new();
        store.set(5, 5, &CellFormat::default());
        assert!(store.is_empty());
    }

    #[test]
    fn insert_rows_moves_keys_at_or_below_the_insertion_point() {
        let mut store = CellMetadataStore::new();
        store.set(0, 0, &bold());
        store.set(2, 1, &bold());

        store.shift(ShiftAction::InsertRows, 1, 2);

        assert!(store.stored(0, 0).is_some());
        assert!(store.stored(2, 1).is_none());
        assert!(store.stored(4, 1).is_some());
    }

    #[test]
    fn remove_rows_drops_covered_keys_and_shifts_the_rest() {
        let mut store = CellMetadataStore::new();
        store.set(0, 0, &bold());
        store.set(1, 0, &bold());
        store.set(3, 0, &bold());

        store.shift(ShiftAction::RemoveRows, 1, 2);

        assert!(store.stored(0, 0).is_some());
        assert!(store.stored(1, 0).is_some(), "row 3 shifts up to row 1");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn remove_after_insert_restores_the_original_store() {
        let mut store = CellMetadataStore::new();
        store.set(0, 2, &bold());
        store.set(4, 0, &bold());
        store.set(7, 7, &bold());
        let original = store.clone();

        for index in [0, 2, 5, 9] {
            for count in [1, 3] {
                store.shift(ShiftAction::InsertRows, index, count);
                store.shift(ShiftAction::RemoveRows, index, count);
                assert_eq!(store, original, "rows at={index} count={count}");

                store.shift(ShiftAction::InsertColumns, index, count);
                store.shift(ShiftAction::RemoveColumns, index, count);
                assert_eq!(store, original, "columns at={index} count={count}");
            }
        }
    }

    #[test]
    fn column_shifts_leave_rows_alone() {
        let mut store = CellMetadataStore::new();
        store.set(1, 1, &bold());

        store.shift(ShiftAction::InsertColumns, 0, 3);
        assert!(store.stored(1, 4).is_some());

        store.shift(ShiftAction::RemoveColumns, 4, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn serde_round_trips_as_sorted_entries() {
        let mut store = CellMetadataStore::new();
        store.set(2, 0, &bold());
        store.set(0, 1, &bold());

        let json = serde_json::to_string(&store).expect("serialize");
        assert_eq!(
            json,
            r#"[{"row":0,"col":1,"bold":true},{"row":2,"col":0,"bold":true}]"#
        );

        let back: CellMetadataStore = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, store);
    }

    #[test]
    fn retain_in_bounds_drops_foreign_keys() {
        let mut store = CellMetadataStore::new();
        store.set(0, 0, &bold());
        store.set(10, 0, &bold());
        store.set(0, 10, &bold());

        store.retain_in_bounds(5, 5);
        assert_eq!(store.len(), 1);
        assert!(store.stored(0, 0).is_some());
    }
}
