use std::sync::{Arc, Mutex};

use chrono::Utc;
use gridpad_model::{Color, Selection};
use gridpad_session::{
    EditOutcome, EditSession, FormatChange, LoadedContent, SaveOutcome, SaveState, SessionConfig,
    SessionError,
};
use gridpad_storage::{FileRecord, MemoryBlobStore, MemoryRecordStore};

const CSV: &[u8] = b"Name,City,Zip\nA,B,1\nC,D,2\n";

fn record(id: &str, name: &str, path: &str, kind: &str) -> FileRecord {
    FileRecord {
        id: id.to_string(),
        name: name.to_string(),
        path: path.to_string(),
        kind: kind.to_string(),
        size: 0,
        folder_id: None,
        metadata: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

async fn csv_session() -> (
    EditSession<MemoryBlobStore, MemoryRecordStore>,
    Arc<MemoryBlobStore>,
    Arc<MemoryRecordStore>,
) {
    let blob = Arc::new(MemoryBlobStore::new());
    let records = Arc::new(MemoryRecordStore::new());
    blob.put("files/data.csv", CSV, "text/csv");
    records.insert(record("f1", "data.csv", "files/data.csv", "text/csv"));

    let session = EditSession::load(
        blob.clone(),
        records.clone(),
        "f1",
        SessionConfig::default(),
    )
    .await
    .expect("load session");
    (session, blob, records)
}

fn grid_snapshot(
    session: &EditSession<MemoryBlobStore, MemoryRecordStore>,
) -> (Vec<String>, Vec<Vec<String>>) {
    match session.snapshot() {
        LoadedContent::Spreadsheet { grid, .. } => {
            (grid.header().to_vec(), grid.rows().to_vec())
        }
        other => panic!("expected a spreadsheet, got {other:?}"),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn scenario_a_csv_save_reproduces_header_and_rows() {
    let (session, blob, _records) = csv_session().await;

    let outcome = session.save(true).await.expect("save");
    assert_eq!(outcome, SaveOutcome::Saved);

    let stored = blob.get("files/data.csv").expect("saved blob");
    assert_eq!(stored, CSV);
}

#[tokio::test(flavor = "current_thread")]
async fn scenario_b_removing_the_row_drops_its_metadata() {
    let (session, _blob, _records) = csv_session().await;

    session
        .apply_format(Selection::single(0, 0), FormatChange::ToggleBold)
        .expect("bold");
    session.set_selection(Some(Selection::single(0, 0)));
    assert_eq!(session.remove_rows().expect("remove"), EditOutcome::Applied);

    match session.snapshot() {
        LoadedContent::Spreadsheet { metadata, grid, .. } => {
            assert!(metadata.is_empty(), "dropped, not shifted elsewhere");
            assert_eq!(grid.rows().len(), 1);
            assert_eq!(grid.rows()[0][0], "C");
        }
        other => panic!("expected a spreadsheet, got {other:?}"),
    }
}

#[tokio::test(flavor = "current_thread")]
async fn absolute_attributes_are_idempotent() {
    let (session, _blob, _records) = csv_session().await;
    let range = Selection::new(0, 0, 1, 2);
    let color = FormatChange::FontColor(Color::new_rgb(0x336699));

    session.apply_format(range, color).expect("first");
    let once = match session.snapshot() {
        LoadedContent::Spreadsheet { metadata, .. } => metadata,
        other => panic!("expected a spreadsheet, got {other:?}"),
    };

    session.apply_format(range, color).expect("second");
    let twice = match session.snapshot() {
        LoadedContent::Spreadsheet { metadata, .. } => metadata,
        other => panic!("expected a spreadsheet, got {other:?}"),
    };

    assert_eq!(once, twice);
}

#[tokio::test(flavor = "current_thread")]
async fn toggles_key_off_the_anchor_cell_for_the_whole_selection() {
    let (session, _blob, _records) = csv_session().await;

    // Pre-bold a non-anchor cell: the selection is mixed.
    session
        .apply_format(Selection::single(1, 1), FormatChange::ToggleBold)
        .expect("seed bold");

    // Anchor (0,0) is not bold, so the whole selection turns bold.
    let range = Selection::new(0, 0, 1, 1);
    session
        .apply_format(range, FormatChange::ToggleBold)
        .expect("toggle");

    let metadata = match session.snapshot() {
        LoadedContent::Spreadsheet { metadata, .. } => metadata,
        other => panic!("expected a spreadsheet, got {other:?}"),
    };
    for row in 0..=1 {
        for col in 0..=1 {
            assert_eq!(metadata.get(row, col).bold, Some(true), "({row},{col})");
        }
    }

    // Anchor is now bold: one more toggle turns everything off.
    session
        .apply_format(range, FormatChange::ToggleBold)
        .expect("toggle off");
    let metadata = match session.snapshot() {
        LoadedContent::Spreadsheet { metadata, .. } => metadata,
        other => panic!("expected a spreadsheet, got {other:?}"),
    };
    assert_eq!(metadata.get(1, 1).bold, Some(false));
}

#[tokio::test(flavor = "current_thread")]
async fn alignment_is_mutually_exclusive_by_construction() {
    let (session, _blob, _records) = csv_session().await;
    let cell = Selection::single(0, 0);

    session
        .apply_format(cell, FormatChange::Align(gridpad_model::HorizontalAlignment::Left))
        .expect("left");
    session
        .apply_format(cell, FormatChange::Align(gridpad_model::HorizontalAlignment::Right))
        .expect("right");

    let metadata = match session.snapshot() {
        LoadedContent::Spreadsheet { metadata, .. } => metadata,
        other => panic!("expected a spreadsheet, got {other:?}"),
    };
    assert_eq!(
        metadata.get(0, 0).align,
        Some(gridpad_model::HorizontalAlignment::Right)
    );
}

#[tokio::test(flavor = "current_thread")]
async fn structural_edits_follow_the_selection() {
    let (session, _blob, _records) = csv_session().await;

    // No selection: rows append at the end.
    session.insert_rows(1).expect("append row");
    let (_, rows) = grid_snapshot(&session);
    assert_eq!(rows.len(), 3);
    assert!(rows[2].iter().all(String::is_empty));

    // With a selection: the row lands below it.
    session.set_selection(Some(Selection::single(0, 0)));
    session.insert_rows(1).expect("insert row");
    let (_, rows) = grid_snapshot(&session);
    assert_eq!(rows[0][0], "A");
    assert!(rows[1].iter().all(String::is_empty));
    assert_eq!(rows[2][0], "C");

    // Columns: after the selection.
    session.set_selection(Some(Selection::single(0, 0)));
    session.insert_columns(1).expect("insert column");
    let (header, rows) = grid_snapshot(&session);
    assert_eq!(header.len(), 4);
    assert_eq!(rows[0][0], "A");
    assert_eq!(rows[0][1], "");
    assert_eq!(rows[0][2], "B");
}

#[tokio::test(flavor = "current_thread")]
async fn removal_without_a_selection_is_a_guidance_no_op() {
    let (session, _blob, _records) = csv_session().await;

    assert_eq!(session.remove_rows().expect("call"), EditOutcome::NoSelection);
    assert_eq!(
        session.remove_columns().expect("call"),
        EditOutcome::NoSelection
    );
    assert!(!session.dirty(), "a no-op must not dirty the session");

    let (_, rows) = grid_snapshot(&session);
    assert_eq!(rows.len(), 2);
}

#[tokio::test(flavor = "current_thread")]
async fn csv_with_formatting_saves_as_a_container_under_a_new_name() {
    let (session, blob, records) = csv_session().await;

    session
        .apply_format(Selection::single(0, 0), FormatChange::ToggleBold)
        .expect("bold");
    assert_eq!(session.save(true).await.expect("save"), SaveOutcome::Saved);

    // New key, container payload, synced record.
    let upgraded = blob.get("files/data.xlsx").expect("upgraded blob");
    assert!(upgraded.starts_with(b"PK"));
    assert_eq!(session.file_name(), "data.xlsx");

    let synced = records.get("f1").expect("record");
    assert_eq!(synced.name, "data.xlsx");
    assert_eq!(synced.path, "files/data.xlsx");
    assert!(synced.kind.contains("spreadsheetml"));
    assert_eq!(synced.size as usize, upgraded.len());

    // Later saves stay on the upgraded format and key: no second rename.
    session.set_cell(0, 0, "edited").expect("edit");
    assert_eq!(session.save(true).await.expect("save"), SaveOutcome::Saved);
    assert_eq!(session.file_name(), "data.xlsx");
}

#[tokio::test(flavor = "current_thread")]
async fn rename_validates_before_touching_the_record() {
    let (session, _blob, records) = csv_session().await;

    let err = session.rename("has space.csv").await.expect_err("whitespace");
    assert!(matches!(err, SessionError::Validation(_)));
    let err = session.rename("other.xlsx").await.expect_err("extension");
    assert!(matches!(err, SessionError::Validation(_)));
    assert_eq!(records.get("f1").unwrap().name, "data.csv");

    session.rename("renamed.csv").await.expect("rename");
    assert_eq!(records.get("f1").unwrap().name, "renamed.csv");
    assert_eq!(session.file_name(), "renamed.csv");
}

#[tokio::test(flavor = "current_thread")]
async fn dirty_listener_sees_both_transitions() {
    let (session, _blob, _records) = csv_session().await;
    let seen: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    session.on_dirty_change(move |dirty| sink.lock().unwrap().push(dirty));

    session.set_cell(0, 0, "x").expect("edit");
    session.set_cell(0, 1, "y").expect("edit");
    assert_eq!(*seen.lock().unwrap(), vec![true]);

    session.save(true).await.expect("save");
    assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    assert_eq!(session.save_state(), SaveState::Saved);
}

#[tokio::test(flavor = "current_thread")]
async fn failed_upload_leaves_the_session_editable_with_edits_intact() {
    let (session, blob, _records) = csv_session().await;

    session.set_cell(0, 0, "keep me").expect("edit");
    blob.set_fail_uploads(true);

    let err = session.save(true).await.expect_err("upload fails");
    assert!(matches!(err, SessionError::Storage(_)));
    assert_eq!(session.save_state(), SaveState::Error);
    assert!(session.dirty(), "edits must survive the failure");

    let (_, rows) = grid_snapshot(&session);
    assert_eq!(rows[0][0], "keep me");

    // Retry succeeds once the backend recovers.
    blob.set_fail_uploads(false);
    assert_eq!(session.save(true).await.expect("retry"), SaveOutcome::Saved);
    assert!(!session.dirty());
}

#[tokio::test(flavor = "current_thread")]
async fn placeholder_documents_load_read_only_and_never_save() {
    let blob = Arc::new(MemoryBlobStore::new());
    let records = Arc::new(MemoryRecordStore::new());
    blob.put("files/scan.pdf", b"%PDF-1.7 binary...", "application/pdf");
    records.insert(record("f2", "scan.pdf", "files/scan.pdf", "application/pdf"));

    let session = EditSession::load(blob.clone(), records, "f2", SessionConfig::default())
        .await
        .expect("load");

    match session.snapshot() {
        LoadedContent::Placeholder { html } => {
            assert!(html.contains("scan.pdf"));
        }
        other => panic!("expected a placeholder, got {other:?}"),
    }

    let err = session.set_document_html("<p>nope</p>").expect_err("read-only");
    assert!(matches!(err, SessionError::Validation(_)));
    assert_eq!(session.save(true).await.expect("save"), SaveOutcome::NotDirty);
}

#[tokio::test(flavor = "current_thread")]
async fn folders_and_images_are_not_editable() {
    let blob = Arc::new(MemoryBlobStore::new());
    let records = Arc::new(MemoryRecordStore::new());
    blob.put("files/photo.png", b"\x89PNG\r\n\x1a\n...", "image/png");
    records.insert(record("f3", "photo.png", "files/photo.png", "image/png"));

    let err = EditSession::load(blob, records, "f3", SessionConfig::default())
        .await
        .expect_err("images are not editable");
    assert!(matches!(err, SessionError::NotEditable(_)));
}

#[tokio::test(flavor = "current_thread")]
async fn load_resolves_legacy_keys_through_the_parent_folder() {
    let blob = Arc::new(MemoryBlobStore::new());
    let records = Arc::new(MemoryRecordStore::new());

    // The recorded path is stale; the blob lives under the folder's path.
    blob.put("folders/7/data.csv", CSV, "text/csv");
    let mut file = record("f4", "data.csv", "stale/where", "text/csv");
    file.folder_id = Some("dir7".to_string());
    records.insert(file);
    records.insert(record("dir7", "Documents", "folders/7", "folder"));

    let session = EditSession::load(blob.clone(), records, "f4", SessionConfig::default())
        .await
        .expect("load via parent path");
    let (header, _) = grid_snapshot(&session);
    assert_eq!(header[0], "Name");

    // Saves land on the resolved key, not the stale recorded path.
    session.set_cell(0, 0, "touched").expect("edit");
    session.save(true).await.expect("save");
    assert!(blob.get("folders/7/data.csv").is_some());
    assert!(blob.get("stale/where").is_none());
}
