use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use gridpad_io::{
    convert_document, detect_format, export_document, read_csv_grid, read_sheet_container,
    resolve_file_kind, save_grid, ConvertedDocument, DetectedFormat, IngestError, SaveFormat,
    SavePayload,
};
use gridpad_model::{
    CellFormat, CellMetadataStore, Color, FileKind, Grid, HorizontalAlignment, Selection,
    ShiftAction,
};
use gridpad_storage::{
    resolve_key, BlobStore, FileRecordPatch, FileRecordStore, RecordError, ResolveRequest,
};
use tokio::sync::Notify;

use crate::SessionError;

/// Session-level tuning. The default is the product's 30-second save budget;
/// the autosave inactivity window lives in [`crate::AutoSaveConfig`].
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub save_timeout: Duration,
    /// Historical key layouts handed to the storage-key resolver.
    pub legacy_prefixes: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            save_timeout: Duration::from_secs(30),
            legacy_prefixes: Vec::new(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    Saving,
    Saved,
    Error,
}

/// How a mutating call landed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    /// The operation needs an active selection; surface guidance, mutate
    /// nothing.
    NoSelection,
    OutOfBounds,
}

/// How a save request landed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// Dropped: another save is in flight. Not queued.
    AlreadyInFlight,
    NotDirty,
}

/// A formatting gesture over the current selection.
///
/// Bold/italic/underline are selection-wide toggles keyed off the anchor
/// cell's current state: mixed selections get one decision, not per-cell
/// toggling. Alignment is mutually exclusive by construction (one field).
/// The rest are absolute, idempotent sets.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum FormatChange {
    ToggleBold,
    ToggleItalic,
    ToggleUnderline,
    Align(HorizontalAlignment),
    FontSizePt(u16),
    FontColor(Color),
    BackgroundColor(Color),
}

/// What `load` produced, for the host to render.
#[derive(Clone, Debug)]
pub enum LoadedContent {
    Spreadsheet {
        grid: Grid,
        metadata: CellMetadataStore,
        format: SaveFormat,
    },
    Document {
        html: String,
    },
    /// Read-only informational document; never saved back.
    Placeholder {
        html: String,
    },
}

#[derive(Clone, Debug)]
enum Content {
    Sheet {
        grid: Grid,
        metadata: CellMetadataStore,
    },
    Doc {
        html: String,
        read_only: bool,
    },
}

type DirtyListener = Arc<dyn Fn(bool) + Send + Sync>;

struct SessionState {
    file_id: String,
    file_name: String,
    /// Resolved blob key; updated when a save upgrades the format.
    key: String,
    format: SaveFormat,
    content: Content,
    selection: Option<Selection>,
    dirty: bool,
    save_state: SaveState,
    /// Bumped on every mutation; a save only clears `dirty` if no edit
    /// landed while it was in flight.
    edit_count: u64,
    last_change: Option<tokio::time::Instant>,
    dirty_listener: Option<DirtyListener>,
    autosave_rearm: Option<Arc<Notify>>,
}

/// The single-owner, in-memory context for one open document.
///
/// Cheap to clone — clones share the same state, which is how the autosave
/// task reaches it. Single-flight saving is enforced by the save-state enum,
/// not a lock held across the upload.
pub struct EditSession<B, R> {
    state: Arc<Mutex<SessionState>>,
    blob: Arc<B>,
    records: Arc<R>,
    config: SessionConfig,
}

impl<B, R> std::fmt::Debug for EditSession<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<B, R> Clone for EditSession<B, R> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            blob: self.blob.clone(),
            records: self.records.clone(),
            config: self.config.clone(),
        }
    }
}

impl<B: BlobStore, R: FileRecordStore> EditSession<B, R> {
    /// Resolve, fetch, sniff, and ingest one file into a live session.
    pub async fn load(
        blob: Arc<B>,
        records: Arc<R>,
        file_id: &str,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let record = records
            .read_by_id(file_id)
            .await?
            .ok_or_else(|| RecordError::NotFound(file_id.to_string()))?;

        let parent_path = match &record.folder_id {
            Some(folder_id) => records.read_by_id(folder_id).await?.map(|f| f.path),
            None => None,
        };
        let request = ResolveRequest {
            recorded_path: &record.path,
            file_name: &record.name,
            parent_path: parent_path.as_deref(),
            legacy_prefixes: &config.legacy_prefixes,
        };
        let resolution = resolve_key(blob.as_ref(), &request).await?;
        let bytes = blob
            .download(&resolution.key)
            .await?
            .ok_or_else(|| SessionError::MissingBlob(resolution.key.clone()))?;

        let format = detect_format(&bytes, &record.name, Some(&record.kind));
        let kind = resolve_file_kind(Some(&record.kind), &record.name, format);
        if matches!(kind, FileKind::Folder(_) | FileKind::Image) {
            return Err(SessionError::NotEditable(kind));
        }

        let (content, save_format) = ingest(&bytes, &record.name, format)?;

        let state = SessionState {
            file_id: record.id,
            file_name: record.name,
            key: resolution.key,
            format: save_format,
            content,
            selection: None,
            dirty: false,
            save_state: SaveState::Idle,
            edit_count: 0,
            last_change: None,
            dirty_listener: None,
            autosave_rearm: None,
        };
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            blob,
            records,
            config,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn file_name(&self) -> String {
        self.lock().file_name.clone()
    }

    pub fn dirty(&self) -> bool {
        self.lock().dirty
    }

    pub fn save_state(&self) -> SaveState {
        self.lock().save_state
    }

    /// Monotonic stamp of the most recent mutation.
    pub fn last_change(&self) -> Option<tokio::time::Instant> {
        self.lock().last_change
    }

    pub fn selection(&self) -> Option<Selection> {
        self.lock().selection
    }

    /// Selection changes are navigation, not edits: no dirty marking.
    pub fn set_selection(&self, selection: Option<Selection>) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.selection = match (&state.content, selection) {
            (Content::Sheet { grid, .. }, Some(sel)) => {
                sel.clamped(grid.row_count(), grid.column_count())
            }
            _ => None,
        };
    }

    /// Host-level unsaved-changes prompts hang off this.
    pub fn on_dirty_change(&self, listener: impl Fn(bool) + Send + Sync + 'static) {
        self.lock().dirty_listener = Some(Arc::new(listener));
    }

    pub(crate) fn attach_autosave(&self, rearm: Arc<Notify>) {
        self.lock().autosave_rearm = Some(rearm);
    }

    /// The live content, cloned for rendering.
    pub fn snapshot(&self) -> LoadedContent {
        let state = self.lock();
        match &state.content {
            Content::Sheet { grid, metadata } => LoadedContent::Spreadsheet {
                grid: grid.clone(),
                metadata: metadata.clone(),
                format: state.format,
            },
            Content::Doc { html, read_only } => {
                if *read_only {
                    LoadedContent::Placeholder { html: html.clone() }
                } else {
                    LoadedContent::Document { html: html.clone() }
                }
            }
        }
    }

    pub fn set_cell(
        &self,
        row: usize,
        col: usize,
        value: impl Into<String>,
    ) -> Result<EditOutcome, SessionError> {
        let listener = {
            let mut state = self.lock();
            let Content::Sheet { grid, .. } = &mut state.content else {
                return Err(not_a_spreadsheet());
            };
            if !grid.set_cell(row, col, value) {
                return Ok(EditOutcome::OutOfBounds);
            }
            mark_edit(&mut state)
        };
        notify(listener);
        Ok(EditOutcome::Applied)
    }

    pub fn set_header_cell(
        &self,
        col: usize,
        label: impl Into<String>,
    ) -> Result<EditOutcome, SessionError> {
        let listener = {
            let mut state = self.lock();
            let Content::Sheet { grid, .. } = &mut state.content else {
                return Err(not_a_spreadsheet());
            };
            if !grid.set_header_cell(col, label) {
                return Ok(EditOutcome::OutOfBounds);
            }
            mark_edit(&mut state)
        };
        notify(listener);
        Ok(EditOutcome::Applied)
    }

    /// Apply one formatting gesture to a rectangular range.
    pub fn apply_format(
        &self,
        range: Selection,
        change: FormatChange,
    ) -> Result<EditOutcome, SessionError> {
        let listener = {
            let mut state = self.lock();
            let Content::Sheet { grid, metadata } = &mut state.content else {
                return Err(not_a_spreadsheet());
            };
            let Some(range) = range.clamped(grid.row_count(), grid.column_count()) else {
                return Ok(EditOutcome::OutOfBounds);
            };

            let (anchor_row, anchor_col) = range.anchor();
            let anchor = metadata.get(anchor_row, anchor_col);
            let patch = match change {
                FormatChange::ToggleBold => CellFormat {
                    bold: Some(!anchor.bold.unwrap_or(false)),
                    ..Default::default()
                },
                FormatChange::ToggleItalic => CellFormat {
                    italic: Some(!anchor.italic.unwrap_or(false)),
                    ..Default::default()
                },
                FormatChange::ToggleUnderline => CellFormat {
                    underline: Some(!anchor.underline.unwrap_or(false)),
                    ..Default::default()
                },
                FormatChange::Align(align) => CellFormat {
                    align: Some(align),
                    ..Default::default()
                },
                FormatChange::FontSizePt(size) => CellFormat {
                    font_size_pt: Some(size),
                    ..Default::default()
                },
                FormatChange::FontColor(color) => CellFormat {
                    font_color: Some(color),
                    ..Default::default()
                },
                FormatChange::BackgroundColor(color) => CellFormat {
                    background_color: Some(color),
                    ..Default::default()
                },
            };

            for row in range.rows() {
                for col in range.cols() {
                    metadata.set(row, col, &patch);
                }
            }
            mark_edit(&mut state)
        };
        notify(listener);
        Ok(EditOutcome::Applied)
    }

    /// Insert rows below the selection, or append at the grid end.
    pub fn insert_rows(&self, count: usize) -> Result<EditOutcome, SessionError> {
        let listener = {
            let mut state = self.lock();
            let selection = state.selection;
            let Content::Sheet { grid, metadata } = &mut state.content else {
                return Err(not_a_spreadsheet());
            };
            let at = match selection {
                Some(sel) => sel.end_row + 1,
                None => grid.row_count(),
            };
            grid.insert_rows(at, count);
            metadata.shift(ShiftAction::InsertRows, at, count);
            mark_edit(&mut state)
        };
        notify(listener);
        Ok(EditOutcome::Applied)
    }

    /// Insert columns after the selection, or append at the grid end.
    pub fn insert_columns(&self, count: usize) -> Result<EditOutcome, SessionError> {
        let listener = {
            let mut state = self.lock();
            let selection = state.selection;
            let Content::Sheet { grid, metadata } = &mut state.content else {
                return Err(not_a_spreadsheet());
            };
            let at = match selection {
                Some(sel) => sel.end_col + 1,
                None => grid.column_count(),
            };
            grid.insert_columns(at, count);
            metadata.shift(ShiftAction::InsertColumns, at, count);
            mark_edit(&mut state)
        };
        notify(listener);
        Ok(EditOutcome::Applied)
    }

    /// Remove the selected rows. Without a selection this is a guidance
    /// no-op: nothing mutates.
    pub fn remove_rows(&self) -> Result<EditOutcome, SessionError> {
        let listener = {
            let mut state = self.lock();
            let Some(sel) = state.selection else {
                return Ok(EditOutcome::NoSelection);
            };
            let Content::Sheet { grid, metadata } = &mut state.content else {
                return Err(not_a_spreadsheet());
            };
            let removed = grid.remove_rows(sel.start_row, sel.row_count());
            if removed == 0 {
                return Ok(EditOutcome::OutOfBounds);
            }
            metadata.shift(ShiftAction::RemoveRows, sel.start_row, removed);
            state.selection = None;
            mark_edit(&mut state)
        };
        notify(listener);
        Ok(EditOutcome::Applied)
    }

    /// Remove the selected columns. Without a selection this is a guidance
    /// no-op: nothing mutates.
    pub fn remove_columns(&self) -> Result<EditOutcome, SessionError> {
        let listener = {
            let mut state = self.lock();
            let Some(sel) = state.selection else {
                return Ok(EditOutcome::NoSelection);
            };
            let Content::Sheet { grid, metadata } = &mut state.content else {
                return Err(not_a_spreadsheet());
            };
            let removed = grid.remove_columns(sel.start_col, sel.col_count());
            if removed == 0 {
                return Ok(EditOutcome::OutOfBounds);
            }
            metadata.shift(ShiftAction::RemoveColumns, sel.start_col, removed);
            state.selection = None;
            mark_edit(&mut state)
        };
        notify(listener);
        Ok(EditOutcome::Applied)
    }

    /// Replace the document markup (rich-text sessions only).
    pub fn set_document_html(&self, html: impl Into<String>) -> Result<EditOutcome, SessionError> {
        let listener = {
            let mut state = self.lock();
            let Content::Doc { html: current, read_only } = &mut state.content else {
                return Err(SessionError::Validation(
                    "spreadsheet sessions take cell edits, not markup".to_string(),
                ));
            };
            if *read_only {
                return Err(SessionError::Validation(
                    "placeholder documents are read-only".to_string(),
                ));
            }
            *current = html.into();
            mark_edit(&mut state)
        };
        notify(listener);
        Ok(EditOutcome::Applied)
    }

    /// Rename the file. Validation happens before any mutation: names with
    /// whitespace or a changed extension are rejected outright.
    pub async fn rename(&self, new_name: &str) -> Result<(), SessionError> {
        let current = self.file_name();
        validate_rename(&current, new_name)?;

        let file_id = self.lock().file_id.clone();
        self.records
            .update(
                &file_id,
                FileRecordPatch {
                    name: Some(new_name.to_string()),
                    updated_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
        self.lock().file_name = new_name.to_string();
        Ok(())
    }

    /// Serialize and persist the live content.
    ///
    /// Single-flight: a request while another save is in flight is dropped,
    /// not queued. A save that outlives the configured budget is failed and
    /// the session returns to an editable state with edits intact.
    pub async fn save(&self, manual: bool) -> Result<SaveOutcome, SessionError> {
        let (payload, key, file_id, edit_snapshot) = {
            let mut state = self.lock();
            if state.save_state == SaveState::Saving {
                return Ok(SaveOutcome::AlreadyInFlight);
            }
            if !state.dirty && !manual {
                return Ok(SaveOutcome::NotDirty);
            }
            let payload = match &state.content {
                Content::Sheet { grid, metadata } => {
                    save_grid(grid, metadata, state.format, &state.file_name)?
                }
                Content::Doc { html, read_only } => {
                    if *read_only {
                        return Ok(SaveOutcome::NotDirty);
                    }
                    export_document(html, &state.file_name)?
                }
            };
            state.save_state = SaveState::Saving;
            (
                payload,
                state.key.clone(),
                state.file_id.clone(),
                state.edit_count,
            )
        };

        let result = tokio::time::timeout(
            self.config.save_timeout,
            self.persist(&key, &file_id, &payload),
        )
        .await;

        let mut listener = None;
        let outcome = {
            let mut state = self.lock();
            match result {
                Ok(Ok(upgraded)) => {
                    state.save_state = SaveState::Saved;
                    if let Some((new_key, new_name)) = upgraded {
                        state.key = new_key;
                        state.file_name = new_name;
                        state.format = SaveFormat::Sheet;
                    }
                    if state.edit_count == edit_snapshot && state.dirty {
                        state.dirty = false;
                        listener = state.dirty_listener.clone().map(|l| (l, false));
                    }
                    Ok(SaveOutcome::Saved)
                }
                Ok(Err(e)) => {
                    state.save_state = SaveState::Error;
                    Err(e)
                }
                Err(_elapsed) => {
                    state.save_state = SaveState::Error;
                    Err(SessionError::Timeout {
                        budget: self.config.save_timeout,
                    })
                }
            }
        };
        if let Some((listener, value)) = listener {
            listener(value);
        }
        outcome
    }

    /// Upload the payload and sync the file record. Returns the new
    /// `(key, name)` pair when the pipeline upgraded the format.
    async fn persist(
        &self,
        key: &str,
        file_id: &str,
        payload: &SavePayload,
    ) -> Result<Option<(String, String)>, SessionError> {
        match &payload.new_file_name {
            Some(new_name) => {
                let new_key = replace_file_name(key, new_name);
                self.blob
                    .upload(&new_key, &payload.bytes, payload.content_type, true)
                    .await?;
                self.records
                    .update(
                        file_id,
                        FileRecordPatch {
                            name: Some(new_name.clone()),
                            path: Some(new_key.clone()),
                            kind: Some(payload.content_type.to_string()),
                            size: Some(payload.bytes.len() as u64),
                            updated_at: Some(Utc::now()),
                        },
                    )
                    .await?;
                Ok(Some((new_key, new_name.clone())))
            }
            None => {
                self.blob
                    .upload(key, &payload.bytes, payload.content_type, true)
                    .await?;
                self.records
                    .update(
                        file_id,
                        FileRecordPatch {
                            size: Some(payload.bytes.len() as u64),
                            updated_at: Some(Utc::now()),
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok(None)
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().expect("session mutex poisoned")
    }
}

fn ingest(
    bytes: &[u8],
    file_name: &str,
    format: DetectedFormat,
) -> Result<(Content, SaveFormat), SessionError> {
    match format {
        DetectedFormat::Csv => {
            let ingestion = read_csv_grid(bytes)?;
            Ok((
                Content::Sheet {
                    grid: ingestion.grid,
                    metadata: ingestion.metadata,
                },
                SaveFormat::Csv,
            ))
        }
        DetectedFormat::ZipContainer => match read_sheet_container(bytes) {
            Ok(ingestion) => Ok((
                Content::Sheet {
                    grid: ingestion.grid,
                    metadata: ingestion.metadata,
                },
                SaveFormat::Sheet,
            )),
            // Not a spreadsheet package; fall through to the document path.
            Err(IngestError::MissingPart("xl/workbook.xml")) => {
                Ok(doc_content(convert_document(bytes, file_name, format)?))
            }
            Err(e) => Err(e.into()),
        },
        other => Ok(doc_content(convert_document(bytes, file_name, other)?)),
    }
}

fn doc_content(converted: ConvertedDocument) -> (Content, SaveFormat) {
    let read_only = converted.is_placeholder();
    (
        Content::Doc {
            html: converted.doc().to_html(),
            read_only,
        },
        SaveFormat::Doc,
    )
}

/// Mark the session dirty, stamp the change, and rearm the autosave timer.
/// Returns the listener to invoke once the state lock is released.
fn mark_edit(state: &mut SessionState) -> Option<(DirtyListener, bool)> {
    state.edit_count += 1;
    state.last_change = Some(tokio::time::Instant::now());
    if matches!(state.save_state, SaveState::Saved | SaveState::Error) {
        state.save_state = SaveState::Idle;
    }
    if let Some(rearm) = &state.autosave_rearm {
        rearm.notify_one();
    }
    if !state.dirty {
        state.dirty = true;
        return state.dirty_listener.clone().map(|l| (l, true));
    }
    None
}

fn notify(listener: Option<(DirtyListener, bool)>) {
    if let Some((listener, value)) = listener {
        listener(value);
    }
}

fn not_a_spreadsheet() -> SessionError {
    SessionError::Validation("operation requires a spreadsheet session".to_string())
}

fn validate_rename(current: &str, new_name: &str) -> Result<(), SessionError> {
    if new_name.is_empty() {
        return Err(SessionError::Validation("name cannot be empty".to_string()));
    }
    if new_name.chars().any(char::is_whitespace) {
        return Err(SessionError::Validation(
            "name cannot contain whitespace".to_string(),
        ));
    }
    let old_ext = extension(current);
    let new_ext = extension(new_name);
    if !old_ext.eq_ignore_ascii_case(&new_ext) {
        return Err(SessionError::Validation(format!(
            "extension cannot change (`{old_ext}` to `{new_ext}`)"
        )));
    }
    Ok(())
}

fn extension(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// `jobs/12/a.csv` + `a.xlsx` → `jobs/12/a.xlsx`.
fn replace_file_name(key: &str, new_name: &str) -> String {
    match key.rsplit_once('/') {
        Some((parent, _)) => format!("{parent}/{new_name}"),
        None => new_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_validation_rejects_before_any_mutation() {
        assert!(validate_rename("a.csv", "b.csv").is_ok());
        assert!(validate_rename("a.csv", "B-2.CSV").is_ok());
        assert!(validate_rename("a.csv", "b c.csv").is_err());
        assert!(validate_rename("a.csv", "b.xlsx").is_err());
        assert!(validate_rename("a.csv", "").is_err());
        assert!(validate_rename("noext", "stillnoext").is_ok());
        assert!(validate_rename("noext", "now.csv").is_err());
    }

    #[test]
    fn replace_file_name_keeps_the_parent() {
        assert_eq!(replace_file_name("jobs/12/a.csv", "a.xlsx"), "jobs/12/a.xlsx");
        assert_eq!(replace_file_name("a.csv", "a.xlsx"), "a.xlsx");
    }
}
