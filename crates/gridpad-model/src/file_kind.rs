use serde::{Deserialize, Serialize};

/// Folder classification carried by [`FileKind::Folder`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderKind {
    /// A folder the user created.
    Regular,
    /// A folder the system provisioned (workspace roots and the like);
    /// not renamable or deletable through the editor surface.
    System,
}

/// What a file record fundamentally is, resolved once at ingestion time.
///
/// Call sites branch on this tag instead of re-deriving the answer from
/// extensions or record type strings.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum FileKind {
    Folder(FolderKind),
    Image,
    Document,
    Spreadsheet,
    Other,
}

impl FileKind {
    pub fn is_folder(&self) -> bool {
        matches!(self, FileKind::Folder(_))
    }

    pub fn is_editable(&self) -> bool {
        matches!(self, FileKind::Document | FileKind::Spreadsheet)
    }
}
