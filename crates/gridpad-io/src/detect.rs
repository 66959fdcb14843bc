//! Format sniffing.
//!
//! Classifies raw bytes + file name + declared content type into a
//! [`DetectedFormat`]. Content signatures always beat names: uploads get
//! mislabeled, extensions get renamed, but magic bytes don't lie.

use gridpad_model::{FileKind, FolderKind};
use serde::{Deserialize, Serialize};

/// How many leading bytes the sniffer looks at.
///
/// Enough for every magic signature plus an HTML preamble with a generous
/// comment block.
pub const SNIFF_LEN: usize = 800;

/// ZIP local-file-header signature (`PK\x03\x04`), plus the empty-archive and
/// spanned-archive variants.
const ZIP_MAGICS: [&[u8]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];

/// OLE2 compound-file signature shared by legacy binary Office documents.
const OLE2_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// The format tag every ingestion pipeline routes on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectedFormat {
    Csv,
    /// A ZIP container: modern spreadsheet/word-processor package, or an
    /// arbitrary archive. Which one is decided by the pipeline that opens it.
    ZipContainer,
    /// OLE2 compound file: legacy binary word/spreadsheet formats.
    LegacyBinaryDoc,
    Html,
    PlainText,
    Markdown,
    /// RTF.
    RichText,
    /// A package format with no safe decoder (Apple iWork and friends).
    ProprietaryPackage,
    Pdf,
    Unsupported,
}

/// Classify a file from its leading bytes, name, and declared content type.
///
/// Only the first [`SNIFF_LEN`] bytes are consulted. Precedence:
/// magic bytes, then decoded-text markers, then extension, then declared
/// type, then a plain-text fallback for anything that decodes as text.
pub fn detect_format(bytes: &[u8], file_name: &str, declared_type: Option<&str>) -> DetectedFormat {
    let head = &bytes[..bytes.len().min(SNIFF_LEN)];

    if ZIP_MAGICS.iter().any(|magic| head.starts_with(magic)) {
        return DetectedFormat::ZipContainer;
    }
    if head.starts_with(&OLE2_MAGIC) {
        return DetectedFormat::LegacyBinaryDoc;
    }
    if head.starts_with(b"%PDF") {
        return DetectedFormat::Pdf;
    }
    if head.starts_with(b"{\\rtf") {
        return DetectedFormat::RichText;
    }

    let text = decoded_head(head);
    if looks_like_html(&text) {
        return DetectedFormat::Html;
    }

    if let Some(format) = format_from_extension(file_name) {
        return format;
    }
    if let Some(format) = format_from_declared_type(declared_type) {
        return format;
    }

    if !bytes.is_empty() && is_probably_text(head) {
        return DetectedFormat::PlainText;
    }
    if bytes.is_empty() {
        // An empty upload is still editable; treat it as text.
        return DetectedFormat::PlainText;
    }

    DetectedFormat::Unsupported
}

/// Resolve the coarse [`FileKind`] for a record, once, at ingestion time.
///
/// The declared record type wins for folders (only the collaborator knows
/// those); everything else keys off the sniffed format with the extension as
/// an image tiebreak.
pub fn resolve_file_kind(
    declared_type: Option<&str>,
    file_name: &str,
    format: DetectedFormat,
) -> FileKind {
    match declared_type {
        Some("folder/system") => return FileKind::Folder(FolderKind::System),
        Some(t) if t == "folder" || t.starts_with("folder/") => {
            return FileKind::Folder(FolderKind::Regular)
        }
        _ => {}
    }

    if declared_type.is_some_and(|t| t.starts_with("image/")) || has_image_extension(file_name) {
        return FileKind::Image;
    }

    match format {
        DetectedFormat::Csv => FileKind::Spreadsheet,
        DetectedFormat::ZipContainer => {
            if has_extension(file_name, &["xlsx", "xlsm", "xls"]) {
                FileKind::Spreadsheet
            } else {
                FileKind::Document
            }
        }
        DetectedFormat::LegacyBinaryDoc
        | DetectedFormat::Html
        | DetectedFormat::PlainText
        | DetectedFormat::Markdown
        | DetectedFormat::RichText
        | DetectedFormat::ProprietaryPackage
        | DetectedFormat::Pdf => FileKind::Document,
        DetectedFormat::Unsupported => FileKind::Other,
    }
}

fn decoded_head(head: &[u8]) -> String {
    // Sniffing may cut a multi-byte sequence in half; a lossy decode of the
    // head is fine for marker matching.
    String::from_utf8_lossy(head).to_lowercase()
}

fn looks_like_html(text: &str) -> bool {
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    trimmed.starts_with("<!doctype html")
        || trimmed.starts_with("<html")
        || text.contains("<html")
        || (text.contains("<body") && text.contains('>'))
        || (text.contains("<head") && text.contains('>'))
}

fn format_from_extension(file_name: &str) -> Option<DetectedFormat> {
    let ext = file_name.rsplit_once('.').map(|(_, ext)| ext)?;
    let ext = ext.to_ascii_lowercase();
    match ext.as_str() {
        "csv" | "tsv" => Some(DetectedFormat::Csv),
        "xlsx" | "xlsm" | "docx" => Some(DetectedFormat::ZipContainer),
        "xls" | "doc" => Some(DetectedFormat::LegacyBinaryDoc),
        "htm" | "html" => Some(DetectedFormat::Html),
        "md" | "markdown" => Some(DetectedFormat::Markdown),
        "rtf" => Some(DetectedFormat::RichText),
        "txt" | "text" | "log" => Some(DetectedFormat::PlainText),
        "pages" | "numbers" | "key" => Some(DetectedFormat::ProprietaryPackage),
        "pdf" => Some(DetectedFormat::Pdf),
        _ => None,
    }
}

fn format_from_declared_type(declared_type: Option<&str>) -> Option<DetectedFormat> {
    // Content types arrive with optional parameters (`text/csv; charset=...`).
    let declared = declared_type?.split(';').next()?.trim().to_ascii_lowercase();
    match declared.as_str() {
        "text/csv" => Some(DetectedFormat::Csv),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        | "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
            Some(DetectedFormat::ZipContainer)
        }
        "application/vnd.ms-excel" | "application/msword" => Some(DetectedFormat::LegacyBinaryDoc),
        "text/html" => Some(DetectedFormat::Html),
        "text/markdown" => Some(DetectedFormat::Markdown),
        "application/rtf" | "text/rtf" => Some(DetectedFormat::RichText),
        "text/plain" => Some(DetectedFormat::PlainText),
        "application/pdf" => Some(DetectedFormat::Pdf),
        _ => None,
    }
}

fn is_probably_text(head: &[u8]) -> bool {
    if std::str::from_utf8(head).is_ok() {
        return !head.contains(&0);
    }
    // Allow legacy single-byte encodings: printable bytes with no NULs.
    !head.contains(&0)
        && head
            .iter()
            .filter(|&&b| b < 0x09 || (0x0E..0x20).contains(&b))
            .count()
            == 0
}

fn has_extension(file_name: &str, exts: &[&str]) -> bool {
    file_name
        .rsplit_once('.')
        .is_some_and(|(_, ext)| exts.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

fn has_image_extension(file_name: &str) -> bool {
    has_extension(
        file_name,
        &["png", "jpg", "jpeg", "gif", "webp", "bmp", "svg", "heic", "tiff"],
    )
}
