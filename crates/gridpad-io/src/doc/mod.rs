//! Document ingestion: word-processor and text formats into normalized
//! rich text.
//!
//! Every route lands in one of two places: an editable [`RichDoc`], or the
//! informational placeholder for formats with no safe decoder. "No safe
//! decoder" is a recovered condition here, never an error — corrupt bytes in
//! a format we *do* decode are the only failure mode.

use gridpad_model::RichDoc;

use crate::{DetectedFormat, IngestError};

mod container;
pub mod html;
mod markdown;
mod rtf;

pub use container::read_doc_container;
pub use html::{html_to_doc, html_to_doc_strict, sanitize_html, strip_tags, UnsafeHtmlError};
pub use markdown::markdown_to_doc;
pub use rtf::rtf_to_doc;

/// What document ingestion produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConvertedDocument {
    Editable(RichDoc),
    /// The explicit non-lossy failure mode: an informational document, shown
    /// read-only, explaining what the file is and how to make it editable.
    Placeholder(RichDoc),
}

impl ConvertedDocument {
    pub fn doc(&self) -> &RichDoc {
        match self {
            ConvertedDocument::Editable(doc) | ConvertedDocument::Placeholder(doc) => doc,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ConvertedDocument::Placeholder(_))
    }
}

/// Convert raw bytes into normalized rich text, routed by sniffed format.
pub fn convert_document(
    bytes: &[u8],
    file_name: &str,
    format: DetectedFormat,
) -> Result<ConvertedDocument, IngestError> {
    match format {
        DetectedFormat::ZipContainer => match read_doc_container(bytes)? {
            Some(doc) => Ok(ConvertedDocument::Editable(doc)),
            // An archive without word-processor markers: degrade to decoded
            // text wrapped as a minimal document rather than pretending the
            // bytes were prose-shaped.
            None => Ok(ConvertedDocument::Editable(RichDoc::from_plain_text(
                &String::from_utf8_lossy(bytes),
            ))),
        },
        DetectedFormat::LegacyBinaryDoc => {
            if bytes.starts_with(b"PK") {
                // Some exporters write a modern container under a legacy
                // extension; honor the actual payload.
                return convert_document(bytes, file_name, DetectedFormat::ZipContainer);
            }
            Ok(placeholder(file_name, format))
        }
        DetectedFormat::Html => Ok(ConvertedDocument::Editable(html_to_doc(
            &String::from_utf8_lossy(bytes),
        ))),
        DetectedFormat::Markdown => Ok(ConvertedDocument::Editable(markdown_to_doc(
            &String::from_utf8_lossy(bytes),
        ))),
        DetectedFormat::RichText => Ok(ConvertedDocument::Editable(rtf_to_doc(bytes))),
        DetectedFormat::PlainText | DetectedFormat::Csv => Ok(ConvertedDocument::Editable(
            RichDoc::from_plain_text(&String::from_utf8_lossy(bytes)),
        )),
        DetectedFormat::ProprietaryPackage | DetectedFormat::Pdf | DetectedFormat::Unsupported => {
            Ok(placeholder(file_name, format))
        }
    }
}

fn placeholder(file_name: &str, format: DetectedFormat) -> ConvertedDocument {
    log::debug!("no safe decoder for {file_name} ({format:?}); emitting placeholder");
    ConvertedDocument::Placeholder(RichDoc::placeholder(file_name, format_display_name(format)))
}

fn format_display_name(format: DetectedFormat) -> &'static str {
    match format {
        DetectedFormat::Csv => "delimited text",
        DetectedFormat::ZipContainer => "archive",
        DetectedFormat::LegacyBinaryDoc => "legacy binary word-processor",
        DetectedFormat::Html => "HTML",
        DetectedFormat::PlainText => "plain text",
        DetectedFormat::Markdown => "Markdown",
        DetectedFormat::RichText => "rich text",
        DetectedFormat::ProprietaryPackage => "proprietary package",
        DetectedFormat::Pdf => "PDF",
        DetectedFormat::Unsupported => "unrecognized binary",
    }
}
