use std::io::{Cursor, Write};

use gridpad_model::{Paragraph, RichDoc, TextRun};
use zip::write::FileOptions;

use super::{SavePayload, SerializeError, CONTENT_TYPE_DOC};
use crate::doc::{html_to_doc_strict, sanitize_html, strip_tags};

/// Export the host editor's rich text as a word-processor container.
///
/// Tiered, so malformed markup cannot fail a save outright:
/// 1. strict conversion of the markup as-is;
/// 2. sanitize (drop script/style blocks and event-handler attributes), retry;
/// 3. strip all markup, split paragraphs on blank lines, and build a minimal
///    document from the plain text.
pub fn export_document(html: &str, file_name: &str) -> Result<SavePayload, SerializeError> {
    let doc = match html_to_doc_strict(html) {
        Ok(doc) => doc,
        Err(first) => {
            log::warn!("direct export of {file_name} failed ({first}); sanitizing");
            let sanitized = sanitize_html(html);
            match html_to_doc_strict(&sanitized) {
                Ok(doc) => doc,
                Err(second) => {
                    log::warn!(
                        "sanitized export of {file_name} failed ({second}); using plain text"
                    );
                    let plain = strip_tags(&sanitized);
                    RichDoc::from_plain_text(&plain)
                }
            }
        }
    };

    Ok(SavePayload {
        bytes: write_doc_container(&doc)?,
        content_type: CONTENT_TYPE_DOC,
        new_file_name: None,
    })
}

/// Write a minimal word-processor container: content types, the package
/// relationship, and one document part.
pub fn write_doc_container(doc: &RichDoc) -> Result<Vec<u8>, SerializeError> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buffer);
        let options =
            FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);

        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(CONTENT_TYPES_XML.as_bytes())?;

        zip.start_file("_rels/.rels", options)?;
        zip.write_all(RELS_XML.as_bytes())?;

        zip.start_file("word/document.xml", options)?;
        zip.write_all(document_xml(doc).as_bytes())?;

        zip.finish()?;
    }
    Ok(buffer.into_inner())
}

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
</Types>
"#;

const RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
</Relationships>
"#;

fn document_xml(doc: &RichDoc) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(
        r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
    );
    out.push('\n');
    out.push_str("  <w:body>\n");
    for paragraph in &doc.paragraphs {
        push_paragraph(&mut out, paragraph);
    }
    // A body must hold at least one paragraph to open anywhere.
    if doc.paragraphs.is_empty() {
        out.push_str("    <w:p/>\n");
    }
    out.push_str("  </w:body>\n");
    out.push_str("</w:document>\n");
    out
}

fn push_paragraph(out: &mut String, paragraph: &Paragraph) {
    out.push_str("    <w:p>");
    if let Some(level) = paragraph.heading {
        out.push_str(&format!(
            r#"<w:pPr><w:pStyle w:val="Heading{}"/></w:pPr>"#,
            level.clamp(1, 6)
        ));
    }
    for run in &paragraph.runs {
        push_run(out, run);
    }
    out.push_str("</w:p>\n");
}

fn push_run(out: &mut String, run: &TextRun) {
    out.push_str("<w:r>");
    if run.bold || run.italic || run.underline {
        out.push_str("<w:rPr>");
        if run.bold {
            out.push_str("<w:b/>");
        }
        if run.italic {
            out.push_str("<w:i/>");
        }
        if run.underline {
            out.push_str(r#"<w:u w:val="single"/>"#);
        }
        out.push_str("</w:rPr>");
    }

    // Line breaks inside a run become explicit <w:br/> elements.
    for (index, segment) in run.text.split('\n').enumerate() {
        if index > 0 {
            out.push_str("<w:br/>");
        }
        if segment.is_empty() {
            continue;
        }
        out.push_str("<w:t xml:space=\"preserve\">");
        out.push_str(&escape_xml(segment));
        out.push_str("</w:t>");
    }
    out.push_str("</w:r>");
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}
