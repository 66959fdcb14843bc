use std::io::{Cursor, Read};

use gridpad_model::{Paragraph, RichDoc, TextRun};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::ZipArchive;

use crate::IngestError;

const DOCUMENT_PART: &str = "word/document.xml";

/// Read a zip container as a word-processor document.
///
/// Returns `Ok(None)` when the archive carries no word-processor markers —
/// the caller decides how to degrade. Paragraph text, bold/italic/underline
/// run properties, and heading styles survive; everything else is dropped.
pub fn read_doc_container(bytes: &[u8]) -> Result<Option<RichDoc>, IngestError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut file = match archive.by_name(DOCUMENT_PART) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml)?;
    parse_document_xml(&xml).map(Some)
}

#[derive(Default)]
struct RunProps {
    bold: bool,
    italic: bool,
    underline: bool,
}

fn parse_document_xml(xml: &str) -> Result<RichDoc, IngestError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut paragraphs: Vec<Paragraph> = Vec::new();
    let mut runs: Vec<TextRun> = Vec::new();
    let mut heading: Option<u8> = None;
    let mut props = RunProps::default();
    let mut in_rpr = false;
    let mut in_text = false;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"p" => {
                    runs.clear();
                    heading = None;
                }
                b"r" => {
                    props = RunProps::default();
                    text.clear();
                }
                b"rPr" => in_rpr = true,
                b"t" => in_text = true,
                b"b" if in_rpr => props.bold = bool_prop(e)?,
                b"i" if in_rpr => props.italic = bool_prop(e)?,
                b"u" if in_rpr => props.underline = underline_prop(e)?,
                b"pStyle" => heading = heading_level(e)?,
                _ => {}
            },
            Event::Empty(ref e) => match e.local_name().as_ref() {
                b"b" if in_rpr => props.bold = bool_prop(e)?,
                b"i" if in_rpr => props.italic = bool_prop(e)?,
                b"u" if in_rpr => props.underline = underline_prop(e)?,
                b"pStyle" => heading = heading_level(e)?,
                b"br" => text.push('\n'),
                b"tab" => text.push('\t'),
                _ => {}
            },
            Event::Text(ref t) if in_text => text.push_str(&t.unescape()?),
            Event::End(ref e) => match e.local_name().as_ref() {
                b"rPr" => in_rpr = false,
                b"t" => in_text = false,
                b"r" => {
                    if !text.is_empty() {
                        runs.push(TextRun {
                            text: std::mem::take(&mut text),
                            bold: props.bold,
                            italic: props.italic,
                            underline: props.underline,
                        });
                    }
                }
                b"p" => {
                    if !runs.is_empty() {
                        paragraphs.push(Paragraph {
                            heading,
                            runs: std::mem::take(&mut runs),
                        });
                    }
                    heading = None;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(RichDoc { paragraphs })
}

/// `<w:b/>` is on; `<w:b w:val="0"/>` is off.
fn bool_prop(e: &BytesStart<'_>) -> Result<bool, IngestError> {
    let Some(val) = attr_local(e, b"val")? else {
        return Ok(true);
    };
    Ok(!(val == "0" || val.eq_ignore_ascii_case("false") || val.eq_ignore_ascii_case("none")))
}

fn underline_prop(e: &BytesStart<'_>) -> Result<bool, IngestError> {
    let Some(val) = attr_local(e, b"val")? else {
        return Ok(true);
    };
    Ok(val != "none")
}

/// `Heading1` … `Heading6` paragraph styles map to heading levels.
fn heading_level(e: &BytesStart<'_>) -> Result<Option<u8>, IngestError> {
    let Some(val) = attr_local(e, b"val")? else {
        return Ok(None);
    };
    let Some(digits) = val.strip_prefix("Heading") else {
        return Ok(None);
    };
    Ok(digits.parse::<u8>().ok().filter(|l| (1..=6).contains(l)))
}

/// Match an attribute by local name, ignoring the namespace prefix.
fn attr_local(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, IngestError> {
    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = attr.key.as_ref();
        let local = key.rsplit(|&b| b == b':').next().unwrap_or(key);
        if local == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
