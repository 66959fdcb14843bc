//! Best-effort HTML → rich text, plus the sanitizer and tag stripper the
//! tiered document exporter leans on.

use std::sync::LazyLock;

use gridpad_model::{Paragraph, RichDoc, TextRun};
use regex::Regex;
use thiserror::Error;

/// Markup the strict pass refuses to convert silently.
///
/// The tiered exporter catches this, sanitizes, and retries; nothing is
/// dropped without that explicit second pass.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnsafeHtmlError {
    #[error("unterminated tag at byte {0}")]
    UnterminatedTag(usize),
    #[error("markup contains a <{0}> block")]
    UnsafeBlock(&'static str),
    #[error("markup contains an inline event handler attribute")]
    EventHandler,
}

/// Lenient conversion: recovers from anything, used at ingestion time.
pub fn html_to_doc(html: &str) -> RichDoc {
    match convert(html, false) {
        Ok(doc) => doc,
        // Unreachable in lenient mode, but don't panic on it.
        Err(_) => RichDoc::from_plain_text(&strip_tags(html)),
    }
}

/// Strict conversion: refuses script/style blocks, event-handler attributes,
/// and truncated markup. Tier 1 of the document exporter.
pub fn html_to_doc_strict(html: &str) -> Result<RichDoc, UnsafeHtmlError> {
    convert(html, true)
}

static EVENT_HANDLER_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bon[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).expect("static regex")
});
static SCRIPT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>|<script\b[^>]*>.*\z").expect("static regex")
});
static STYLE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>|<style\b[^>]*>.*\z").expect("static regex")
});
static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"));
static BLOCK_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(p|div|br|li|tr|h[1-6]|ul|ol|table|blockquote)\b[^>]*>")
        .expect("static regex")
});
static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->|<!--.*\z").expect("static regex"));

/// Remove script/style blocks and inline event-handler attributes, leaving
/// the rest of the markup intact. Tier 2 of the document exporter.
pub fn sanitize_html(html: &str) -> String {
    let html = COMMENT.replace_all(html, "");
    let html = SCRIPT_BLOCK.replace_all(&html, "");
    let html = STYLE_BLOCK.replace_all(&html, "");
    EVENT_HANDLER_ATTR.replace_all(&html, "").into_owned()
}

/// Remove all markup, keeping block boundaries as blank lines. Tier 3 of the
/// document exporter feeds this through plain-text paragraph splitting.
pub fn strip_tags(html: &str) -> String {
    let html = COMMENT.replace_all(html, "");
    let html = SCRIPT_BLOCK.replace_all(&html, "");
    let html = STYLE_BLOCK.replace_all(&html, "");
    let html = BLOCK_BREAK.replace_all(&html, "\n\n");
    let html = ANY_TAG.replace_all(&html, "");
    decode_entities(&html)
}

struct MarkDepth {
    bold: u32,
    italic: u32,
    underline: u32,
}

fn convert(html: &str, strict: bool) -> Result<RichDoc, UnsafeHtmlError> {
    let bytes = html.as_bytes();
    let mut paragraphs: Vec<Paragraph> = Vec::new();
    let mut runs: Vec<TextRun> = Vec::new();
    let mut text = String::new();
    let mut heading: Option<u8> = None;
    let mut marks = MarkDepth {
        bold: 0,
        italic: 0,
        underline: 0,
    };

    let flush_run = |text: &mut String, runs: &mut Vec<TextRun>, marks: &MarkDepth| {
        if text.is_empty() {
            return;
        }
        runs.push(TextRun {
            text: std::mem::take(text),
            bold: marks.bold > 0,
            italic: marks.italic > 0,
            underline: marks.underline > 0,
        });
    };
    let flush_paragraph = |text: &mut String,
                           runs: &mut Vec<TextRun>,
                           marks: &MarkDepth,
                           heading: &mut Option<u8>,
                           paragraphs: &mut Vec<Paragraph>| {
        flush_run(text, runs, marks);
        let taken = std::mem::take(runs);
        if taken.iter().any(|r| !r.text.trim().is_empty()) {
            paragraphs.push(Paragraph {
                heading: heading.take(),
                runs: taken,
            });
        } else {
            *heading = None;
        }
    };

    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => {
                // Comments end at `-->`, not at the first `>`.
                if html[i..].starts_with("<!--") {
                    match html[i..].find("-->") {
                        Some(end) => {
                            i += end + 3;
                            continue;
                        }
                        None => break,
                    }
                }
                let Some(close) = html[i..].find('>') else {
                    if strict {
                        return Err(UnsafeHtmlError::UnterminatedTag(i));
                    }
                    // Lenient: treat the dangling `<...` as text.
                    push_text(&mut text, &html[i..]);
                    break;
                };
                let tag_body = &html[i + 1..i + close];
                i += close + 1;

                if strict && EVENT_HANDLER_ATTR.is_match(tag_body) {
                    return Err(UnsafeHtmlError::EventHandler);
                }

                let closing = tag_body.starts_with('/');
                let name: String = tag_body
                    .trim_start_matches('/')
                    .chars()
                    .take_while(|c| c.is_ascii_alphanumeric())
                    .collect::<String>()
                    .to_ascii_lowercase();

                match name.as_str() {
                    "script" | "style" if !closing => {
                        if strict {
                            return Err(UnsafeHtmlError::UnsafeBlock(if name == "script" {
                                "script"
                            } else {
                                "style"
                            }));
                        }
                        // Skip the block body entirely.
                        let close_tag = format!("</{name}");
                        let rest = html[i..].to_ascii_lowercase();
                        match rest.find(&close_tag) {
                            Some(pos) => {
                                let after = i + pos;
                                i = match html[after..].find('>') {
                                    Some(gt) => after + gt + 1,
                                    None => html.len(),
                                };
                            }
                            None => break,
                        }
                    }
                    "p" | "div" | "li" | "tr" | "blockquote" => {
                        flush_paragraph(&mut text, &mut runs, &marks, &mut heading, &mut paragraphs);
                    }
                    "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                        flush_paragraph(&mut text, &mut runs, &marks, &mut heading, &mut paragraphs);
                        if !closing {
                            heading = name[1..].parse().ok();
                        }
                    }
                    "br" => {
                        text.push('\n');
                    }
                    "b" | "strong" => {
                        flush_run(&mut text, &mut runs, &marks);
                        adjust(&mut marks.bold, closing);
                    }
                    "i" | "em" => {
                        flush_run(&mut text, &mut runs, &marks);
                        adjust(&mut marks.italic, closing);
                    }
                    "u" => {
                        flush_run(&mut text, &mut runs, &marks);
                        adjust(&mut marks.underline, closing);
                    }
                    _ => {}
                }
            }
            b'&' => {
                let (decoded, consumed) = decode_entity(&html[i..]);
                text.push_str(&decoded);
                i += consumed;
            }
            _ => {
                // Collapse whitespace the way a renderer would.
                let c = html[i..].chars().next().expect("in-bounds char");
                if c.is_whitespace() {
                    if !text.ends_with([' ', '\n']) && !text.is_empty() {
                        text.push(' ');
                    }
                } else {
                    text.push(c);
                }
                i += c.len_utf8();
            }
        }
    }

    flush_paragraph(&mut text, &mut runs, &marks, &mut heading, &mut paragraphs);
    Ok(RichDoc { paragraphs })
}

fn push_text(text: &mut String, chunk: &str) {
    for c in chunk.chars() {
        if c.is_whitespace() {
            if !text.ends_with([' ', '\n']) && !text.is_empty() {
                text.push(' ');
            }
        } else {
            text.push(c);
        }
    }
}

fn adjust(depth: &mut u32, closing: bool) {
    if closing {
        *depth = depth.saturating_sub(1);
    } else {
        *depth += 1;
    }
}

/// Decode one entity at the head of `s`; returns the text and bytes consumed.
fn decode_entity(s: &str) -> (String, usize) {
    let window = &s.as_bytes()[..s.len().min(10)];
    let Some(semi) = window.iter().position(|&b| b == b';') else {
        return ("&".to_string(), 1);
    };
    let entity = &s[1..semi];
    let decoded = match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => entity
            .strip_prefix("#x")
            .or_else(|| entity.strip_prefix("#X"))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
            .and_then(char::from_u32),
    };
    match decoded {
        Some(c) => (c.to_string(), semi + 1),
        None => ("&".to_string(), 1),
    }
}

fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < s.len() {
        if s.as_bytes()[i] == b'&' {
            let (decoded, consumed) = decode_entity(&s[i..]);
            out.push_str(&decoded);
            i += consumed;
        } else {
            let c = s[i..].chars().next().expect("in-bounds char");
            out.push(c);
            i += c.len_utf8();
        }
    }
    out
}
