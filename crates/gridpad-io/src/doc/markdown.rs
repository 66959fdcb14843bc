//! Line-based Markdown → rich text.
//!
//! Deliberately small: ATX headers plus bold/italic emphasis, which is what
//! uploaded notes actually use. Anything else passes through as literal text.

use std::sync::LazyLock;

use gridpad_model::{Paragraph, RichDoc, TextRun};
use regex::Regex;

static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*(.+?)\*\*|__(.+?)__|\*([^*]+)\*|_([^_]+)_").expect("static regex")
});

pub fn markdown_to_doc(text: &str) -> RichDoc {
    let mut paragraphs: Vec<Paragraph> = Vec::new();
    let mut pending: Vec<String> = Vec::new();

    let flush = |pending: &mut Vec<String>, paragraphs: &mut Vec<Paragraph>| {
        if pending.is_empty() {
            return;
        }
        let joined = pending.join(" ");
        pending.clear();
        paragraphs.push(Paragraph {
            heading: None,
            runs: parse_inline(&joined),
        });
    };

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            flush(&mut pending, &mut paragraphs);
            continue;
        }

        if let Some((level, rest)) = parse_header(trimmed) {
            flush(&mut pending, &mut paragraphs);
            paragraphs.push(Paragraph {
                heading: Some(level),
                runs: parse_inline(rest),
            });
            continue;
        }

        pending.push(trimmed.to_string());
    }
    flush(&mut pending, &mut paragraphs);

    RichDoc { paragraphs }
}

/// `## Title` → `(2, "Title")`. Seven or more hashes is not a header.
fn parse_header(line: &str) -> Option<(u8, &str)> {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    let rest = rest.strip_prefix(' ')?;
    Some((hashes as u8, rest.trim()))
}

/// Split a line into runs on `**bold**`, `__bold__`, `*italic*`, `_italic_`.
fn parse_inline(text: &str) -> Vec<TextRun> {
    let mut runs = Vec::new();
    let mut last = 0;

    for caps in EMPHASIS.captures_iter(text) {
        let whole = caps.get(0).expect("group 0 always present");
        if whole.start() > last {
            runs.push(TextRun::plain(&text[last..whole.start()]));
        }
        let (inner, bold) = if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
            (m.as_str(), true)
        } else {
            let m = caps
                .get(3)
                .or_else(|| caps.get(4))
                .expect("one emphasis group must match");
            (m.as_str(), false)
        };
        runs.push(TextRun {
            text: inner.to_string(),
            bold,
            italic: !bold,
            underline: false,
        });
        last = whole.end();
    }
    if last < text.len() {
        runs.push(TextRun::plain(&text[last..]));
    }
    if runs.is_empty() {
        runs.push(TextRun::plain(""));
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_map_to_heading_levels() {
        let doc = markdown_to_doc("# Top\n\nbody\n\n### Deep\n");
        assert_eq!(doc.paragraphs[0].heading, Some(1));
        assert_eq!(doc.paragraphs[0].plain_text(), "Top");
        assert_eq!(doc.paragraphs[1].heading, None);
        assert_eq!(doc.paragraphs[2].heading, Some(3));
    }

    #[test]
    fn hashes_without_a_space_are_literal() {
        let doc = markdown_to_doc("#nochannel\n");
        assert_eq!(doc.paragraphs[0].heading, None);
        assert_eq!(doc.paragraphs[0].plain_text(), "#nochannel");
    }

    #[test]
    fn bold_and_italic_substitution() {
        let doc = markdown_to_doc("plain **bold** and *it* or _em_ done\n");
        let runs = &doc.paragraphs[0].runs;
        assert!(runs.iter().any(|r| r.bold && r.text == "bold"));
        assert!(runs.iter().any(|r| r.italic && r.text == "it"));
        assert!(runs.iter().any(|r| r.italic && r.text == "em"));
        assert_eq!(doc.paragraphs[0].plain_text(), "plain bold and it or em done");
    }

    #[test]
    fn consecutive_lines_join_into_one_paragraph() {
        let doc = markdown_to_doc("one\ntwo\n\nthree\n");
        assert_eq!(doc.paragraphs.len(), 2);
        assert_eq!(doc.paragraphs[0].plain_text(), "one two");
    }
}
