//! RTF → rich text by control-word stripping.
//!
//! Not a full RTF reader: destination groups that hold no document text
//! (font/color tables, stylesheets, metadata, embedded objects) are skipped
//! wholesale, `\par` becomes a paragraph break, and every other control word
//! is dropped. What remains is the document's visible text.

use encoding_rs::WINDOWS_1252;
use gridpad_model::{Paragraph, RichDoc};

/// Groups whose content is never visible document text.
const SKIPPED_DESTINATIONS: [&str; 8] = [
    "fonttbl",
    "colortbl",
    "stylesheet",
    "info",
    "pict",
    "object",
    "header",
    "footer",
];

pub fn rtf_to_doc(bytes: &[u8]) -> RichDoc {
    // RTF is 7-bit ASCII with escapes; a lossy decode only mangles bytes a
    // conforming writer would have escaped anyway.
    let text = String::from_utf8_lossy(bytes);
    let chars: Vec<char> = text.chars().collect();

    let mut out = String::new();
    let mut i = 0;
    // Depth at which a skipped destination group started; text is discarded
    // until the group closes.
    let mut depth: u32 = 0;
    let mut skip_until: Option<u32> = None;
    // Set by `\uN`: the next character is the ANSI fallback and must not be
    // emitted twice.
    let mut pending_unicode_fallback = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' => {
                depth += 1;
                i += 1;
            }
            '}' => {
                if skip_until == Some(depth) {
                    skip_until = None;
                }
                depth = depth.saturating_sub(1);
                i += 1;
            }
            '\\' => {
                i += 1;
                let Some(&next) = chars.get(i) else { break };
                if !next.is_ascii_alphabetic() {
                    i += 1;
                    match next {
                        '\\' | '{' | '}' if skip_until.is_none() => out.push(next),
                        '\'' => {
                            // \'hh — a Windows-1252 byte.
                            let hex: String = chars[i..chars.len().min(i + 2)].iter().collect();
                            i += hex.len();
                            if skip_until.is_none() {
                                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                                    let bytes = [byte];
                                    let (decoded, _, _) = WINDOWS_1252.decode(&bytes);
                                    out.push_str(&decoded);
                                }
                            }
                        }
                        '*' => {
                            // `{\*\dest ...}` — an optional destination we
                            // don't understand; skip the group.
                            if skip_until.is_none() {
                                skip_until = Some(depth);
                            }
                        }
                        '~' if skip_until.is_none() => out.push(' '),
                        _ => {}
                    }
                    continue;
                }

                let word_start = i;
                while i < chars.len() && chars[i].is_ascii_alphabetic() {
                    i += 1;
                }
                let word: String = chars[word_start..i].iter().collect();

                let param_start = i;
                if i < chars.len() && (chars[i] == '-' || chars[i].is_ascii_digit()) {
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let param: Option<i32> = chars[param_start..i]
                    .iter()
                    .collect::<String>()
                    .parse()
                    .ok();
                // A single space after a control word is part of the word.
                if chars.get(i) == Some(&' ') {
                    i += 1;
                }

                if skip_until.is_some() {
                    continue;
                }
                match word.as_str() {
                    "par" | "line" | "sect" | "page" => out.push('\n'),
                    "tab" => out.push('\t'),
                    "emdash" => out.push('—'),
                    "endash" => out.push('–'),
                    "lquote" => out.push('\u{2018}'),
                    "rquote" => out.push('\u{2019}'),
                    "ldblquote" => out.push('\u{201C}'),
                    "rdblquote" => out.push('\u{201D}'),
                    "u" => {
                        if let Some(code) = param {
                            let code = if code < 0 { code + 65536 } else { code } as u32;
                            if let Some(ch) = char::from_u32(code) {
                                out.push(ch);
                            }
                            pending_unicode_fallback = 1;
                        }
                    }
                    w if SKIPPED_DESTINATIONS.contains(&w) => {
                        skip_until = Some(depth);
                    }
                    _ => {}
                }
            }
            '\r' | '\n' => i += 1,
            _ => {
                i += 1;
                if skip_until.is_some() {
                    continue;
                }
                if pending_unicode_fallback > 0 {
                    pending_unicode_fallback -= 1;
                    continue;
                }
                out.push(c);
            }
        }
    }

    let paragraphs: Vec<Paragraph> = out
        .split('\n')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(Paragraph::plain)
        .collect();
    RichDoc { paragraphs }
}
