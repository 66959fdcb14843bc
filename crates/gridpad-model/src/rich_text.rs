use serde::{Deserialize, Serialize};

/// Normalized rich text: the common shape every document converter targets.
///
/// Deliberately small — paragraphs of styled runs plus optional heading
/// levels. Converters map richer inputs down to this; exporters build their
/// output format back up from it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichDoc {
    pub paragraphs: Vec<Paragraph>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    /// Heading level 1–6; `None` for body text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<u8>,
    pub runs: Vec<TextRun>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub underline: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

impl Paragraph {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            heading: None,
            runs: vec![TextRun::plain(text)],
        }
    }

    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Self {
            heading: Some(level.clamp(1, 6)),
            runs: vec![TextRun::plain(text)],
        }
    }

    pub fn plain_text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

impl RichDoc {
    pub fn is_empty(&self) -> bool {
        self.paragraphs
            .iter()
            .all(|p| p.runs.iter().all(|r| r.text.is_empty()))
    }

    /// Split plain text into paragraphs on blank lines.
    ///
    /// Consecutive non-blank lines within one paragraph are joined with a
    /// single space, matching what a word processor shows for soft-wrapped
    /// text.
    pub fn from_plain_text(text: &str) -> Self {
        let mut paragraphs = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for line in text.lines() {
            if line.trim().is_empty() {
                if !current.is_empty() {
                    paragraphs.push(Paragraph::plain(current.join(" ")));
                    current.clear();
                }
            } else {
                current.push(line.trim_end());
            }
        }
        if !current.is_empty() {
            paragraphs.push(Paragraph::plain(current.join(" ")));
        }

        Self { paragraphs }
    }

    /// The informational document emitted when no safe decoder exists.
    ///
    /// Always the same shape: what the file is, why it cannot be edited here,
    /// and the external conversion steps that make it editable. Explicit and
    /// non-lossy — callers must never substitute a best-guess partial decode.
    pub fn placeholder(file_name: &str, format_name: &str) -> Self {
        Self {
            paragraphs: vec![
                Paragraph::heading(1, file_name),
                Paragraph::plain(format!(
                    "This file is a {format_name} document, which cannot be \
                     edited here safely."
                )),
                Paragraph::plain(
                    "To edit its contents: open the file in an application that \
                     supports this format, export it as a .docx or .csv file, \
                     and upload the exported copy.",
                ),
            ],
        }
    }

    pub fn plain_text(&self) -> String {
        self.paragraphs
            .iter()
            .map(Paragraph::plain_text)
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Render for the host's rich-text editor surface.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for paragraph in &self.paragraphs {
            let tag = match paragraph.heading {
                Some(level) => format!("h{}", level.clamp(1, 6)),
                None => "p".to_string(),
            };
            out.push('<');
            out.push_str(&tag);
            out.push('>');
            for run in &paragraph.runs {
                let mut open = String::new();
                let mut close = String::new();
                if run.bold {
                    open.push_str("<strong>");
                    close.insert_str(0, "</strong>");
                }
                if run.italic {
                    open.push_str("<em>");
                    close.insert_str(0, "</em>");
                }
                if run.underline {
                    open.push_str("<u>");
                    close.insert_str(0, "</u>");
                }
                out.push_str(&open);
                out.push_str(&escape_html(&run.text));
                out.push_str(&close);
            }
            out.push_str("</");
            out.push_str(&tag);
            out.push('>');
            out.push('\n');
        }
        out
    }
}

fn escape_html(text: &str) -> String {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_plain_text_splits_on_blank_lines() {
        let doc = RichDoc::from_plain_text("first line\nsame paragraph\n\n\nsecond\n");
        assert_eq!(doc.paragraphs.len(), 2);
        assert_eq!(doc.paragraphs[0].plain_text(), "first line same paragraph");
        assert_eq!(doc.paragraphs[1].plain_text(), "second");
    }

    #[test]
    fn from_plain_text_of_blank_input_is_empty() {
        assert!(RichDoc::from_plain_text("  \n\n \n").is_empty());
        assert!(RichDoc::from_plain_text("").is_empty());
    }

    #[test]
    fn to_html_nests_marks_and_escapes_text() {
        let doc = RichDoc {
            paragraphs: vec![
                Paragraph::heading(2, "Title"),
                Paragraph {
                    heading: None,
                    runs: vec![
                        TextRun::plain("a < b & "),
                        TextRun {
                            text: "loud".to_string(),
                            bold: true,
                            italic: true,
                            underline: false,
                        },
                    ],
                },
            ],
        };
        assert_eq!(
            doc.to_html(),
            "<h2>Title</h2>\n<p>a &lt; b &amp; <strong><em>loud</em></strong></p>\n"
        );
    }

    #[test]
    fn placeholder_names_the_file_and_the_way_out() {
        let doc = RichDoc::placeholder("report.pages", "Apple Pages");
        assert_eq!(doc.paragraphs[0].heading, Some(1));
        assert_eq!(doc.paragraphs[0].plain_text(), "report.pages");
        let body = doc.plain_text();
        assert!(body.contains("Apple Pages"));
        assert!(body.contains("export it as a .docx"));
    }
}
