use std::collections::HashMap;
use std::io::{Cursor, Write};

use gridpad_model::{column_label, CellFormat, CellMetadataStore, Color, Grid, HorizontalAlignment};
use zip::write::FileOptions;

use super::SerializeError;

/// Write a minimal spreadsheet container: one worksheet, inline strings, and
/// a styles part interned from the metadata store.
pub fn write_sheet_container(
    grid: &Grid,
    metadata: &CellMetadataStore,
) -> Result<Vec<u8>, SerializeError> {
    let styles = StyleTable::build(metadata);

    let mut buffer = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buffer);
        let options =
            FileOptions::<()>::default().compression_method(zip::CompressionMethod::Deflated);

        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(CONTENT_TYPES_XML.as_bytes())?;

        zip.start_file("_rels/.rels", options)?;
        zip.write_all(RELS_XML.as_bytes())?;

        zip.start_file("xl/workbook.xml", options)?;
        zip.write_all(WORKBOOK_XML.as_bytes())?;

        zip.start_file("xl/_rels/workbook.xml.rels", options)?;
        zip.write_all(WORKBOOK_RELS_XML.as_bytes())?;

        zip.start_file("xl/styles.xml", options)?;
        zip.write_all(styles.styles_xml().as_bytes())?;

        zip.start_file("xl/worksheets/sheet1.xml", options)?;
        zip.write_all(worksheet_xml(grid, &styles).as_bytes())?;

        zip.finish()?;
    }
    Ok(buffer.into_inner())
}

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="xml" ContentType="application/xml"/>
  <Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
  <Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
  <Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
</Types>
"#;

const RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>
"#;

const WORKBOOK_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"
          xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <sheets>
    <sheet name="Sheet1" sheetId="1" r:id="rId1"/>
  </sheets>
</workbook>
"#;

const WORKBOOK_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>
"#;

/// Interned styles: one cellXf per distinct stored format, plus the
/// deduplicated font/fill pools those xfs reference.
struct StyleTable {
    /// xf index 0 is the default; the rest map 1:1 onto `formats`.
    formats: Vec<CellFormat>,
    fonts: Vec<FontSpec>,
    fills: Vec<Color>,
    /// (row, col) → xf index for emission.
    cell_xf: HashMap<(usize, usize), usize>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
struct FontSpec {
    bold: bool,
    italic: bool,
    underline: bool,
    size_pt: Option<u16>,
    color: Option<Color>,
}

impl FontSpec {
    fn of(format: &CellFormat) -> Self {
        Self {
            bold: format.bold == Some(true),
            italic: format.italic == Some(true),
            underline: format.underline == Some(true),
            size_pt: format.font_size_pt,
            color: format.font_color,
        }
    }
}

impl StyleTable {
    fn build(metadata: &CellMetadataStore) -> Self {
        let mut formats: Vec<CellFormat> = Vec::new();
        let mut by_format: HashMap<CellFormat, usize> = HashMap::new();
        let mut cell_xf = HashMap::new();

        // Deterministic xf ordering regardless of map iteration order.
        let mut entries: Vec<(&(usize, usize), &CellFormat)> = metadata.iter().collect();
        entries.sort_by_key(|(&key, _)| key);

        for (&key, format) in entries {
            if format.is_empty() {
                continue;
            }
            let xf = *by_format.entry(format.clone()).or_insert_with(|| {
                formats.push(format.clone());
                formats.len()
            });
            cell_xf.insert(key, xf);
        }

        let mut fonts = vec![FontSpec::default()];
        let mut fills = Vec::new();
        for format in &formats {
            let font = FontSpec::of(format);
            if !fonts.contains(&font) {
                fonts.push(font);
            }
            if let Some(color) = format.background_color {
                if !fills.contains(&color) {
                    fills.push(color);
                }
            }
        }

        Self {
            formats,
            fonts,
            fills,
            cell_xf,
        }
    }

    fn font_id(&self, format: &CellFormat) -> usize {
        let font = FontSpec::of(format);
        self.fonts
            .iter()
            .position(|f| *f == font)
            .expect("font interned at build time")
    }

    /// Fills 0 and 1 are the fixed `none`/`gray125` pair every consumer
    /// expects; custom solid fills start at 2.
    fn fill_id(&self, format: &CellFormat) -> usize {
        match format.background_color {
            Some(color) => {
                2 + self
                    .fills
                    .iter()
                    .position(|&c| c == color)
                    .expect("fill interned at build time")
            }
            None => 0,
        }
    }

    fn xf_for(&self, row: usize, col: usize) -> Option<usize> {
        self.cell_xf.get(&(row, col)).copied()
    }

    fn styles_xml(&self) -> String {
        let mut out = String::new();
        out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        out.push('\n');
        out.push_str(
            r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        );
        out.push('\n');

        out.push_str(&format!(r#"  <fonts count="{}">"#, self.fonts.len()));
        out.push('\n');
        for font in &self.fonts {
            out.push_str("    <font>");
            if font.bold {
                out.push_str("<b/>");
            }
            if font.italic {
                out.push_str("<i/>");
            }
            if font.underline {
                out.push_str("<u/>");
            }
            if let Some(size) = font.size_pt {
                out.push_str(&format!(r#"<sz val="{size}"/>"#));
            }
            if let Some(color) = font.color {
                out.push_str(&format!(r#"<color rgb="FF{:06X}"/>"#, color.rgb));
            }
            out.push_str(r#"<name val="Calibri"/>"#);
            out.push_str("</font>\n");
        }
        out.push_str("  </fonts>\n");

        out.push_str(&format!(r#"  <fills count="{}">"#, self.fills.len() + 2));
        out.push('\n');
        out.push_str("    <fill><patternFill patternType=\"none\"/></fill>\n");
        out.push_str("    <fill><patternFill patternType=\"gray125\"/></fill>\n");
        for color in &self.fills {
            out.push_str(&format!(
                "    <fill><patternFill patternType=\"solid\"><fgColor rgb=\"FF{:06X}\"/><bgColor indexed=\"64\"/></patternFill></fill>\n",
                color.rgb
            ));
        }
        out.push_str("  </fills>\n");

        out.push_str(r#"  <borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders>"#);
        out.push('\n');
        out.push_str(r#"  <cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs>"#);
        out.push('\n');

        out.push_str(&format!(r#"  <cellXfs count="{}">"#, self.formats.len() + 1));
        out.push('\n');
        out.push_str(r#"    <xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>"#);
        out.push('\n');
        for format in &self.formats {
            out.push_str(&format!(
                r#"    <xf numFmtId="0" fontId="{}" fillId="{}" borderId="0" xfId="0" applyFont="1" applyFill="1""#,
                self.font_id(format),
                self.fill_id(format)
            ));
            match format.align {
                Some(align) => {
                    let horizontal = match align {
                        HorizontalAlignment::Left => "left",
                        HorizontalAlignment::Center => "center",
                        HorizontalAlignment::Right => "right",
                    };
                    out.push_str(&format!(
                        " applyAlignment=\"1\"><alignment horizontal=\"{horizontal}\"/></xf>\n"
                    ));
                }
                None => out.push_str("/>\n"),
            }
        }
        out.push_str("  </cellXfs>\n");
        out.push_str(r#"  <cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles>"#);
        out.push('\n');
        out.push_str("</styleSheet>\n");
        out
    }
}

fn worksheet_xml(grid: &Grid, styles: &StyleTable) -> String {
    let mut out = String::new();
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
    out.push('\n');
    out.push_str(r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#);
    out.push('\n');
    out.push_str("  <sheetData>\n");

    // Row 1: the header.
    out.push_str("    <row r=\"1\">");
    for (col, label) in grid.header().iter().enumerate() {
        if !label.is_empty() {
            push_cell(&mut out, 1, col, label, None);
        }
    }
    out.push_str("</row>\n");

    for (index, row) in grid.rows().iter().enumerate() {
        let sheet_row = index + 2;
        out.push_str(&format!("    <row r=\"{sheet_row}\">"));
        for (col, value) in row.iter().enumerate() {
            let xf = styles.xf_for(index, col);
            if value.is_empty() && xf.is_none() {
                continue;
            }
            push_cell(&mut out, sheet_row, col, value, xf);
        }
        out.push_str("</row>\n");
    }

    out.push_str("  </sheetData>\n");
    out.push_str("</worksheet>\n");
    out
}

fn push_cell(out: &mut String, sheet_row: usize, col: usize, value: &str, xf: Option<usize>) {
    let cell_ref = format!("{}{}", column_label(col), sheet_row);
    out.push_str("<c r=\"");
    out.push_str(&cell_ref);
    out.push('"');
    if let Some(xf) = xf {
        out.push_str(&format!(" s=\"{xf}\""));
    }
    if value.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push_str(" t=\"inlineStr\"><is><t");
    if value.starts_with(char::is_whitespace) || value.ends_with(char::is_whitespace) {
        out.push_str(" xml:space=\"preserve\"");
    }
    out.push('>');
    out.push_str(&escape_xml(value));
    out.push_str("</t></is></c>");
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

#[cfg(test)]
mod tests {
    use super::*;

    fn formatted_store() -> CellMetadataStore {
        let mut metadata = CellMetadataStore::new();
        metadata.set(
            0,
            0,
            &CellFormat {
                bold: Some(true),
                background_color: Some(Color::new_rgb(0xFFEE00)),
                ..Default::default()
            },
        );
        metadata.set(
            1,
            1,
            &CellFormat {
                align: Some(HorizontalAlignment::Center),
                ..Default::default()
            },
        );
        metadata
    }

    #[test]
    fn interns_one_xf_per_distinct_format() {
        let mut metadata = formatted_store();
        // Same format as (0,0): must reuse its xf.
        metadata.set(
            5,
            0,
            &CellFormat {
                bold: Some(true),
                background_color: Some(Color::new_rgb(0xFFEE00)),
                ..Default::default()
            },
        );

        let styles = StyleTable::build(&metadata);
        assert_eq!(styles.formats.len(), 2);
        assert_eq!(styles.xf_for(0, 0), styles.xf_for(5, 0));
        assert_ne!(styles.xf_for(0, 0), styles.xf_for(1, 1));
    }

    #[test]
    fn styles_xml_carries_fonts_fills_and_alignment() {
        let styles = StyleTable::build(&formatted_store());
        let xml = styles.styles_xml();
        assert!(xml.contains("<b/>"));
        assert!(xml.contains(r#"<fgColor rgb="FFFFEE00"/>"#));
        assert!(xml.contains(r#"<alignment horizontal="center"/>"#));
    }

    #[test]
    fn worksheet_escapes_text_and_offsets_rows() {
        let grid = Grid::new(
            vec!["A&B".into()],
            vec![vec!["x<y".into()], vec![String::new()]],
        );
        let xml = worksheet_xml(&grid, &StyleTable::build(&CellMetadataStore::new()));
        assert!(xml.contains(r#"<row r="1"><c r="A1" t="inlineStr"><is><t>A&amp;B</t></is></c></row>"#));
        assert!(xml.contains(r#"<row r="2"><c r="A2" t="inlineStr"><is><t>x&lt;y</t></is></c></row>"#));
        assert!(xml.contains(r#"<row r="3"></row>"#));
    }
}
