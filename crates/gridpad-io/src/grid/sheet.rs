use std::collections::BTreeMap;
use std::io::{Cursor, Read};

use gridpad_model::{CellFormat, CellMetadataStore, Color, Grid, HorizontalAlignment};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::ZipArchive;

use super::GridIngestion;
use crate::IngestError;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const STYLES_PART: &str = "xl/styles.xml";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";

/// Decode a zip-container spreadsheet into a grid + cell metadata.
///
/// The first sheet with any content is chosen (falling back to the first
/// sheet). Its first row becomes the header; subsequent rows become data with
/// the row index offset by one. Font, fill, and alignment attributes resolve
/// through the styles part into the metadata store, keyed by
/// `(data-row-index, col-index)`.
pub fn read_sheet_container(bytes: &[u8]) -> Result<GridIngestion, IngestError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let workbook_xml =
        read_part(&mut archive, WORKBOOK_PART)?.ok_or(IngestError::MissingPart(WORKBOOK_PART))?;
    let rels = match read_part(&mut archive, WORKBOOK_RELS_PART)? {
        Some(xml) => parse_relationships(&xml)?,
        None => BTreeMap::new(),
    };
    let sheets = parse_sheet_refs(&workbook_xml)?;
    if sheets.is_empty() {
        return Err(IngestError::MissingPart("worksheet"));
    }

    let shared_strings = match read_part(&mut archive, SHARED_STRINGS_PART)? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };
    // Styles are best-effort: a container with a damaged styles part still
    // yields its cell content, just unformatted.
    let xf_formats = match read_part(&mut archive, STYLES_PART)? {
        Some(xml) => parse_styles(&xml).unwrap_or_else(|e| {
            log::warn!("ignoring unreadable styles part: {e}");
            Vec::new()
        }),
        None => Vec::new(),
    };

    let mut chosen: Option<SheetCells> = None;
    for (index, sheet) in sheets.iter().enumerate() {
        let part = sheet_part_name(sheet, &rels, index);
        let Some(xml) = read_part(&mut archive, &part)? else {
            continue;
        };
        let cells = parse_sheet_cells(&xml, &shared_strings)?;
        let has_content = !cells.rows.is_empty();
        if chosen.is_none() {
            chosen = Some(cells);
        } else if has_content {
            chosen = Some(cells);
        }
        if has_content {
            break;
        }
    }
    let cells = chosen.ok_or(IngestError::MissingPart("worksheet"))?;

    Ok(build_ingestion(cells, &xf_formats))
}

#[derive(Debug)]
struct SheetRef {
    rel_id: Option<String>,
}

/// Sparse cell content straight out of one worksheet part.
#[derive(Debug, Default)]
struct SheetCells {
    /// 1-based sheet row → 0-based column → (value, style index).
    rows: BTreeMap<usize, BTreeMap<usize, (String, Option<usize>)>>,
    max_col: usize,
    /// Highest row element seen, cells or not — trailing empty rows are
    /// still rows.
    max_row: usize,
}

fn build_ingestion(cells: SheetCells, xf_formats: &[CellFormat]) -> GridIngestion {
    if cells.rows.is_empty() {
        return GridIngestion {
            grid: Grid::default_empty(),
            metadata: CellMetadataStore::new(),
        };
    }
    let last_key = cells.rows.keys().next_back().copied().unwrap_or(0);
    let last_row = cells.max_row.max(last_key);
    let width = cells.max_col + 1;

    let mut header = vec![String::new(); width];
    let mut data_rows: Vec<Vec<String>> = Vec::with_capacity(last_row.saturating_sub(1));
    let mut metadata = CellMetadataStore::new();

    for sheet_row in 1..=last_row {
        let row_cells = cells.rows.get(&sheet_row);
        if sheet_row == 1 {
            if let Some(row_cells) = row_cells {
                for (&col, (value, _)) in row_cells {
                    header[col] = value.clone();
                }
            }
            continue;
        }

        let data_index = sheet_row - 2;
        let mut row = vec![String::new(); width];
        if let Some(row_cells) = row_cells {
            for (&col, (value, style)) in row_cells {
                row[col] = value.clone();
                if let Some(format) = style.and_then(|s| xf_formats.get(s)) {
                    if !format.is_empty() {
                        metadata.set(data_index, col, format);
                    }
                }
            }
        }
        data_rows.push(row);
    }

    let grid = Grid::new(header, data_rows);
    metadata.retain_in_bounds(grid.row_count(), grid.column_count());
    GridIngestion { grid, metadata }
}

fn sheet_part_name(sheet: &SheetRef, rels: &BTreeMap<String, String>, index: usize) -> String {
    sheet
        .rel_id
        .as_ref()
        .and_then(|id| rels.get(id))
        .map(|target| resolve_target(target))
        .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", index + 1))
}

/// Relationship targets are relative to `xl/` unless rooted.
fn resolve_target(target: &str) -> String {
    if let Some(rooted) = target.strip_prefix('/') {
        rooted.to_string()
    } else {
        format!("xl/{target}")
    }
}

fn read_part<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<String>, IngestError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut out = String::new();
    file.read_to_string(&mut out)?;
    Ok(Some(out))
}

fn parse_relationships(xml: &str) -> Result<BTreeMap<String, String>, IngestError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut out = BTreeMap::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e)
                if e.local_name().as_ref() == b"Relationship" =>
            {
                if let (Some(id), Some(target)) =
                    (attr_value(&e, b"Id")?, attr_value(&e, b"Target")?)
                {
                    out.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn parse_sheet_refs(xml: &str) -> Result<Vec<SheetRef>, IngestError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut out = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                // The relationship id is namespaced (`r:id`); match on the
                // local name so prefix choices don't matter.
                let mut rel_id = None;
                for attr in e.attributes().with_checks(false) {
                    let attr = attr.map_err(quick_xml::Error::from)?;
                    let key = attr.key.as_ref();
                    if key == b"r:id" || key.ends_with(b":id") || key == b"id" {
                        rel_id = Some(attr.unescape_value()?.into_owned());
                    }
                }
                out.push(SheetRef { rel_id });
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>, IngestError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut items = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"si" => {
                items.push(parse_si(&mut reader)?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(items)
}

/// Concatenate the visible `<t>` runs of one `<si>`, skipping phonetic text.
fn parse_si(reader: &mut Reader<&[u8]>) -> Result<String, IngestError> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.local_name().as_ref() == b"t" => {
                text.push_str(&read_text(reader, b"t")?);
            }
            Event::Start(e) if e.local_name().as_ref() == b"r" => {}
            Event::Start(e) => {
                reader.read_to_end_into(e.name(), &mut Vec::new())?;
            }
            Event::End(e) if e.local_name().as_ref() == b"si" => break,
            Event::Eof => return Err(IngestError::MissingPart("</si>")),
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

fn parse_sheet_cells(xml: &str, shared_strings: &[String]) -> Result<SheetCells, IngestError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut cells = SheetCells::default();

    let mut current_row: usize = 0;
    let mut next_col: usize = 0;
    let mut cell: Option<PendingCell> = None;
    let mut in_value = false;
    let mut in_inline_text = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"row" => {
                current_row = match attr_value(e, b"r")? {
                    Some(r) => r
                        .parse()
                        .map_err(|_| IngestError::InvalidCellRef(r.clone()))?,
                    None => current_row + 1,
                };
                cells.max_row = cells.max_row.max(current_row);
                next_col = 0;
            }
            Event::Empty(ref e) if e.local_name().as_ref() == b"c" => {
                let pending = pending_cell(e, current_row, &mut next_col)?;
                store_cell(&mut cells, pending, shared_strings);
            }
            Event::Start(ref e) if e.local_name().as_ref() == b"c" => {
                cell = Some(pending_cell(e, current_row, &mut next_col)?);
            }
            Event::Start(ref e) if e.local_name().as_ref() == b"v" => in_value = true,
            Event::End(ref e) if e.local_name().as_ref() == b"v" => in_value = false,
            Event::Start(ref e) if e.local_name().as_ref() == b"t" => in_inline_text = true,
            Event::End(ref e) if e.local_name().as_ref() == b"t" => in_inline_text = false,
            Event::Text(ref t) if in_value || in_inline_text => {
                if let Some(cell) = cell.as_mut() {
                    cell.value.push_str(&t.unescape()?);
                }
            }
            Event::End(ref e) if e.local_name().as_ref() == b"c" => {
                if let Some(pending) = cell.take() {
                    store_cell(&mut cells, pending, shared_strings);
                }
                in_value = false;
                in_inline_text = false;
            }
            Event::End(ref e) if e.local_name().as_ref() == b"sheetData" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(cells)
}

#[derive(Debug)]
struct PendingCell {
    row: usize,
    col: usize,
    kind: String,
    style: Option<usize>,
    value: String,
}

fn pending_cell(
    e: &BytesStart<'_>,
    current_row: usize,
    next_col: &mut usize,
) -> Result<PendingCell, IngestError> {
    let (row, col) = match attr_value(e, b"r")? {
        Some(r) => parse_cell_ref(&r)?,
        None => (current_row, *next_col),
    };
    *next_col = col + 1;
    Ok(PendingCell {
        row,
        col,
        kind: attr_value(e, b"t")?.unwrap_or_default(),
        style: attr_value(e, b"s")?.and_then(|s| s.parse().ok()),
        value: String::new(),
    })
}

fn store_cell(cells: &mut SheetCells, pending: PendingCell, shared_strings: &[String]) {
    if pending.row == 0 {
        return;
    }
    let value = match pending.kind.as_str() {
        "s" => pending
            .value
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared_strings.get(i).cloned())
            .unwrap_or_default(),
        "b" => match pending.value.trim() {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            other => other.to_string(),
        },
        _ => pending.value,
    };

    if value.is_empty() && pending.style.is_none() {
        return;
    }
    cells.max_col = cells.max_col.max(pending.col);
    cells.max_row = cells.max_row.max(pending.row);
    cells
        .rows
        .entry(pending.row)
        .or_default()
        .insert(pending.col, (value, pending.style));
}

/// `B12` → (row 12, col 1).
fn parse_cell_ref(cell_ref: &str) -> Result<(usize, usize), IngestError> {
    let letters: String = cell_ref.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits = &cell_ref[letters.len()..];
    if letters.is_empty() || digits.is_empty() {
        return Err(IngestError::InvalidCellRef(cell_ref.to_string()));
    }
    let mut col: usize = 0;
    for c in letters.chars() {
        col = col * 26 + (c.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    let row: usize = digits
        .parse()
        .map_err(|_| IngestError::InvalidCellRef(cell_ref.to_string()))?;
    Ok((row, col - 1))
}

// ---------------------------------------------------------------------------
// Styles
// ---------------------------------------------------------------------------

/// Resolve the styles part into one [`CellFormat`] per cellXf index.
fn parse_styles(xml: &str) -> Result<Vec<CellFormat>, IngestError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut fonts: Vec<CellFormat> = Vec::new();
    let mut fills: Vec<Option<Color>> = Vec::new();
    let mut xfs: Vec<CellFormat> = Vec::new();
    let mut section = Section::None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"fonts" => section = Section::Fonts,
                b"fills" => section = Section::Fills,
                b"cellXfs" => section = Section::CellXfs,
                b"font" if section == Section::Fonts => {
                    fonts.push(parse_font(&mut reader)?);
                }
                b"fill" if section == Section::Fills => {
                    fills.push(parse_fill(&mut reader)?);
                }
                b"xf" if section == Section::CellXfs => {
                    xfs.push(parse_xf(&mut reader, e, &fonts, &fills, false)?);
                }
                _ => {}
            },
            Event::Empty(ref e) => match e.local_name().as_ref() {
                b"font" if section == Section::Fonts => fonts.push(CellFormat::default()),
                b"fill" if section == Section::Fills => fills.push(None),
                b"xf" if section == Section::CellXfs => {
                    xfs.push(parse_xf(&mut reader, e, &fonts, &fills, true)?);
                }
                _ => {}
            },
            Event::End(ref e) => match e.local_name().as_ref() {
                b"fonts" | b"fills" | b"cellXfs" => section = Section::None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(xfs)
}

#[derive(PartialEq)]
enum Section {
    None,
    Fonts,
    Fills,
    CellXfs,
}

/// The font-derived part of a cell format (bold/italic/underline/size/color).
fn parse_font(reader: &mut Reader<&[u8]>) -> Result<CellFormat, IngestError> {
    let mut buf = Vec::new();
    let mut format = CellFormat::default();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                b"b" => format.bold = Some(parse_bool_val(e)?),
                b"i" => format.italic = Some(parse_bool_val(e)?),
                b"u" => {
                    let val = attr_value(e, b"val")?;
                    format.underline = Some(val.as_deref() != Some("none"));
                }
                b"sz" => {
                    if let Some(val) = attr_value(e, b"val")? {
                        if let Ok(size) = val.trim().parse::<f64>() {
                            format.font_size_pt = Some(size.round() as u16);
                        }
                    }
                }
                b"color" => format.font_color = parse_rgb_attr(e)?,
                _ => {}
            },
            Event::End(ref e) if e.local_name().as_ref() == b"font" => break,
            Event::Eof => return Err(IngestError::MissingPart("</font>")),
            _ => {}
        }
        buf.clear();
    }
    Ok(format)
}

/// The solid fill color, if any. Pattern fills other than `solid` carry no
/// editor-visible background.
fn parse_fill(reader: &mut Reader<&[u8]>) -> Result<Option<Color>, IngestError> {
    let mut buf = Vec::new();
    let mut solid = false;
    let mut color = None;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) => match e.local_name().as_ref() {
                b"patternFill" => {
                    solid = attr_value(e, b"patternType")?.as_deref() == Some("solid");
                }
                b"fgColor" if solid => {
                    if color.is_none() {
                        color = parse_rgb_attr(e)?;
                    }
                }
                _ => {}
            },
            Event::End(ref e) if e.local_name().as_ref() == b"fill" => break,
            Event::Eof => return Err(IngestError::MissingPart("</fill>")),
            _ => {}
        }
        buf.clear();
    }
    Ok(color)
}

fn parse_xf(
    reader: &mut Reader<&[u8]>,
    e: &BytesStart<'_>,
    fonts: &[CellFormat],
    fills: &[Option<Color>],
    self_closing: bool,
) -> Result<CellFormat, IngestError> {
    let mut format = CellFormat::default();

    if let Some(font) = attr_value(e, b"fontId")?
        .and_then(|id| id.parse::<usize>().ok())
        .and_then(|id| fonts.get(id))
    {
        format = font.clone();
    }
    if let Some(color) = attr_value(e, b"fillId")?
        .and_then(|id| id.parse::<usize>().ok())
        .and_then(|id| fills.get(id))
    {
        format.background_color = *color;
    }

    if !self_closing {
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref a) | Event::Empty(ref a)
                    if a.local_name().as_ref() == b"alignment" =>
                {
                    format.align = match attr_value(a, b"horizontal")?.as_deref() {
                        Some("left") => Some(HorizontalAlignment::Left),
                        Some("center") => Some(HorizontalAlignment::Center),
                        Some("right") => Some(HorizontalAlignment::Right),
                        _ => None,
                    };
                }
                Event::End(ref a) if a.local_name().as_ref() == b"xf" => break,
                Event::Eof => return Err(IngestError::MissingPart("</xf>")),
                _ => {}
            }
            buf.clear();
        }
    }

    Ok(format)
}

fn parse_bool_val(e: &BytesStart<'_>) -> Result<bool, IngestError> {
    let Some(val) = attr_value(e, b"val")? else {
        return Ok(true);
    };
    Ok(!(val == "0" || val.eq_ignore_ascii_case("false")))
}

/// `rgb="FF1A2B3C"` → the low 24 bits as a color.
fn parse_rgb_attr(e: &BytesStart<'_>) -> Result<Option<Color>, IngestError> {
    let Some(rgb) = attr_value(e, b"rgb")? else {
        return Ok(None);
    };
    if rgb.len() != 8 {
        return Ok(None);
    }
    Ok(u32::from_str_radix(&rgb, 16)
        .ok()
        .map(Color::new_rgb))
}

fn read_text(reader: &mut Reader<&[u8]>, end: &[u8]) -> Result<String, IngestError> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::End(e) if e.local_name().as_ref() == end => break,
            Event::Eof => return Err(IngestError::MissingPart("</t>")),
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, IngestError> {
    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
