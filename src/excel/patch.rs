//! In-place patching of a worksheet inside the template archive.
//!
//! The workbook is never rebuilt: every archive entry is copied through
//! unchanged except the one worksheet being filled, which is rewritten
//! event-by-event. Macros, formulas, styles and layout therefore survive
//! byte-identical. Patched cells become inline strings so the shared
//! string table does not need to be touched.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Seek, Write};

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader as XmlReader, Writer as XmlWriter};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use super::cell::CellRef;

fn xml_err<E: std::fmt::Display>(err: E) -> String {
    format!("worksheet xml error: {err}")
}

pub(crate) fn attr_value(e: &BytesStart, key: &[u8]) -> Option<String> {
    for a in e.attributes().with_checks(false).flatten() {
        if a.key.as_ref() == key {
            return a.unescape_value().ok().map(|v| v.into_owned());
        }
    }
    None
}

pub(crate) fn read_entry<R: Read + Seek>(
    zip: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, String> {
    let mut file = zip
        .by_name(name)
        .map_err(|err| format!("missing archive entry '{name}': {err}"))?;
    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .map_err(|err| format!("unreadable archive entry '{name}': {err}"))?;
    Ok(xml)
}

fn emit_cell(writer: &mut XmlWriter<Vec<u8>>, cell: CellRef, value: &str) -> Result<(), String> {
    let reference = cell.to_a1();
    let mut c = BytesStart::new("c");
    c.push_attribute(("r", reference.as_str()));
    c.push_attribute(("t", "inlineStr"));
    writer.write_event(Event::Start(c)).map_err(xml_err)?;
    emit_inline_text(writer, value)?;
    writer
        .write_event(Event::End(BytesEnd::new("c")))
        .map_err(xml_err)
}

fn emit_inline_text(writer: &mut XmlWriter<Vec<u8>>, value: &str) -> Result<(), String> {
    writer
        .write_event(Event::Start(BytesStart::new("is")))
        .map_err(xml_err)?;
    let mut t = BytesStart::new("t");
    t.push_attribute(("xml:space", "preserve"));
    writer.write_event(Event::Start(t)).map_err(xml_err)?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("t")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("is")))
        .map_err(xml_err)
}

/// Rewrites an existing `<c>` element as an inline string, keeping every
/// attribute (style in particular) except the value type.
fn rewrite_cell(writer: &mut XmlWriter<Vec<u8>>, original: &BytesStart, value: &str) -> Result<(), String> {
    let mut c = BytesStart::new("c");
    for a in original.attributes().with_checks(false) {
        let a = a.map_err(|err| format!("cell attribute error: {err}"))?;
        if a.key.as_ref() == b"t" {
            continue;
        }
        let key = std::str::from_utf8(a.key.as_ref()).unwrap_or("");
        let val = a
            .unescape_value()
            .map_err(|err| format!("cell attribute error: {err}"))?
            .into_owned();
        if !key.is_empty() {
            c.push_attribute((key, val.as_str()));
        }
    }
    c.push_attribute(("t", "inlineStr"));
    writer.write_event(Event::Start(c)).map_err(xml_err)?;
    emit_inline_text(writer, value)?;
    writer
        .write_event(Event::End(BytesEnd::new("c")))
        .map_err(xml_err)
}

/// Drops the original content of a rewritten cell.
fn skip_cell_children(reader: &mut XmlReader<&[u8]>) -> Result<(), String> {
    let mut buf: Vec<u8> = Vec::new();
    let mut depth: usize = 0;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::End(e)) => {
                if depth == 0 && e.name().as_ref() == b"c" {
                    return Ok(());
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => return Err("unexpected end of worksheet inside a cell".to_string()),
            Err(err) => return Err(format!("worksheet parse error: {err}")),
            _ => {}
        }
        buf.clear();
    }
}

fn emit_row(
    writer: &mut XmlWriter<Vec<u8>>,
    number: u32,
    cells: &BTreeMap<u32, String>,
) -> Result<(), String> {
    let mut row = BytesStart::new("row");
    let reference = number.to_string();
    row.push_attribute(("r", reference.as_str()));
    writer.write_event(Event::Start(row)).map_err(xml_err)?;
    for (col, value) in cells {
        emit_cell(writer, CellRef::new(number, *col), value)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("row")))
        .map_err(xml_err)
}

fn flush_rows_before(
    writer: &mut XmlWriter<Vec<u8>>,
    pending: &mut BTreeMap<u32, BTreeMap<u32, String>>,
    limit: Option<u32>,
) -> Result<(), String> {
    let numbers: Vec<u32> = match limit {
        Some(limit) => pending.range(..limit).map(|(n, _)| *n).collect(),
        None => pending.keys().copied().collect(),
    };
    for number in numbers {
        let cells = pending.remove(&number).unwrap();
        emit_row(writer, number, &cells)?;
    }
    Ok(())
}

/// Applies `writes` to a worksheet XML document. Rows and cells the
/// template does not carry are inserted at their ordered position;
/// existing cells are converted to inline strings in place.
pub fn patch_sheet_xml(xml: &str, writes: &BTreeMap<CellRef, String>) -> Result<String, String> {
    let mut pending: BTreeMap<u32, BTreeMap<u32, String>> = BTreeMap::new();
    for (cell, value) in writes {
        pending
            .entry(cell.row)
            .or_default()
            .insert(cell.col, value.clone());
    }

    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut writer = XmlWriter::new(Vec::new());
    let mut buf: Vec<u8> = Vec::new();

    let mut in_sheet_data = false;
    // (row number, writes still to place) for the currently open <row>.
    let mut open_row: Option<(u32, BTreeMap<u32, String>)> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"sheetData" => {
                in_sheet_data = true;
                writer
                    .write_event(Event::Start(e.into_owned()))
                    .map_err(xml_err)?;
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"sheetData" => {
                writer
                    .write_event(Event::Start(e.into_owned()))
                    .map_err(xml_err)?;
                flush_rows_before(&mut writer, &mut pending, None)?;
                writer
                    .write_event(Event::End(BytesEnd::new("sheetData")))
                    .map_err(xml_err)?;
            }
            Ok(Event::End(e)) if in_sheet_data && e.name().as_ref() == b"sheetData" => {
                flush_rows_before(&mut writer, &mut pending, None)?;
                in_sheet_data = false;
                writer
                    .write_event(Event::End(e.into_owned()))
                    .map_err(xml_err)?;
            }
            Ok(Event::Start(e)) if in_sheet_data && e.name().as_ref() == b"row" => {
                let number = attr_value(&e, b"r")
                    .and_then(|r| r.parse::<u32>().ok())
                    .ok_or_else(|| "row without a number".to_string())?;
                flush_rows_before(&mut writer, &mut pending, Some(number))?;
                open_row = pending.remove(&number).map(|cells| (number, cells));
                writer
                    .write_event(Event::Start(e.into_owned()))
                    .map_err(xml_err)?;
            }
            Ok(Event::Empty(e)) if in_sheet_data && e.name().as_ref() == b"row" => {
                let number = attr_value(&e, b"r")
                    .and_then(|r| r.parse::<u32>().ok())
                    .ok_or_else(|| "row without a number".to_string())?;
                flush_rows_before(&mut writer, &mut pending, Some(number))?;
                match pending.remove(&number) {
                    Some(cells) => {
                        writer
                            .write_event(Event::Start(e.into_owned()))
                            .map_err(xml_err)?;
                        for (col, value) in &cells {
                            emit_cell(&mut writer, CellRef::new(number, *col), value)?;
                        }
                        writer
                            .write_event(Event::End(BytesEnd::new("row")))
                            .map_err(xml_err)?;
                    }
                    None => writer
                        .write_event(Event::Empty(e.into_owned()))
                        .map_err(xml_err)?,
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"row" => {
                if let Some((number, cells)) = open_row.take() {
                    for (col, value) in &cells {
                        emit_cell(&mut writer, CellRef::new(number, *col), value)?;
                    }
                }
                writer
                    .write_event(Event::End(e.into_owned()))
                    .map_err(xml_err)?;
            }
            Ok(Event::Start(e)) if open_row.is_some() && e.name().as_ref() == b"c" => {
                let reference = attr_value(&e, b"r")
                    .and_then(|r| CellRef::parse(&r))
                    .ok_or_else(|| "cell without a reference".to_string())?;
                let (number, cells) = open_row.as_mut().unwrap();
                let before: Vec<u32> = cells.range(..reference.col).map(|(c, _)| *c).collect();
                for col in before {
                    let value = cells.remove(&col).unwrap();
                    emit_cell(&mut writer, CellRef::new(*number, col), &value)?;
                }
                match cells.remove(&reference.col) {
                    Some(value) => {
                        rewrite_cell(&mut writer, &e, &value)?;
                        skip_cell_children(&mut reader)?;
                    }
                    None => writer
                        .write_event(Event::Start(e.into_owned()))
                        .map_err(xml_err)?,
                }
            }
            Ok(Event::Empty(e)) if open_row.is_some() && e.name().as_ref() == b"c" => {
                let reference = attr_value(&e, b"r")
                    .and_then(|r| CellRef::parse(&r))
                    .ok_or_else(|| "cell without a reference".to_string())?;
                let (number, cells) = open_row.as_mut().unwrap();
                let before: Vec<u32> = cells.range(..reference.col).map(|(c, _)| *c).collect();
                for col in before {
                    let value = cells.remove(&col).unwrap();
                    emit_cell(&mut writer, CellRef::new(*number, col), &value)?;
                }
                match cells.remove(&reference.col) {
                    Some(value) => rewrite_cell(&mut writer, &e, &value)?,
                    None => writer
                        .write_event(Event::Empty(e.into_owned()))
                        .map_err(xml_err)?,
                }
            }
            Ok(Event::Start(e)) => writer
                .write_event(Event::Start(e.into_owned()))
                .map_err(xml_err)?,
            Ok(Event::End(e)) => writer
                .write_event(Event::End(e.into_owned()))
                .map_err(xml_err)?,
            Ok(Event::Empty(e)) => writer
                .write_event(Event::Empty(e.into_owned()))
                .map_err(xml_err)?,
            Ok(Event::Text(e)) => writer
                .write_event(Event::Text(e.into_owned()))
                .map_err(xml_err)?,
            Ok(Event::CData(e)) => writer
                .write_event(Event::CData(e.into_owned()))
                .map_err(xml_err)?,
            Ok(Event::Comment(e)) => writer
                .write_event(Event::Comment(e.into_owned()))
                .map_err(xml_err)?,
            Ok(Event::Decl(e)) => writer
                .write_event(Event::Decl(e.into_owned()))
                .map_err(xml_err)?,
            Ok(Event::PI(e)) => writer
                .write_event(Event::PI(e.into_owned()))
                .map_err(xml_err)?,
            Ok(Event::DocType(e)) => writer
                .write_event(Event::DocType(e.into_owned()))
                .map_err(xml_err)?,
            Ok(Event::Eof) => break,
            Err(err) => return Err(format!("worksheet parse error: {err}")),
        }
        buf.clear();
    }

    let out = writer.into_inner();
    String::from_utf8(out).map_err(|err| format!("worksheet not UTF-8: {err}"))
}

/// Rewrites the template archive with one worksheet patched. Every other
/// entry (vbaProject.bin included) is copied through with its compression
/// and metadata intact.
pub fn patch_workbook(
    template: &[u8],
    sheet_path: &str,
    writes: &BTreeMap<CellRef, String>,
) -> Result<Vec<u8>, String> {
    let mut zip = ZipArchive::new(Cursor::new(template))
        .map_err(|err| format!("unreadable workbook archive: {err}"))?;

    let xml = read_entry(&mut zip, sheet_path)?;
    let patched = patch_sheet_xml(&xml, writes)?.into_bytes();

    let mut out = ZipWriter::new(Cursor::new(Vec::new()));
    for i in 0..zip.len() {
        let mut file = zip
            .by_index(i)
            .map_err(|err| format!("unreadable archive entry {i}: {err}"))?;
        let name = file.name().to_string();

        let mut opts = SimpleFileOptions::default().compression_method(file.compression());
        if let Some(dt) = file.last_modified() {
            opts = opts.last_modified_time(dt);
        }
        if let Some(mode) = file.unix_mode() {
            opts = opts.unix_permissions(mode);
        }

        if file.is_dir() {
            out.add_directory(name, opts)
                .map_err(|err| format!("archive write error: {err}"))?;
            continue;
        }

        let mut data: Vec<u8> = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|err| format!("archive read error: {err}"))?;
        if name == sheet_path {
            data = patched.clone();
        }

        out.start_file(name, opts)
            .map_err(|err| format!("archive write error: {err}"))?;
        out.write_all(&data)
            .map_err(|err| format!("archive write error: {err}"))?;
    }

    let cursor = out
        .finish()
        .map_err(|err| format!("archive finalize error: {err}"))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<sheetData>
<row r="6"><c r="C6" s="3"><v>12</v></c><c r="E6" s="4" t="s"><v>0</v></c></row>
<row r="7"><c r="E7"/></row>
<row r="30"/>
</sheetData>
<mergeCells count="1"><mergeCell ref="E6:G6"/></mergeCells>
</worksheet>"#;

    fn writes(pairs: &[(&str, &str)]) -> BTreeMap<CellRef, String> {
        pairs
            .iter()
            .map(|(a1, v)| (CellRef::parse(a1).unwrap(), v.to_string()))
            .collect()
    }

    fn cell_texts(xml: &str) -> BTreeMap<String, String> {
        let mut reader = XmlReader::from_str(xml);
        reader.config_mut().trim_text(false);
        let mut buf = Vec::new();
        let mut cells = BTreeMap::new();
        let mut current: Option<String> = None;
        let mut in_inline = false;
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) if e.name().as_ref() == b"c" => {
                    current = attr_value(&e, b"r");
                    in_inline = false;
                }
                Ok(Event::Start(e)) if e.name().as_ref() == b"t" => in_inline = true,
                Ok(Event::Text(e)) => {
                    if in_inline {
                        if let Some(reference) = &current {
                            cells
                                .entry(reference.clone())
                                .or_insert_with(String::new)
                                .push_str(&e.unescape().unwrap());
                        }
                    }
                }
                Ok(Event::End(e)) if e.name().as_ref() == b"t" => in_inline = false,
                Ok(Event::End(e)) if e.name().as_ref() == b"c" => current = None,
                Ok(Event::Eof) => break,
                Err(err) => panic!("parse error: {err}"),
                _ => {}
            }
            buf.clear();
        }
        cells
    }

    #[test]
    fn existing_cell_is_rewritten_in_place() {
        let patched = patch_sheet_xml(SHEET, &writes(&[("E6", "17/02/2026")])).unwrap();
        let cells = cell_texts(&patched);
        assert_eq!(cells.get("E6").unwrap(), "17/02/2026");
        // Style survives, the shared-string marker does not.
        assert!(patched.contains(r#"<c r="E6" s="4" t="inlineStr">"#));
        // Untouched cells pass through.
        assert!(patched.contains(r#"<c r="C6" s="3"><v>12</v></c>"#));
    }

    #[test]
    fn missing_cells_are_inserted_in_column_order() {
        let patched = patch_sheet_xml(SHEET, &writes(&[("B6", "x"), ("H6", "y")])).unwrap();
        let b = patched.find(r#"<c r="B6""#).unwrap();
        let c = patched.find(r#"<c r="C6""#).unwrap();
        let h = patched.find(r#"<c r="H6""#).unwrap();
        assert!(b < c && c < h);
        let cells = cell_texts(&patched);
        assert_eq!(cells.get("B6").unwrap(), "x");
        assert_eq!(cells.get("H6").unwrap(), "y");
    }

    #[test]
    fn missing_rows_are_inserted_in_row_order() {
        let patched =
            patch_sheet_xml(SHEET, &writes(&[("D22", "desc"), ("E51", "action")])).unwrap();
        let r7 = patched.find(r#"<row r="7""#).unwrap();
        let r22 = patched.find(r#"<row r="22""#).unwrap();
        let r30 = patched.find(r#"<row r="30""#).unwrap();
        let r51 = patched.find(r#"<row r="51""#).unwrap();
        assert!(r7 < r22 && r22 < r30 && r30 < r51);
    }

    #[test]
    fn empty_self_closed_structures_accept_writes() {
        let patched = patch_sheet_xml(SHEET, &writes(&[("E7", "a"), ("H30", "X")])).unwrap();
        let cells = cell_texts(&patched);
        assert_eq!(cells.get("E7").unwrap(), "a");
        assert_eq!(cells.get("H30").unwrap(), "X");
    }

    #[test]
    fn values_are_escaped() {
        let patched = patch_sheet_xml(SHEET, &writes(&[("E7", "lot <A> & B")])).unwrap();
        assert!(patched.contains("lot &lt;A&gt; &amp; B"));
        assert_eq!(cell_texts(&patched).get("E7").unwrap(), "lot <A> & B");
    }

    #[test]
    fn no_writes_passes_sheet_through() {
        let patched = patch_sheet_xml(SHEET, &BTreeMap::new()).unwrap();
        assert!(patched.contains(r#"<mergeCell ref="E6:G6"/>"#));
        assert!(patched.contains(r#"<c r="C6" s="3"><v>12</v></c>"#));
    }
}
