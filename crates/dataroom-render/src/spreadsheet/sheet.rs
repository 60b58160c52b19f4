// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Streaming rewrite of one worksheet part:
//
//   1. every existing row moves down by one (row numbers, cell refs, merged
//      ranges, selections, validations, hyperlinks);
//   2. a banner row is inserted as row 1 and merged across A..lastCol;
//   3. headerFooter is replaced by the confidentiality banner.
//
// Formula text is not rewritten.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use dataroom_core::RenderError;

use super::cellref::{column_index, column_name, shift_cell, shift_sqref};
use super::xml::{self, XmlWriter, local_name, root_prefix, with_attribute, xml_err};

/// Banner rows always span at least this many columns.
pub const MIN_BANNER_COLUMNS: u32 = 5;

/// Worksheet children that must follow `mergeCells`.
const AFTER_MERGE_CELLS: &[&str] = &[
    "phoneticPr",
    "conditionalFormatting",
    "dataValidations",
    "hyperlinks",
    "printOptions",
    "pageMargins",
    "pageSetup",
    "headerFooter",
    "rowBreaks",
    "colBreaks",
    "customProperties",
    "cellWatches",
    "ignoredErrors",
    "smartTags",
    "drawing",
    "legacyDrawing",
    "legacyDrawingHF",
    "drawingHF",
    "picture",
    "oleObjects",
    "controls",
    "webPublishItems",
    "tableParts",
    "extLst",
];

/// Worksheet children that must follow `headerFooter`.
const AFTER_HEADER_FOOTER: &[&str] = &[
    "rowBreaks",
    "colBreaks",
    "customProperties",
    "cellWatches",
    "ignoredErrors",
    "smartTags",
    "drawing",
    "legacyDrawing",
    "legacyDrawingHF",
    "drawingHF",
    "picture",
    "oleObjects",
    "controls",
    "webPublishItems",
    "tableParts",
    "extLst",
];

/// What a first pass over the sheet learns.
#[derive(Debug, Default, PartialEq, Eq)]
struct SheetShape {
    has_sheet_data: bool,
    /// Widest populated column (1-based), 0 for an empty sheet.
    max_column: u32,
    /// Last populated row, 0 for an empty sheet.
    max_row: u32,
}

fn survey(sheet: &[u8]) -> Result<SheetShape, RenderError> {
    let mut reader = Reader::from_reader(sheet);
    let mut shape = SheetShape::default();
    let mut current_row = 0u32;
    let mut cell_position = 0u32;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sheetData" => shape.has_sheet_data = true,
                b"row" => {
                    current_row = xml::numeric_attribute(&e, "r").unwrap_or(current_row + 1);
                    shape.max_row = shape.max_row.max(current_row);
                    cell_position = 0;
                }
                b"c" => {
                    cell_position = attribute(&e, "r")
                        .and_then(|r| column_index(&r))
                        .unwrap_or(cell_position + 1);
                    shape.max_column = shape.max_column.max(cell_position);
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(shape)
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Header/footer codes treat `&` as a control character.
fn header_safe(label: &str) -> String {
    label.replace('&', "&&")
}

struct SheetRewriter<'a> {
    writer: XmlWriter,
    prefix: String,
    label: &'a str,
    banner_xf: Option<u32>,
    last_column: u32,
    max_row: u32,
    merge_written: bool,
    header_written: bool,
}

impl SheetRewriter<'_> {
    fn name(&self, local: &str) -> String {
        format!("{}{local}", self.prefix)
    }

    fn banner_range(&self) -> String {
        format!("A1:{}1", column_name(self.last_column))
    }

    fn dimension_ref(&self) -> String {
        let last_row = if self.max_row == 0 { 1 } else { self.max_row + 1 };
        format!("A1:{}{last_row}", column_name(self.last_column))
    }

    fn write_banner_row(&mut self) -> Result<(), RenderError> {
        let row = self.name("row");
        let spans = format!("1:{}", self.last_column);
        let xf = self.banner_xf.map(|s| s.to_string());

        let mut row_attrs = vec![("r", "1"), ("spans", spans.as_str())];
        let mut cell_attrs = vec![("r", "A1")];
        if let Some(xf) = &xf {
            row_attrs.extend([("s", xf.as_str()), ("customFormat", "1")]);
            cell_attrs.push(("s", xf.as_str()));
        }
        cell_attrs.push(("t", "inlineStr"));

        let cell = self.name("c");
        let inline = self.name("is");
        let text = self.name("t");
        xml::start(&mut self.writer, &row, &row_attrs)?;
        xml::start(&mut self.writer, &cell, &cell_attrs)?;
        xml::start(&mut self.writer, &inline, &[])?;
        xml::text_element(&mut self.writer, &text, &format!("CONFIDENTIAL - {}", self.label))?;
        xml::end(&mut self.writer, &inline)?;
        xml::end(&mut self.writer, &cell)?;
        xml::end(&mut self.writer, &row)
    }

    fn write_banner_merge(&mut self) -> Result<(), RenderError> {
        let range = self.banner_range();
        let merge = self.name("mergeCell");
        xml::empty(&mut self.writer, &merge, &[("ref", range.as_str())])
    }

    fn write_merge_block(&mut self) -> Result<(), RenderError> {
        let block = self.name("mergeCells");
        xml::start(&mut self.writer, &block, &[("count", "1")])?;
        self.write_banner_merge()?;
        xml::end(&mut self.writer, &block)?;
        self.merge_written = true;
        Ok(())
    }

    fn write_header_footer(&mut self) -> Result<(), RenderError> {
        let label = header_safe(self.label);
        let header = format!("&C&14&K808080CONFIDENTIAL - {label}");
        let footer = format!("&C&10&K808080{label} - Downloaded from Investor Dataroom");

        let block = self.name("headerFooter");
        xml::start(&mut self.writer, &block, &[])?;
        for (part, text) in [
            ("oddHeader", &header),
            ("oddFooter", &footer),
            ("evenHeader", &header),
            ("evenFooter", &footer),
        ] {
            let part = self.name(part);
            xml::text_element(&mut self.writer, &part, text)?;
        }
        xml::end(&mut self.writer, &block)?;
        self.header_written = true;
        Ok(())
    }

    /// Emit whatever must precede a direct worksheet child named `local`.
    fn before_child(&mut self, local: &str) -> Result<(), RenderError> {
        if !self.merge_written && local != "mergeCells" && AFTER_MERGE_CELLS.contains(&local) {
            self.write_merge_block()?;
        }
        if !self.header_written && AFTER_HEADER_FOOTER.contains(&local) {
            self.write_header_footer()?;
        }
        Ok(())
    }

    /// Attribute value after rows move down, or `None` to keep it.
    fn rewritten_attribute(&self, element: &str, key: &str, value: &str) -> Option<String> {
        match (element, key) {
            ("row", "r") => value.trim().parse::<u32>().ok().map(|r| (r + 1).to_string()),
            ("c", "r") => Some(shift_cell(value, 1)),
            ("dimension", "ref") => Some(self.dimension_ref()),
            (_, "ref" | "sqref" | "activeCell" | "topLeftCell") => Some(shift_sqref(value, 1)),
            _ => None,
        }
    }

    fn shifted(&self, e: &BytesStart<'_>) -> Result<BytesStart<'static>, RenderError> {
        let element = local_name(e);
        let mut out = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
        for attr in e.attributes() {
            let attr = attr.map_err(xml_err)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let local_key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let replacement = {
                let value = attr.unescape_value().map_err(xml_err)?;
                self.rewritten_attribute(&element, &local_key, &value)
            };
            match replacement {
                Some(value) => out.push_attribute((key.as_str(), value.as_str())),
                None => out.push_attribute(attr),
            }
        }
        Ok(out.into_owned())
    }
}

/// Watermark one worksheet part. `banner_xf` is the `cellXfs` index of the
/// banner format, if the stylesheet could be extended.
pub fn watermark_sheet(
    sheet: &[u8],
    label: &str,
    banner_xf: Option<u32>,
) -> Result<Vec<u8>, RenderError> {
    let shape = survey(sheet)?;
    if !shape.has_sheet_data {
        return Err(RenderError::Spreadsheet("worksheet has no sheetData".into()));
    }

    let mut rw = SheetRewriter {
        writer: XmlWriter::new(Vec::with_capacity(sheet.len() + 1024)),
        prefix: root_prefix(sheet)?,
        label,
        banner_xf,
        last_column: shape.max_column.max(MIN_BANNER_COLUMNS),
        max_row: shape.max_row,
        merge_written: false,
        header_written: false,
    };

    let mut reader = Reader::from_reader(sheet);
    let mut depth = 0usize;
    // Depth at which a replaced subtree was opened; its events are dropped.
    let mut skipping: Option<usize> = None;

    loop {
        let event = reader.read_event().map_err(xml_err)?;

        if let Some(level) = skipping {
            match event {
                Event::Start(_) => depth += 1,
                Event::End(_) => {
                    depth -= 1;
                    if depth == level {
                        skipping = None;
                    }
                }
                Event::Eof => return Err(xml_err("unterminated headerFooter")),
                _ => {}
            }
            continue;
        }

        match event {
            Event::Eof => break,
            Event::Start(e) => {
                let local = local_name(&e);
                if depth == 1 {
                    rw.before_child(&local)?;
                    if local == "headerFooter" {
                        rw.write_header_footer()?;
                        skipping = Some(depth);
                        depth += 1;
                        continue;
                    }
                }
                depth += 1;
                if depth == 2 && local == "mergeCells" {
                    let count = xml::numeric_attribute(&e, "count").unwrap_or(0) + 1;
                    let open = with_attribute(&e, "count", &count.to_string())?;
                    xml::write(&mut rw.writer, Event::Start(open))?;
                } else {
                    let open = rw.shifted(&e)?;
                    xml::write(&mut rw.writer, Event::Start(open))?;
                }
                if depth == 2 && local == "sheetData" {
                    rw.write_banner_row()?;
                }
            }
            Event::Empty(e) => {
                let local = local_name(&e);
                if depth == 1 {
                    rw.before_child(&local)?;
                    match local.as_str() {
                        "headerFooter" => {
                            rw.write_header_footer()?;
                            continue;
                        }
                        "sheetData" => {
                            let close = e.to_end().into_owned();
                            xml::write(&mut rw.writer, Event::Start(e.into_owned()))?;
                            rw.write_banner_row()?;
                            xml::write(&mut rw.writer, Event::End(close))?;
                            continue;
                        }
                        "mergeCells" => {
                            rw.write_merge_block()?;
                            continue;
                        }
                        _ => {}
                    }
                }
                let shifted = rw.shifted(&e)?;
                xml::write(&mut rw.writer, Event::Empty(shifted))?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if depth == 1 && e.local_name().as_ref() == b"mergeCells" {
                    rw.write_banner_merge()?;
                    rw.merge_written = true;
                }
                if depth == 0 {
                    if !rw.merge_written {
                        rw.write_merge_block()?;
                    }
                    if !rw.header_written {
                        rw.write_header_footer()?;
                    }
                }
                xml::write(&mut rw.writer, Event::End(e))?;
            }
            other => xml::write(&mut rw.writer, other)?,
        }
    }

    Ok(rw.writer.into_inner())
}
