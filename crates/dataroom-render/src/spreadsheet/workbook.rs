// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Parts outside the worksheets that point at cells: table definitions and
// the workbook's defined names (print areas, filter ranges, named ranges).
// They follow the rows down so they keep covering the same data.

use quick_xml::Reader;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesStart, BytesText, Event};

use dataroom_core::RenderError;

use super::cellref::{shift_formula_refs, shift_sqref};
use super::xml::{self, XmlWriter, xml_err};

fn with_shifted_refs(e: &BytesStart<'_>, by: u32) -> Result<BytesStart<'static>, RenderError> {
    let mut out = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr.map_err(xml_err)?;
        if attr.key.local_name().as_ref() == b"ref" {
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = shift_sqref(&attr.unescape_value().map_err(xml_err)?, by);
            out.push_attribute((key.as_str(), value.as_str()));
        } else {
            out.push_attribute(attr);
        }
    }
    Ok(out.into_owned())
}

/// Shift every `ref` in a table part (the table, its autoFilter and sort
/// state).
pub fn shift_table(table: &[u8], by: u32) -> Result<Vec<u8>, RenderError> {
    let mut reader = Reader::from_reader(table);
    let mut writer = XmlWriter::new(Vec::with_capacity(table.len()));
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Eof => break,
            Event::Start(e) => xml::write(&mut writer, Event::Start(with_shifted_refs(&e, by)?))?,
            Event::Empty(e) => xml::write(&mut writer, Event::Empty(with_shifted_refs(&e, by)?))?,
            other => xml::write(&mut writer, other)?,
        }
    }
    Ok(writer.into_inner())
}

/// Shift the sheet-qualified references inside each `definedName`.
pub fn shift_defined_names(workbook: &[u8], by: u32) -> Result<Vec<u8>, RenderError> {
    let mut reader = Reader::from_reader(workbook);
    let mut writer = XmlWriter::new(Vec::with_capacity(workbook.len() + 64));
    let mut in_name = false;
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Eof => break,
            Event::Start(e) => {
                in_name = e.local_name().as_ref() == b"definedName";
                xml::write(&mut writer, Event::Start(e))?;
            }
            Event::End(e) => {
                in_name = false;
                xml::write(&mut writer, Event::End(e))?;
            }
            Event::Text(text) if in_name => {
                let formula = text.unescape().map_err(xml_err)?;
                let shifted = shift_formula_refs(&formula, by);
                // Quotes stay literal, as spreadsheet applications write them.
                let escaped = partial_escape(shifted.as_str()).into_owned();
                xml::write(&mut writer, Event::Text(BytesText::from_escaped(escaped)))?;
            }
            other => xml::write(&mut writer, other)?,
        }
    }
    Ok(writer.into_inner())
}
