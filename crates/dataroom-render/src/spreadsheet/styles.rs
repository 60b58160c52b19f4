// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Adds the banner cell format (bold italic 14pt, translucent grey, centred)
// to a workbook stylesheet.

use quick_xml::Reader;
use quick_xml::events::Event;

use dataroom_core::RenderError;

use super::xml::{self, XmlWriter, local_name, root_prefix, with_attribute, xml_err};

/// ARGB with alpha 0x40 so the banner reads as faint.
const BANNER_COLOR: &str = "40808080";

#[derive(Debug, Default)]
struct ChildCounts {
    fonts: Option<u32>,
    cell_xfs: Option<u32>,
}

fn count_children(styles: &[u8]) -> Result<ChildCounts, RenderError> {
    let mut reader = Reader::from_reader(styles);
    let mut stack: Vec<String> = Vec::new();
    let mut counts = ChildCounts::default();

    let bump = |stack: &[String], counts: &mut ChildCounts| {
        if stack.len() != 2 {
            return;
        }
        match stack[1].as_str() {
            "fonts" => *counts.fonts.get_or_insert(0) += 1,
            "cellXfs" => *counts.cell_xfs.get_or_insert(0) += 1,
            _ => {}
        }
    };

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => {
                bump(&stack, &mut counts);
                let name = local_name(&e);
                if stack.len() == 1 {
                    match name.as_str() {
                        "fonts" => counts.fonts = Some(counts.fonts.unwrap_or(0)),
                        "cellXfs" => counts.cell_xfs = Some(counts.cell_xfs.unwrap_or(0)),
                        _ => {}
                    }
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                bump(&stack, &mut counts);
                if stack.len() == 1 {
                    match local_name(&e).as_str() {
                        "fonts" => counts.fonts = Some(0),
                        "cellXfs" => counts.cell_xfs = Some(0),
                        _ => {}
                    }
                }
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(counts)
}

fn write_banner_font(writer: &mut XmlWriter, p: &str) -> Result<(), RenderError> {
    xml::start(writer, &format!("{p}font"), &[])?;
    xml::empty(writer, &format!("{p}b"), &[])?;
    xml::empty(writer, &format!("{p}i"), &[])?;
    xml::empty(writer, &format!("{p}sz"), &[("val", "14")])?;
    xml::empty(writer, &format!("{p}color"), &[("rgb", BANNER_COLOR)])?;
    xml::empty(writer, &format!("{p}name"), &[("val", "Calibri")])?;
    xml::end(writer, &format!("{p}font"))
}

fn write_banner_xf(writer: &mut XmlWriter, p: &str, font_id: u32) -> Result<(), RenderError> {
    let font_id = font_id.to_string();
    xml::start(
        writer,
        &format!("{p}xf"),
        &[
            ("numFmtId", "0"),
            ("fontId", &font_id),
            ("fillId", "0"),
            ("borderId", "0"),
            ("xfId", "0"),
            ("applyFont", "1"),
            ("applyAlignment", "1"),
        ],
    )?;
    xml::empty(writer, &format!("{p}alignment"), &[("horizontal", "center")])?;
    xml::end(writer, &format!("{p}xf"))
}

/// Append the banner font and cell format. Returns the rewritten stylesheet
/// and the `cellXfs` index of the banner format, or `None` when the
/// stylesheet has no `fonts`/`cellXfs` tables to extend.
pub fn add_banner_style(styles: &[u8]) -> Result<Option<(Vec<u8>, u32)>, RenderError> {
    let counts = count_children(styles)?;
    let (Some(font_count), Some(xf_count)) = (counts.fonts, counts.cell_xfs) else {
        return Ok(None);
    };
    let prefix = root_prefix(styles)?;
    let new_fonts = (font_count + 1).to_string();
    let new_xfs = (xf_count + 1).to_string();

    let mut reader = Reader::from_reader(styles);
    let mut writer = XmlWriter::new(Vec::with_capacity(styles.len() + 512));
    let mut depth = 0usize;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Eof => break,
            Event::Start(e) => {
                let name = local_name(&e);
                depth += 1;
                match (depth, name.as_str()) {
                    (2, "fonts") => xml::write(&mut writer, Event::Start(with_attribute(&e, "count", &new_fonts)?))?,
                    (2, "cellXfs") => xml::write(&mut writer, Event::Start(with_attribute(&e, "count", &new_xfs)?))?,
                    _ => xml::write(&mut writer, Event::Start(e))?,
                }
            }
            Event::Empty(e) if depth == 1 && local_name(&e) == "fonts" => {
                let open = with_attribute(&e, "count", &new_fonts)?;
                let close = open.to_end().into_owned();
                xml::write(&mut writer, Event::Start(open))?;
                write_banner_font(&mut writer, &prefix)?;
                xml::write(&mut writer, Event::End(close))?;
            }
            Event::Empty(e) if depth == 1 && local_name(&e) == "cellXfs" => {
                let open = with_attribute(&e, "count", &new_xfs)?;
                let close = open.to_end().into_owned();
                xml::write(&mut writer, Event::Start(open))?;
                write_banner_xf(&mut writer, &prefix, font_count)?;
                xml::write(&mut writer, Event::End(close))?;
            }
            Event::End(e) => {
                if depth == 2 {
                    match String::from_utf8_lossy(e.local_name().as_ref()).as_ref() {
                        "fonts" => write_banner_font(&mut writer, &prefix)?,
                        "cellXfs" => write_banner_xf(&mut writer, &prefix, font_count)?,
                        _ => {}
                    }
                }
                depth = depth.saturating_sub(1);
                xml::write(&mut writer, Event::End(e))?;
            }
            other => xml::write(&mut writer, other)?,
        }
    }

    Ok(Some((writer.into_inner(), xf_count)))
}
