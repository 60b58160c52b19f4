// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Small quick-xml helpers shared by the worksheet and stylesheet rewriters.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use dataroom_core::RenderError;

pub type XmlWriter = Writer<Vec<u8>>;

pub fn xml_err(e: impl std::fmt::Display) -> RenderError {
    RenderError::Spreadsheet(format!("malformed part: {e}"))
}

/// Namespace prefix of the root element including the colon (`"x:"`), or
/// an empty string for the default namespace.
pub fn root_prefix(xml: &[u8]) -> Result<String, RenderError> {
    let mut reader = Reader::from_reader(xml);
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) | Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                return Ok(match name.split_once(':') {
                    Some((prefix, _)) => format!("{prefix}:"),
                    None => String::new(),
                });
            }
            Event::Eof => return Err(xml_err("document has no root element")),
            _ => {}
        }
    }
}

/// Local element name as an owned string.
pub fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Copy of `e` with `key` set to `value` (replaced if present, else appended).
pub fn with_attribute(
    e: &BytesStart<'_>,
    key: &str,
    value: &str,
) -> Result<BytesStart<'static>, RenderError> {
    let mut out = BytesStart::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr = attr.map_err(xml_err)?;
        if attr.key.as_ref() != key.as_bytes() {
            out.push_attribute(attr);
        }
    }
    out.push_attribute((key, value));
    Ok(out.into_owned())
}

/// Integer value of attribute `key`, if present and numeric.
pub fn numeric_attribute(e: &BytesStart<'_>, key: &str) -> Option<u32> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key.as_bytes())
        .and_then(|a| std::str::from_utf8(&a.value).ok()?.trim().parse().ok())
}

pub fn write(writer: &mut XmlWriter, event: Event<'_>) -> Result<(), RenderError> {
    writer.write_event(event).map_err(xml_err)
}

pub fn start(writer: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> Result<(), RenderError> {
    let mut e = BytesStart::new(name);
    for attr in attrs {
        e.push_attribute(*attr);
    }
    write(writer, Event::Start(e))
}

pub fn empty(writer: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> Result<(), RenderError> {
    let mut e = BytesStart::new(name);
    for attr in attrs {
        e.push_attribute(*attr);
    }
    write(writer, Event::Empty(e))
}

pub fn end(writer: &mut XmlWriter, name: &str) -> Result<(), RenderError> {
    write(writer, Event::End(BytesEnd::new(name)))
}

/// `<name>text</name>` with `text` escaped.
pub fn text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<(), RenderError> {
    start(writer, name, &[])?;
    write(writer, Event::Text(BytesText::new(text)))?;
    end(writer, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_of_root() {
        assert_eq!(root_prefix(b"<?xml version=\"1.0\"?><worksheet/>").unwrap(), "");
        assert_eq!(root_prefix(b"<x:worksheet xmlns:x=\"u\"></x:worksheet>").unwrap(), "x:");
        assert!(root_prefix(b"").is_err());
    }

    #[test]
    fn attribute_replaced_in_place_of_old() {
        let e = BytesStart::from_content(r#"fonts count="2" x14ac:knownFonts="1""#, 5);
        let out = with_attribute(&e, "count", "3").unwrap();
        assert_eq!(numeric_attribute(&out, "count"), Some(3));
        assert_eq!(numeric_attribute(&out, "x14ac:knownFonts"), Some(1));
        assert_eq!(out.attributes().count(), 2);
    }

    #[test]
    fn text_is_escaped() {
        let mut writer = Writer::new(Vec::new());
        text_element(&mut writer, "t", "a<b & c").unwrap();
        assert_eq!(writer.into_inner(), b"<t>a&lt;b &amp; c</t>");
    }
}
