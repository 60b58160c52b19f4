// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OOXML package (zip container) access for workbooks.

use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use dataroom_core::RenderError;

pub const CONTENT_TYPES: &str = "[Content_Types].xml";
pub const WORKBOOK: &str = "xl/workbook.xml";
pub const WORKBOOK_RELS: &str = "xl/_rels/workbook.xml.rels";
pub const STYLES: &str = "xl/styles.xml";
pub const CALC_CHAIN: &str = "xl/calcChain.xml";

fn zip_err(e: impl std::fmt::Display) -> RenderError {
    RenderError::Spreadsheet(format!("workbook package: {e}"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Entry {
    Directory,
    File(Vec<u8>),
}

/// All parts of a workbook, in their original archive order.
#[derive(Debug, Clone)]
pub struct WorkbookPackage {
    entries: Vec<(String, Entry)>,
}

impl WorkbookPackage {
    /// Read every part of the archive into memory. Legacy binary `.xls`
    /// files are not zip containers and fail here.
    pub fn read(bytes: &[u8]) -> Result<Self, RenderError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(zip_err)?;
        let mut entries = Vec::with_capacity(archive.len());

        for index in 0..archive.len() {
            let mut file = archive.by_index(index).map_err(zip_err)?;
            let name = file.name().to_string();
            if file.is_dir() {
                entries.push((name, Entry::Directory));
                continue;
            }
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data).map_err(zip_err)?;
            entries.push((name, Entry::File(data)));
        }

        if !entries.iter().any(|(name, _)| name == CONTENT_TYPES) {
            return Err(RenderError::Spreadsheet(
                "not an OOXML workbook: [Content_Types].xml missing".into(),
            ));
        }
        Ok(Self { entries })
    }

    /// Names of worksheet parts, in archive order.
    pub fn worksheet_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(name, entry)| {
                matches!(entry, Entry::File(_))
                    && name.starts_with("xl/worksheets/")
                    && !name.contains("/_rels/")
                    && name.ends_with(".xml")
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Names of table definition parts.
    pub fn table_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(name, entry)| {
                matches!(entry, Entry::File(_)) && name.starts_with("xl/tables/") && name.ends_with(".xml")
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries.iter().find_map(|(n, entry)| match entry {
            Entry::File(data) if n == name => Some(data.as_slice()),
            _ => None,
        })
    }

    /// Replace the contents of an existing part.
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        if let Some((_, entry)) = self.entries.iter_mut().find(|(n, _)| n == name) {
            *entry = Entry::File(data);
        }
    }

    pub fn remove_part(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| n != name);
        self.entries.len() != before
    }

    /// Remove the cached calculation chain. Its cell references would be
    /// stale after rows move; spreadsheet applications rebuild it on load.
    pub fn drop_calc_chain(&mut self) -> Result<(), RenderError> {
        if !self.remove_part(CALC_CHAIN) {
            return Ok(());
        }
        if let Some(types) = self.part(CONTENT_TYPES) {
            let cleaned = remove_elements_mentioning(types, b"calcChain")?;
            self.set_part(CONTENT_TYPES, cleaned);
        }
        if let Some(rels) = self.part(WORKBOOK_RELS) {
            let cleaned = remove_elements_mentioning(rels, b"calcChain")?;
            self.set_part(WORKBOOK_RELS, cleaned);
        }
        Ok(())
    }

    /// Serialize back into a deflated zip archive.
    pub fn write(&self) -> Result<Vec<u8>, RenderError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, entry) in &self.entries {
            match entry {
                Entry::Directory => {
                    writer.add_directory(name.as_str(), options).map_err(zip_err)?;
                }
                Entry::File(data) => {
                    writer.start_file(name.as_str(), options).map_err(zip_err)?;
                    writer.write_all(data).map_err(zip_err)?;
                }
            }
        }

        let cursor = writer.finish().map_err(zip_err)?;
        Ok(cursor.into_inner())
    }
}

/// Drop every empty element (`<Override .../>`, `<Relationship .../>`)
/// whose attributes mention `needle`.
fn remove_elements_mentioning(xml: &[u8], needle: &[u8]) -> Result<Vec<u8>, RenderError> {
    use quick_xml::events::Event;
    use quick_xml::{Reader, Writer};

    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));

    loop {
        let event = reader.read_event().map_err(zip_err)?;
        match event {
            Event::Eof => break,
            Event::Empty(ref e)
                if e.attributes()
                    .flatten()
                    .any(|a| a.value.windows(needle.len()).any(|w| w == needle)) => {}
            other => writer.write_event(other).map_err(zip_err)?,
        }
    }
    Ok(writer.into_inner())
}
