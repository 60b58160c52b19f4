// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spreadsheet watermarker for OOXML workbooks (.xlsx).
//
// Every worksheet gets a confidentiality header/footer on odd and even pages
// and a merged banner row inserted above its data. Existing rows move down
// by one, and so do the tables and defined names that point at them. Legacy
// binary workbooks are rejected, which sends the dispatcher down its
// fallback path.

pub mod cellref;
pub mod package;
pub mod sheet;
pub mod styles;
pub mod workbook;
mod xml;

use tracing::{debug, instrument};

use dataroom_core::RenderError;

use self::package::{STYLES, WORKBOOK, WorkbookPackage};

/// Watermarks every worksheet of a workbook.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpreadsheetWatermarker;

impl SpreadsheetWatermarker {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip_all, fields(bytes_len = source.len()))]
    pub fn watermark(&self, source: &[u8], label: &str) -> Result<Vec<u8>, RenderError> {
        let mut package = WorkbookPackage::read(source)?;

        let sheets = package.worksheet_names();
        if sheets.is_empty() {
            return Err(RenderError::Spreadsheet("workbook has no worksheets".into()));
        }

        let styled = package
            .part(STYLES)
            .map(styles::add_banner_style)
            .transpose()?
            .flatten();
        let banner_xf = match styled {
            Some((stylesheet, xf)) => {
                package.set_part(STYLES, stylesheet);
                Some(xf)
            }
            None => None,
        };

        for name in &sheets {
            let original = package
                .part(name)
                .ok_or_else(|| RenderError::Spreadsheet(format!("{name} vanished")))?;
            let rewritten = sheet::watermark_sheet(original, label, banner_xf)?;
            package.set_part(name, rewritten);
            debug!(sheet = %name, "worksheet watermarked");
        }

        let tables = package.table_names();
        for name in &tables {
            if let Some(table) = package.part(name) {
                let shifted = workbook::shift_table(table, 1)?;
                package.set_part(name, shifted);
            }
        }
        if let Some(book) = package.part(WORKBOOK) {
            let shifted = workbook::shift_defined_names(book, 1)?;
            package.set_part(WORKBOOK, shifted);
        }

        package.drop_calc_chain()?;
        let output = package.write()?;
        debug!(
            sheets = sheets.len(),
            tables = tables.len(),
            styled = banner_xf.is_some(),
            output_bytes = output.len(),
            "spreadsheet watermark complete"
        );
        Ok(output)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn part_text(package: &WorkbookPackage, name: &str) -> String {
        String::from_utf8(package.part(name).unwrap().to_vec()).unwrap()
    }

    #[test]
    fn every_sheet_gets_banner_and_header() {
        let source = fixtures::sample_xlsx();
        let output = SpreadsheetWatermarker::new()
            .watermark(&source, "a@x.com")
            .unwrap();
        assert_ne!(output, source);

        let package = WorkbookPackage::read(&output).unwrap();
        for sheet in ["xl/worksheets/sheet1.xml", "xl/worksheets/sheet2.xml"] {
            let xml = part_text(&package, sheet);
            assert!(xml.contains("<t>CONFIDENTIAL - a@x.com</t>"), "{sheet}");
            assert!(xml.contains(r#"<mergeCell ref="A1:E1"/>"#), "{sheet}");
            assert_eq!(xml.matches("a@x.com - Downloaded from Investor Dataroom").count(), 2);
        }
    }

    #[test]
    fn existing_rows_move_down_one() {
        let output = SpreadsheetWatermarker::new()
            .watermark(&fixtures::sample_xlsx(), "a@x.com")
            .unwrap();
        let package = WorkbookPackage::read(&output).unwrap();
        let xml = part_text(&package, "xl/worksheets/sheet1.xml");

        assert!(xml.contains(r#"<row r="2"><c r="A2" t="inlineStr"><is><t>Revenue</t>"#));
        assert!(xml.contains(r#"<row r="3"><c r="A3" t="inlineStr"><is><t>Total</t>"#));
        assert!(xml.contains(r#"<dimension ref="A1:E3"/>"#));
        // Banner uses the appended format (index 1 after the single default).
        assert!(xml.contains(r#"<c r="A1" s="1" t="inlineStr">"#));
    }

    #[test]
    fn tables_and_defined_names_follow_the_rows() {
        let output = SpreadsheetWatermarker::new()
            .watermark(&fixtures::sample_xlsx(), "a@x.com")
            .unwrap();
        let package = WorkbookPackage::read(&output).unwrap();

        let table = part_text(&package, "xl/tables/table1.xml");
        assert!(table.contains(r#"displayName="Totals" ref="A2:C3">"#));
        assert!(table.contains(r#"<autoFilter ref="A2:C3"/>"#));

        let book = part_text(&package, WORKBOOK);
        assert!(book.contains(r#"localSheetId="0">Model!$A$2:$C$3</definedName>"#));
        assert!(book.contains(r#"<definedName name="Revenue">'Model'!$B$2:$C$2</definedName>"#));
    }

    #[test]
    fn styles_extended_and_calc_chain_dropped() {
        let output = SpreadsheetWatermarker::new()
            .watermark(&fixtures::sample_xlsx(), "a@x.com")
            .unwrap();
        let package = WorkbookPackage::read(&output).unwrap();

        let styles = part_text(&package, STYLES);
        assert!(styles.contains(r#"<fonts count="2">"#));
        assert!(styles.contains(r#"<cellXfs count="2">"#));
        assert!(package.part(package::CALC_CHAIN).is_none());
        assert!(!part_text(&package, package::CONTENT_TYPES).contains("calcChain"));
    }

    #[test]
    fn deterministic_for_identical_input() {
        let source = fixtures::sample_xlsx();
        let marker = SpreadsheetWatermarker::new();
        assert_eq!(
            marker.watermark(&source, "a@x.com").unwrap(),
            marker.watermark(&source, "a@x.com").unwrap()
        );
    }

    #[test]
    fn legacy_binary_workbook_is_an_error() {
        let err = SpreadsheetWatermarker::new()
            .watermark(b"\xD0\xCF\x11\xE0\xA1\xB1\x1A\xE1 not ooxml", "a@x.com")
            .unwrap_err();
        assert!(matches!(err, RenderError::Spreadsheet(_)));
    }
}
