// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A1-style cell references: parsing, formatting, and shifting rows down.

/// Column letters for a 1-based column index (1 → "A", 28 → "AB").
pub fn column_name(mut index: u32) -> String {
    let mut letters = Vec::new();
    while index > 0 {
        let rem = (index - 1) % 26;
        letters.push(b'A' + rem as u8);
        index = (index - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// 1-based column index of a reference such as `$AB$12`, if it has one.
pub fn column_index(reference: &str) -> Option<u32> {
    let letters: String = reference
        .trim_start_matches('$')
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return None;
    }
    letters.chars().try_fold(0u32, |acc, c| {
        acc.checked_mul(26)?
            .checked_add(u32::from(c.to_ascii_uppercase() as u8 - b'A' + 1))
    })
}

/// Shift the row part of one cell reference (`B7` → `B8`, `$B$7` → `$B$8`).
/// Whole-column references (`B`) and anything unparsable pass through.
pub fn shift_cell(reference: &str, by: u32) -> String {
    let digits_at = reference
        .char_indices()
        .find(|(_, c)| c.is_ascii_digit())
        .map(|(i, _)| i);

    let Some(at) = digits_at else {
        return reference.to_string();
    };
    let (head, digits) = reference.split_at(at);
    if !head.trim_end_matches('$').chars().all(|c| c.is_ascii_alphabetic() || c == '$') {
        return reference.to_string();
    }
    match digits.parse::<u32>() {
        Ok(row) => format!("{head}{}", row.saturating_add(by)),
        Err(_) => reference.to_string(),
    }
}

/// Shift a range (`A1:C3`), a single cell, or a space-separated `sqref` list.
pub fn shift_sqref(sqref: &str, by: u32) -> String {
    sqref
        .split(' ')
        .map(|range| {
            range
                .split(':')
                .map(|cell| shift_cell(cell, by))
                .collect::<Vec<_>>()
                .join(":")
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Column letters and row digits of one reference part (`$B$7`, `$7`, `B`).
/// `None` unless it really is a reference: at most three letters, then only
/// digits.
fn reference_parts(part: &str) -> Option<(&str, &str)> {
    let rest = part.strip_prefix('$').unwrap_or(part);
    let letters_end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    let (letters, rest) = rest.split_at(letters_end);
    let digits = rest.strip_prefix('$').unwrap_or(rest);
    if letters.len() > 3 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if letters.is_empty() && digits.is_empty() {
        return None;
    }
    Some((letters, digits))
}

/// Shift a reference that follows a sheet qualifier. Whole columns are kept;
/// anything that is not a reference (a sheet-local name, `#REF!`) is `None`.
fn shift_qualified(reference: &str, by: u32) -> Option<String> {
    let rows = reference
        .split(':')
        .map(|part| reference_parts(part).map(|(_, digits)| !digits.is_empty()))
        .collect::<Option<Vec<bool>>>()?;
    if rows.iter().all(|has_row| *has_row) {
        Some(shift_sqref(reference, by))
    } else if rows.iter().all(|has_row| !has_row) {
        Some(reference.to_string())
    } else {
        None
    }
}

/// Shift every sheet-qualified reference (`Model!$A$1:$C$9`,
/// `'Q3 Plan'!B2`) in formula text such as a defined name. String literals,
/// unqualified references and external-workbook references are left alone.
pub fn shift_formula_refs(formula: &str, by: u32) -> String {
    let chars: Vec<char> = formula.chars().collect();
    let mut out = String::with_capacity(formula.len() + 4);
    let mut in_string = false;
    let mut in_sheet_name = false;
    let mut external = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        out.push(c);
        i += 1;
        if in_string {
            in_string = c != '"';
            continue;
        }
        match c {
            '"' if !in_sheet_name => in_string = true,
            '\'' => in_sheet_name = !in_sheet_name,
            '[' => external = true,
            _ if in_sheet_name => {}
            '!' => {
                let end = chars[i..]
                    .iter()
                    .position(|c| !(c.is_ascii_alphanumeric() || *c == '$' || *c == ':'))
                    .map_or(chars.len(), |n| i + n);
                let reference: String = chars[i..end].iter().collect();
                let shifted = if external {
                    None
                } else {
                    shift_qualified(&reference, by)
                };
                out.push_str(shifted.as_deref().unwrap_or(&reference));
                i = end;
                external = false;
            }
            ',' | ';' | '(' | ')' | ' ' | '+' | '-' | '*' | '/' | '^' | '&' | '=' | '<' | '>' => {
                external = false;
            }
            _ => {}
        }
    }
    out
}

/// Highest column index mentioned by a range or cell reference.
pub fn max_column(range: &str) -> Option<u32> {
    range.split(':').filter_map(column_index).max()
}
