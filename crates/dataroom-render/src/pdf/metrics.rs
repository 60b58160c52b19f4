// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Helvetica glyph metrics and WinAnsi encoding for the standard-14 font used
// by the PDF stamp. Widths are in 1/1000 em, taken from the Adobe AFM.

/// Widths for printable ASCII 0x20..=0x7E.
const HELVETICA_ASCII_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

/// Used for everything outside printable ASCII.
const DEFAULT_WIDTH: u16 = 556;

fn glyph_width(byte: u8) -> u16 {
    match byte {
        0x20..=0x7E => HELVETICA_ASCII_WIDTHS[(byte - 0x20) as usize],
        _ => DEFAULT_WIDTH,
    }
}

/// Width of `encoded` (WinAnsi bytes) in points at `font_size`.
pub fn text_width(encoded: &[u8], font_size: f32) -> f32 {
    let units: u32 = encoded.iter().map(|b| u32::from(glyph_width(*b))).sum();
    units as f32 * font_size / 1000.0
}

/// Encode `text` for a WinAnsiEncoding simple font. Latin-1 characters map
/// straight through; anything else becomes `?`.
pub fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u32::from(c) {
            cp @ 0x20..=0x7E => cp as u8,
            cp @ 0xA0..=0xFF => cp as u8,
            _ => b'?',
        })
        .collect()
}
