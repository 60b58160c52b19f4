// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF watermarker: stamps the viewer label diagonally at five positions on
// every page using the `lopdf` crate.
//
// Each page gets its original content wrapped in `q … Q` so whatever graphics
// state it leaves behind cannot skew the stamp, followed by one new content
// stream holding the five rotated, translucent text runs.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use tracing::{debug, instrument};

use dataroom_core::RenderError;

use super::metrics::{text_width, win_ansi};

/// Font size as a fraction of the smaller page dimension.
const FONT_SCALE: f32 = 0.06;

/// Fill opacity of the stamp.
const STAMP_OPACITY: f32 = 0.15;

/// Neutral gray, RGB.
const STAMP_GRAY: f32 = 0.7;

/// Resource names for the stamp font and graphics state.
const FONT_RESOURCE: &str = "DrWmF1";
const GSTATE_RESOURCE: &str = "DrWmGS1";

/// US Letter, used when a page has no resolvable /MediaBox.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Guard against malformed, cyclic /Parent chains.
const MAX_TREE_DEPTH: usize = 64;

/// One placed copy of the label, in page space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampPlacement {
    pub x: f32,
    pub y: f32,
}

/// Layout of the stamp on one page.
#[derive(Debug, Clone, PartialEq)]
pub struct StampLayout {
    pub font_size: f32,
    pub placements: [StampPlacement; 5],
}

/// Compute where the five copies of `encoded_label` go on a page with the
/// given media box: the centre and the four quadrant centres, each shifted
/// left by half the text width so the run is centred on its anchor.
pub fn stamp_layout(media_box: [f32; 4], encoded_label: &[u8]) -> StampLayout {
    let [llx, lly, urx, ury] = media_box;
    let width = (urx - llx).abs();
    let height = (ury - lly).abs();
    let font_size = width.min(height) * FONT_SCALE;
    let half_text = text_width(encoded_label, font_size) / 2.0;

    let anchors = [
        (width / 2.0, height / 2.0),
        (width / 4.0, height / 4.0),
        (width * 3.0 / 4.0, height * 3.0 / 4.0),
        (width / 4.0, height * 3.0 / 4.0),
        (width * 3.0 / 4.0, height / 4.0),
    ];

    let placements = anchors.map(|(x, y)| StampPlacement {
        x: llx.min(urx) + x - half_text,
        y: lly.min(ury) + y,
    });

    StampLayout {
        font_size,
        placements,
    }
}

/// Stamps the viewer label onto every page of a PDF.
///
/// Stateless and deterministic: the same input bytes and label always
/// produce the same output bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfWatermarker;

impl PdfWatermarker {
    pub fn new() -> Self {
        Self
    }

    /// Watermark `source` for `label`. Fails if the source is not a
    /// well-formed PDF; the caller decides what to serve instead.
    #[instrument(skip_all, fields(bytes_len = source.len()))]
    pub fn watermark(&self, source: &[u8], label: &str) -> Result<Vec<u8>, RenderError> {
        let mut document = Document::load_mem(source)
            .map_err(|err| RenderError::Pdf(format!("failed to load PDF: {err}")))?;

        let pages = document.get_pages();
        if pages.is_empty() {
            return Err(RenderError::Pdf("document has no pages".into()));
        }

        let encoded = win_ansi(label);

        let font_id = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let gstate_id = document.add_object(dictionary! {
            "Type" => "ExtGState",
            "ca" => STAMP_OPACITY,
            "CA" => STAMP_OPACITY,
        });
        let save_id = document.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));

        for (page_number, page_id) in pages {
            let media_box = media_box(&document, page_id);
            let layout = stamp_layout(media_box, &encoded);
            let stamp = stamp_content(&layout, &encoded)?;
            let stamp_id = document.add_object(Stream::new(Dictionary::new(), stamp));

            let mut resources = effective_resources(&document, page_id);
            add_named_resource(&document, &mut resources, "Font", FONT_RESOURCE, font_id);
            add_named_resource(&document, &mut resources, "ExtGState", GSTATE_RESOURCE, gstate_id);

            let mut contents = vec![Object::Reference(save_id)];
            contents.extend(existing_contents(&document, page_id));
            contents.push(Object::Reference(stamp_id));

            let page = document
                .get_dictionary_mut(page_id)
                .map_err(|err| RenderError::Pdf(format!("page {page_number} unreadable: {err}")))?;
            page.set("Resources", Object::Dictionary(resources));
            page.set("Contents", Object::Array(contents));

            debug!(page_number, font_size = layout.font_size, "page stamped");
        }

        let mut output = Vec::new();
        document
            .save_to(&mut output)
            .map_err(|err| RenderError::Pdf(format!("failed to serialise PDF: {err}")))?;

        debug!(output_bytes = output.len(), "PDF watermark complete");
        Ok(output)
    }
}

/// Build the stamp content stream. The leading `Q` closes the `q` that was
/// prepended to the page's own content.
fn stamp_content(layout: &StampLayout, encoded_label: &[u8]) -> Result<Vec<u8>, RenderError> {
    let (sin, cos) = std::f32::consts::FRAC_PI_4.sin_cos();

    let mut operations = vec![
        Operation::new("Q", vec![]),
        Operation::new("q", vec![]),
        Operation::new("gs", vec![Object::Name(GSTATE_RESOURCE.as_bytes().to_vec())]),
        Operation::new(
            "rg",
            vec![STAMP_GRAY.into(), STAMP_GRAY.into(), STAMP_GRAY.into()],
        ),
    ];

    for placement in &layout.placements {
        operations.push(Operation::new("BT", vec![]));
        operations.push(Operation::new(
            "Tf",
            vec![
                Object::Name(FONT_RESOURCE.as_bytes().to_vec()),
                layout.font_size.into(),
            ],
        ));
        operations.push(Operation::new(
            "Tm",
            vec![
                cos.into(),
                sin.into(),
                (-sin).into(),
                cos.into(),
                placement.x.into(),
                placement.y.into(),
            ],
        ));
        operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(encoded_label.to_vec())],
        ));
        operations.push(Operation::new("ET", vec![]));
    }
    operations.push(Operation::new("Q", vec![]));

    Content { operations }
        .encode()
        .map_err(|err| RenderError::Pdf(format!("failed to encode stamp: {err}")))
}

/// Look up a page attribute, following /Parent for inheritable keys.
fn inherited<'a>(document: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let node = document.get_dictionary(current).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        current = node.get(b"Parent").and_then(Object::as_reference).ok()?;
    }
    None
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => document.get_object(*id).unwrap_or(object),
        other => other,
    }
}

fn media_box(document: &Document, page_id: ObjectId) -> [f32; 4] {
    let Some(object) = inherited(document, page_id, b"MediaBox") else {
        return DEFAULT_MEDIA_BOX;
    };
    let Ok(values) = resolve(document, object).as_array() else {
        return DEFAULT_MEDIA_BOX;
    };
    let numbers: Vec<f32> = values
        .iter()
        .filter_map(|v| resolve(document, v).as_float().ok())
        .collect();
    match numbers.as_slice() {
        [llx, lly, urx, ury] if (urx - llx).abs() > 0.0 && (ury - lly).abs() > 0.0 => {
            [*llx, *lly, *urx, *ury]
        }
        _ => DEFAULT_MEDIA_BOX,
    }
}

/// The page's resource dictionary as an owned copy, whether it is inline,
/// referenced, or inherited from the page tree.
fn effective_resources(document: &Document, page_id: ObjectId) -> Dictionary {
    inherited(document, page_id, b"Resources")
        .and_then(|object| resolve(document, object).as_dict().ok())
        .cloned()
        .unwrap_or_default()
}

/// Add `name → id` to the sub-dictionary `category` of `resources`,
/// materialising a referenced sub-dictionary inline first.
fn add_named_resource(
    document: &Document,
    resources: &mut Dictionary,
    category: &str,
    name: &str,
    id: ObjectId,
) {
    let mut entries = resources
        .get(category.as_bytes())
        .ok()
        .and_then(|object| resolve(document, object).as_dict().ok())
        .cloned()
        .unwrap_or_default();
    entries.set(name, Object::Reference(id));
    resources.set(category, Object::Dictionary(entries));
}

/// References to the page's current content streams, in drawing order.
fn existing_contents(document: &Document, page_id: ObjectId) -> Vec<Object> {
    let Some(contents) = document
        .get_dictionary(page_id)
        .ok()
        .and_then(|page| page.get(b"Contents").ok())
    else {
        return Vec::new();
    };

    match contents {
        Object::Array(items) => items.clone(),
        Object::Reference(id) => match document.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        _ => Vec::new(),
    }
}
