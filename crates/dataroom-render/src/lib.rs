// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// dataroom-render: Per-viewer watermark renderers for the dataroom.
//
// Provides the PDF stamp, the spreadsheet banner/header rewrite, and the
// video overlay encoder with its on-disk rendition cache, all selected
// through one MIME-family dispatch table.

pub mod pdf;
pub mod renderer;
pub mod spreadsheet;
pub mod video;

// Re-export the primary structs so callers can use `dataroom_render::PdfWatermarker` etc.
pub use pdf::PdfWatermarker;
pub use renderer::{RenderJob, RenderSource, Renderer, RendererTable, Rendition, SourceKind};
pub use spreadsheet::SpreadsheetWatermarker;
pub use video::{OverlayEncoder, RenditionCache, VideoWatermarker, viewer_key_for};
