// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Renderer capability and the MIME-family dispatch table.
//
// The set of renderers is closed: each variant of `Renderer` is one
// watermark strategy, and `RendererTable` is the only place that maps a
// MIME family to a strategy. Adding a format means adding a variant and a
// table entry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dataroom_core::{DocumentId, MimeFamily, RenderError};

use crate::pdf::PdfWatermarker;
use crate::spreadsheet::SpreadsheetWatermarker;
use crate::video::VideoWatermarker;

/// How a renderer wants its source handed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// The whole original in memory.
    Bytes,
    /// A path to the original on disk.
    Path,
}

/// Source handed to a renderer.
#[derive(Debug, Clone, Copy)]
pub enum RenderSource<'a> {
    Bytes(&'a [u8]),
    Path(&'a Path),
}

/// Renderer output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendition {
    /// Fully rendered in memory.
    Bytes(Vec<u8>),
    /// Rendered to a file (a cache entry) to be read or streamed.
    File(PathBuf),
}

/// Everything a renderer needs to produce one viewer's rendition.
#[derive(Debug, Clone, Copy)]
pub struct RenderJob<'a> {
    pub document_id: DocumentId,
    /// Stable viewer discriminator used for cache naming.
    pub viewer_key: &'a str,
    /// Visible watermark payload.
    pub label: &'a str,
    pub source: RenderSource<'a>,
}

/// One watermark strategy.
#[derive(Debug, Clone)]
pub enum Renderer {
    Pdf(PdfWatermarker),
    Spreadsheet(SpreadsheetWatermarker),
    Video(Arc<VideoWatermarker>),
}

impl Renderer {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pdf(_) => "pdf",
            Self::Spreadsheet(_) => "spreadsheet",
            Self::Video(_) => "video",
        }
    }

    pub fn source_kind(&self) -> SourceKind {
        match self {
            Self::Pdf(_) | Self::Spreadsheet(_) => SourceKind::Bytes,
            Self::Video(_) => SourceKind::Path,
        }
    }

    /// Produce the watermarked rendition. The in-memory renderers run on the
    /// blocking pool; the video renderer awaits its encode.
    pub async fn render(&self, job: RenderJob<'_>) -> Result<Rendition, RenderError> {
        match (self, job.source) {
            (Self::Pdf(pdf), RenderSource::Bytes(bytes)) => {
                let pdf = *pdf;
                off_runtime(bytes, job.label, move |source, label| pdf.watermark(source, label)).await
            }
            (Self::Spreadsheet(sheet), RenderSource::Bytes(bytes)) => {
                let sheet = *sheet;
                off_runtime(bytes, job.label, move |source, label| sheet.watermark(source, label)).await
            }
            (Self::Video(video), RenderSource::Path(path)) => video
                .watermark_video(path, job.label, job.document_id, job.viewer_key)
                .await
                .map(Rendition::File),
            (renderer, _) => Err(RenderError::Unsupported(format!(
                "{} renderer given the wrong kind of source",
                renderer.name()
            ))),
        }
    }
}

/// Run a CPU-bound watermark on the blocking pool.
async fn off_runtime<F>(source: &[u8], label: &str, work: F) -> Result<Rendition, RenderError>
where
    F: FnOnce(&[u8], &str) -> Result<Vec<u8>, RenderError> + Send + 'static,
{
    let (source, label) = (source.to_vec(), label.to_string());
    tokio::task::spawn_blocking(move || work(&source, &label))
        .await
        .map_err(|e| RenderError::Io(format!("renderer task failed: {e}")))?
        .map(Rendition::Bytes)
}

/// MIME family → renderer. Families without an entry are served as-is.
#[derive(Debug, Clone, Default)]
pub struct RendererTable {
    renderers: HashMap<MimeFamily, Renderer>,
}

impl RendererTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard table: PDF, spreadsheet, and video.
    pub fn standard(video: Arc<VideoWatermarker>) -> Self {
        Self::new()
            .with(MimeFamily::Pdf, Renderer::Pdf(PdfWatermarker::new()))
            .with(
                MimeFamily::Spreadsheet,
                Renderer::Spreadsheet(SpreadsheetWatermarker::new()),
            )
            .with(MimeFamily::Video, Renderer::Video(video))
    }

    pub fn with(mut self, family: MimeFamily, renderer: Renderer) -> Self {
        self.renderers.insert(family, renderer);
        self
    }

    pub fn lookup(&self, family: MimeFamily) -> Option<&Renderer> {
        self.renderers.get(&family)
    }

    pub fn for_mime(&self, mime: &str) -> Option<&Renderer> {
        self.lookup(MimeFamily::from_mime(mime))
    }

    /// The video renderer, if registered (cache invalidation goes through it).
    pub fn video(&self) -> Option<&Arc<VideoWatermarker>> {
        match self.renderers.get(&MimeFamily::Video) {
            Some(Renderer::Video(video)) => Some(video),
            _ => None,
        }
    }
}
