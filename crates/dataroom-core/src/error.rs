// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for the dataroom engine.

use std::time::Duration;

use thiserror::Error;

/// Failure inside one of the watermark renderers.
///
/// `Clone` so that the outcome of a single in-flight video encode can be
/// handed to every caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("PDF watermark failed: {0}")]
    Pdf(String),

    #[error("spreadsheet watermark failed: {0}")]
    Spreadsheet(String),

    #[error("video watermark failed: {0}")]
    Video(String),

    #[error("video encode exceeded its {}s budget", .budget.as_secs())]
    EncodeTimeout { budget: Duration },

    #[error("video encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("rendition I/O failed: {0}")]
    Io(String),

    #[error("no renderer registered for {0}")]
    Unsupported(String),
}

/// Top-level error type for all dataroom operations.
#[derive(Debug, Error)]
pub enum DataroomError {
    // -- Rejections (surfaced to the caller with minimal detail) --
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("bad request: {0}")]
    BadRequest(String),

    // -- Rendering (recovered by the dispatcher's fallback path) --
    #[error(transparent)]
    Render(#[from] RenderError),

    // -- Storage / persistence --
    #[error("stored document unavailable: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl DataroomError {
    /// Whether this error is a rejection of the request rather than a fault
    /// on our side.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Forbidden(_) | Self::Unauthenticated | Self::BadRequest(_)
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, DataroomError>;
