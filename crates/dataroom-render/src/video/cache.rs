// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Filesystem-backed rendition cache for watermarked videos.
//
// Layout: `<dir>/<documentId>_<viewerKey><ext>`. In-progress encodes live
// next to their final path as `<documentId>_<viewerKey>.<uuid>.partial<ext>`
// and are renamed into place only once complete, so an entry that exists is
// always a whole file.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use dataroom_core::{DocumentId, RenderError, Requester};

/// Viewer discriminator used in cache file names.
///
/// Investors are keyed by their investor id; administrators who are not
/// investors by a digest of their email, so two administrators never share
/// a rendition.
pub fn viewer_key_for(requester: &Requester) -> String {
    match &requester.investor {
        Some(investor) => investor.id.to_string(),
        None => format!("admin-{}", short_digest(&requester.email.to_ascii_lowercase())),
    }
}

fn short_digest(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..8])
}

/// Keep `[A-Za-z0-9_-]` components verbatim; anything else (path
/// separators, dots, spaces) is replaced by its digest.
fn safe_component(component: &str) -> String {
    let safe = !component.is_empty()
        && component
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if safe {
        component.to_string()
    } else {
        short_digest(component)
    }
}

/// Extension of `source` including the dot, or empty.
fn extension_of(source: &Path) -> String {
    source
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct RenditionCache {
    dir: PathBuf,
}

impl RenditionCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic cache path for a (document, viewer) pair, sharing the
    /// source file's extension.
    pub fn entry_path(&self, document_id: DocumentId, viewer_key: &str, source: &Path) -> PathBuf {
        self.dir.join(format!(
            "{document_id}_{}{}",
            safe_component(viewer_key),
            extension_of(source)
        ))
    }

    /// Fresh temporary path for an encode that will land on `entry`.
    pub fn partial_path(&self, entry: &Path) -> PathBuf {
        let stem = entry
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = extension_of(entry);
        self.dir
            .join(format!("{stem}.{}.partial{ext}", uuid::Uuid::new_v4().simple()))
    }

    /// The entry path if a completed rendition is present.
    pub async fn lookup(&self, entry: &Path) -> Option<PathBuf> {
        match tokio::fs::metadata(entry).await {
            Ok(meta) if meta.is_file() => Some(entry.to_path_buf()),
            _ => None,
        }
    }

    pub async fn ensure_dir(&self) -> Result<(), RenderError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| RenderError::Io(format!("cannot create {}: {e}", self.dir.display())))
    }

    /// Delete every rendition (and stray partial) of `document_id`,
    /// whichever viewer it was made for. A missing cache directory is not an
    /// error. Returns the number of files removed.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub async fn invalidate(&self, document_id: DocumentId) -> Result<usize, RenderError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(RenderError::Io(format!("cannot list cache: {e}"))),
        };

        let prefix = format!("{document_id}_");
        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RenderError::Io(format!("cannot list cache: {e}")))?
        {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(&prefix) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                // Raced with another invalidation.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(RenderError::Io(format!(
                        "cannot remove {}: {e}",
                        entry.path().display()
                    )));
                }
            }
            debug!(file = %name.to_string_lossy(), "rendition removed");
        }

        info!(%document_id, removed, "video renditions invalidated");
        Ok(removed)
    }
}
