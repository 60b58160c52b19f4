// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Access to stored originals under the upload directory.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, instrument};

use dataroom_core::Document;
use dataroom_core::error::{DataroomError, Result};

use crate::payload::Payload;

/// Originals live at `<root>/<storage_path>`. A missing or unreadable
/// original is a `Storage` error: there is nothing to fall back to.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a document's bytes. Storage paths must stay inside
    /// the upload directory.
    pub fn path_of(&self, document: &Document) -> Result<PathBuf> {
        let relative = &document.storage_path;
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained || relative.as_os_str().is_empty() {
            return Err(DataroomError::Storage(format!(
                "document {} has an invalid storage path",
                document.id
            )));
        }
        Ok(self.root.join(relative))
    }

    /// Read the whole original.
    #[instrument(skip_all, fields(document_id = %document.id))]
    pub async fn read(&self, document: &Document) -> Result<Vec<u8>> {
        let path = self.path_of(document)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| unavailable(document, &e))?;
        debug!(bytes = bytes.len(), "original read");
        Ok(bytes)
    }

    /// Path of the original after checking it is a readable file.
    pub async fn locate(&self, document: &Document) -> Result<PathBuf> {
        let path = self.path_of(document)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| unavailable(document, &e))?;
        if !metadata.is_file() {
            return Err(DataroomError::Storage(format!(
                "original of document {} is not a file",
                document.id
            )));
        }
        Ok(path)
    }

    /// Open the original for streaming.
    pub async fn open(&self, document: &Document) -> Result<Payload> {
        let path = self.locate(document).await?;
        Payload::open(&path)
            .await
            .map_err(|e| unavailable(document, &e))
    }

    /// Create the file for a new original, with any missing parent
    /// directories. An existing file is never overwritten.
    #[instrument(skip_all, fields(document_id = %document.id))]
    pub async fn create(&self, document: &Document) -> Result<tokio::fs::File> {
        let path = self.path_of(document)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        debug!(path = %path.display(), "original created");
        Ok(file)
    }

    /// Delete the original. Returns `false` if it was already gone.
    #[instrument(skip_all, fields(document_id = %document.id))]
    pub async fn remove(&self, document: &Document) -> Result<bool> {
        let path = self.path_of(document)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

fn unavailable(document: &Document, e: &std::io::Error) -> DataroomError {
    DataroomError::Storage(format!("original of document {}: {e}", document.id))
}
