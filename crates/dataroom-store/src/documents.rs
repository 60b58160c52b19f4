// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document catalog.

use std::path::PathBuf;

use rusqlite::{OptionalExtension, params};
use tracing::{info, instrument};

use dataroom_core::error::{DataroomError, Result};
use dataroom_core::{Document, DocumentId};

use crate::db::{Database, db_err, time_column, timestamp, uuid_column};

const COLUMNS: &str = "id, name, mime_type, size, storage_path, category, uploaded_at";

fn document_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    let size: i64 = row.get(3)?;
    let storage_path: String = row.get(4)?;
    Ok(Document {
        id: DocumentId(uuid_column(row, 0)?),
        name: row.get(1)?,
        mime_type: row.get(2)?,
        size: u64::try_from(size).unwrap_or(0),
        storage_path: PathBuf::from(storage_path),
        category: row.get(5)?,
        uploaded_at: time_column(row, 6)?,
    })
}

impl Database {
    #[instrument(skip_all, fields(document_id = %document.id, mime = %document.mime_type))]
    pub fn insert_document(&self, document: &Document) -> Result<()> {
        let size = i64::try_from(document.size)
            .map_err(|_| DataroomError::BadRequest("document too large".into()))?;
        self.conn
            .execute(
                &format!("INSERT INTO documents ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    document.id.to_string(),
                    document.name,
                    document.mime_type,
                    size,
                    document.storage_path.to_string_lossy(),
                    document.category,
                    timestamp(&document.uploaded_at),
                ],
            )
            .map_err(db_err)?;
        info!("document catalogued");
        Ok(())
    }

    /// Fetch one document; `NotFound` if there is no such record.
    pub fn document(&self, id: DocumentId) -> Result<Document> {
        self.conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM documents WHERE id = ?1"),
                params![id.to_string()],
                document_from_row,
            )
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| DataroomError::NotFound(format!("document {id}")))
    }

    /// Every document, newest upload first.
    pub fn documents(&self) -> Result<Vec<Document>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM documents ORDER BY uploaded_at DESC"
            ))
            .map_err(db_err)?;
        let rows = stmt.query_map([], document_from_row).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Remove the record and its access events. Returns `false` if it was
    /// already gone.
    #[instrument(skip(self))]
    pub fn delete_document(&self, id: DocumentId) -> Result<bool> {
        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        let key = id.to_string();
        tx.execute("DELETE FROM access_events WHERE document_id = ?1", params![key])
            .map_err(db_err)?;
        let removed = tx
            .execute("DELETE FROM documents WHERE id = ?1", params![key])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        if removed > 0 {
            info!("document record deleted");
        }
        Ok(removed > 0)
    }
}
