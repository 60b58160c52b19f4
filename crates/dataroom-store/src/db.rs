// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SQLite database handle and schema.
//
// Schema:
//   documents(
//     id           TEXT PRIMARY KEY,     -- UUID
//     name         TEXT NOT NULL,        -- display name
//     mime_type    TEXT NOT NULL,
//     size         INTEGER NOT NULL,     -- bytes
//     storage_path TEXT NOT NULL,        -- relative to the upload dir
//     category     TEXT NOT NULL,
//     uploaded_at  TEXT NOT NULL         -- RFC 3339, UTC
//   )
//   investors(
//     id              TEXT PRIMARY KEY,
//     email           TEXT NOT NULL UNIQUE, -- lowercased
//     name            TEXT,
//     status          TEXT NOT NULL,        -- InvestorStatus::as_str
//     nda_accepted_at TEXT
//   )
//   access_events(
//     id            TEXT PRIMARY KEY,
//     investor_id   TEXT NOT NULL REFERENCES investors(id) ON DELETE CASCADE,
//     document_id   TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
//     action        TEXT NOT NULL,      -- "view" | "download"
//     started_at    TEXT NOT NULL,
//     duration_secs INTEGER NOT NULL,   -- last reported heartbeat
//     ip_address    TEXT,
//     user_agent    TEXT
//   )

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use rusqlite::types::Type;
use tracing::{debug, instrument};
use uuid::Uuid;

use dataroom_core::error::{DataroomError, Result};

// ---------------------------------------------------------------------------
// Local error helpers
// ---------------------------------------------------------------------------

/// Convert a `rusqlite::Error` into a `DataroomError::Database`.
pub(crate) fn db_err(e: rusqlite::Error) -> DataroomError {
    DataroomError::Database(e.to_string())
}

/// A stored value that does not parse back into its domain type.
pub(crate) fn corrupt(column: usize, message: impl Into<String>) -> rusqlite::Error {
    let message: String = message.into();
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

// ---------------------------------------------------------------------------
// Column codecs
// ---------------------------------------------------------------------------

/// Timestamps are stored at microsecond precision with a `Z` suffix so that
/// text ordering matches time ordering.
pub(crate) fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn uuid_column(row: &rusqlite::Row<'_>, column: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(column)?;
    Uuid::parse_str(&text).map_err(|e| corrupt(column, format!("bad id {text:?}: {e}")))
}

pub(crate) fn time_column(row: &rusqlite::Row<'_>, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(column)?;
    parse_time(&text).map_err(|e| corrupt(column, e))
}

pub(crate) fn optional_time_column(
    row: &rusqlite::Row<'_>,
    column: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(column)?;
    text.map(|t| parse_time(&t).map_err(|e| corrupt(column, e)))
        .transpose()
}

fn parse_time(text: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp {text:?}: {e}"))
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS documents (
        id           TEXT    PRIMARY KEY,
        name         TEXT    NOT NULL,
        mime_type    TEXT    NOT NULL,
        size         INTEGER NOT NULL,
        storage_path TEXT    NOT NULL,
        category     TEXT    NOT NULL,
        uploaded_at  TEXT    NOT NULL
    );
    CREATE TABLE IF NOT EXISTS investors (
        id              TEXT PRIMARY KEY,
        email           TEXT NOT NULL UNIQUE,
        name            TEXT,
        status          TEXT NOT NULL,
        nda_accepted_at TEXT
    );
    CREATE TABLE IF NOT EXISTS access_events (
        id            TEXT    PRIMARY KEY,
        investor_id   TEXT    NOT NULL REFERENCES investors(id) ON DELETE CASCADE,
        document_id   TEXT    NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        action        TEXT    NOT NULL,
        started_at    TEXT    NOT NULL,
        duration_secs INTEGER NOT NULL DEFAULT 0,
        ip_address    TEXT,
        user_agent    TEXT
    );
    CREATE INDEX IF NOT EXISTS access_events_by_document ON access_events(document_id);
    CREATE INDEX IF NOT EXISTS access_events_by_investor ON access_events(investor_id);
    CREATE INDEX IF NOT EXISTS access_events_by_start    ON access_events(started_at);
";

/// The dataroom database: catalog, investors, and access ledger.
pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    /// Open (or create) the database at `path`, with WAL and foreign keys
    /// enabled and the schema applied.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        let db = Self::init(conn)?;
        debug!("database opened");
        Ok(db)
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        let db = Self::init(conn)?;
        debug!("in-memory database opened");
        Ok(db)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self { conn })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::PathBuf;

    use chrono::{DateTime, Utc};

    use dataroom_core::{Document, DocumentId, InvestorId, InvestorRecord, InvestorStatus};

    use super::Database;

    pub fn db() -> Database {
        Database::open_in_memory().expect("open in-memory database")
    }

    pub fn document(name: &str, mime: &str, category: &str) -> Document {
        Document {
            id: DocumentId::new(),
            name: name.into(),
            mime_type: mime.into(),
            size: 1024,
            storage_path: PathBuf::from(format!("{}-{name}", uuid::Uuid::new_v4())),
            category: category.into(),
            uploaded_at: at("2026-03-01T09:00:00Z"),
        }
    }

    pub fn investor(email: &str, status: InvestorStatus) -> InvestorRecord {
        InvestorRecord {
            id: InvestorId::new(),
            email: email.into(),
            name: None,
            status,
            nda_accepted_at: None,
        }
    }

    pub fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }
}
