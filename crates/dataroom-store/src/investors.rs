// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Investor records and persisted status transitions.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{info, instrument};

use dataroom_core::error::{DataroomError, Result};
use dataroom_core::{InvestorId, InvestorRecord, InvestorStatus, StatusEvent, advance};

use crate::db::{Database, corrupt, db_err, optional_time_column, timestamp, uuid_column};

const COLUMNS: &str = "id, email, name, status, nda_accepted_at";

fn investor_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<InvestorRecord> {
    let status: String = row.get(3)?;
    Ok(InvestorRecord {
        id: InvestorId(uuid_column(row, 0)?),
        email: row.get(1)?,
        name: row.get(2)?,
        status: InvestorStatus::parse(&status)
            .ok_or_else(|| corrupt(3, format!("unknown status {status:?}")))?,
        nda_accepted_at: optional_time_column(row, 4)?,
    })
}

fn load(conn: &Connection, id: InvestorId) -> Result<InvestorRecord> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM investors WHERE id = ?1"),
        params![id.to_string()],
        investor_from_row,
    )
    .optional()
    .map_err(db_err)?
    .ok_or_else(|| DataroomError::NotFound(format!("investor {id}")))
}

/// Apply `event` to the stored status on `conn` (which may be inside a
/// caller's transaction). The write is a compare-and-set on the status that
/// was read, so a concurrent change is never overwritten.
pub(crate) fn apply_event(
    conn: &Connection,
    id: InvestorId,
    event: StatusEvent,
) -> Result<(InvestorStatus, InvestorStatus)> {
    let current = load(conn, id)?.status;
    let next = advance(current, event);
    if next == current {
        return Ok((current, next));
    }

    let nda_accepted_at = matches!(event, StatusEvent::NdaAccepted).then(|| timestamp(&Utc::now()));
    let changed = conn
        .execute(
            "UPDATE investors
                SET status = ?1,
                    nda_accepted_at = COALESCE(?2, nda_accepted_at)
              WHERE id = ?3 AND status = ?4",
            params![next.as_str(), nda_accepted_at, id.to_string(), current.as_str()],
        )
        .map_err(db_err)?;
    if changed == 0 {
        // Lost the race; report whatever is stored now.
        let stored = load(conn, id)?.status;
        return Ok((current, stored));
    }
    Ok((current, next))
}

impl Database {
    /// Store a new investor. Emails are kept lowercased and unique.
    #[instrument(skip_all, fields(investor_id = %investor.id, status = %investor.status))]
    pub fn insert_investor(&self, investor: &InvestorRecord) -> Result<()> {
        self.conn
            .execute(
                &format!("INSERT INTO investors ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
                params![
                    investor.id.to_string(),
                    investor.email.trim().to_lowercase(),
                    investor.name,
                    investor.status.as_str(),
                    investor.nda_accepted_at.as_ref().map(timestamp),
                ],
            )
            .map_err(db_err)?;
        info!("investor added");
        Ok(())
    }

    pub fn investor(&self, id: InvestorId) -> Result<InvestorRecord> {
        load(&self.conn, id)
    }

    /// Case-insensitive lookup by email.
    pub fn investor_by_email(&self, email: &str) -> Result<Option<InvestorRecord>> {
        self.conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM investors WHERE email = ?1"),
                params![email.trim().to_lowercase()],
                investor_from_row,
            )
            .optional()
            .map_err(db_err)
    }

    pub fn investors(&self) -> Result<Vec<InvestorRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {COLUMNS} FROM investors ORDER BY email"))
            .map_err(db_err)?;
        let rows = stmt.query_map([], investor_from_row).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    /// Persist the transition for `event` and return the resulting status.
    #[instrument(skip(self))]
    pub fn apply_status_event(&self, id: InvestorId, event: StatusEvent) -> Result<InvestorStatus> {
        let (from, to) = apply_event(&self.conn, id, event)?;
        if from != to {
            info!(from = %from, to = %to, "investor status changed");
        }
        Ok(to)
    }

    pub fn accept_nda(&self, id: InvestorId) -> Result<InvestorStatus> {
        self.apply_status_event(id, StatusEvent::NdaAccepted)
    }

    /// Administrator override; only the manual statuses are accepted.
    pub fn set_manual_status(&self, id: InvestorId, status: InvestorStatus) -> Result<InvestorStatus> {
        if !status.is_manual() {
            return Err(DataroomError::BadRequest(format!(
                "status {status} cannot be set manually"
            )));
        }
        self.apply_status_event(id, StatusEvent::ManualSet(status))
    }
}
