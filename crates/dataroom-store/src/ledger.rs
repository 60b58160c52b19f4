// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Access ledger: one row per view or download, plus duration heartbeats.
//
// Recording an access and the nda_accepted → active promotion it may
// trigger commit in one transaction.

use chrono::{SubsecRound, Utc};
use rusqlite::{OptionalExtension, params};
use tracing::{debug, info, instrument};

use dataroom_core::error::{DataroomError, Result};
use dataroom_core::{
    AccessAction, AccessEvent, AccessEventId, AccessRequest, DocumentId, InvestorId, StatusEvent,
};

use crate::db::{Database, corrupt, db_err, time_column, timestamp, uuid_column};
use crate::investors::apply_event;

const COLUMNS: &str =
    "id, investor_id, document_id, action, started_at, duration_secs, ip_address, user_agent";

fn event_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccessEvent> {
    let action: String = row.get(3)?;
    Ok(AccessEvent {
        id: AccessEventId(uuid_column(row, 0)?),
        investor_id: InvestorId(uuid_column(row, 1)?),
        document_id: DocumentId(uuid_column(row, 2)?),
        action: AccessAction::parse(&action)
            .ok_or_else(|| corrupt(3, format!("unknown action {action:?}")))?,
        started_at: time_column(row, 4)?,
        duration_secs: row.get(5)?,
        ip_address: row.get(6)?,
        user_agent: row.get(7)?,
    })
}

impl Database {
    /// Append an access event (duration 0, started now) and promote the
    /// investor from `nda_accepted` to `active` if this is their first.
    #[instrument(skip_all, fields(
        investor_id = %request.investor_id,
        document_id = %request.document_id,
        action = request.action.as_str(),
    ))]
    pub fn log_access(&self, request: &AccessRequest) -> Result<AccessEvent> {
        let event = AccessEvent {
            id: AccessEventId::new(),
            investor_id: request.investor_id,
            document_id: request.document_id,
            action: request.action,
            // Stored at microsecond precision.
            started_at: Utc::now().trunc_subsecs(6),
            duration_secs: 0,
            ip_address: request.client.ip_address.clone(),
            user_agent: request.client.user_agent.clone(),
        };

        let tx = self.conn.unchecked_transaction().map_err(db_err)?;
        tx.execute(
            &format!("INSERT INTO access_events ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                event.id.to_string(),
                event.investor_id.to_string(),
                event.document_id.to_string(),
                event.action.as_str(),
                timestamp(&event.started_at),
                event.duration_secs,
                event.ip_address,
                event.user_agent,
            ],
        )
        .map_err(db_err)?;
        let (from, to) = apply_event(&tx, request.investor_id, StatusEvent::DocumentAccessed)?;
        tx.commit().map_err(db_err)?;

        if from != to {
            info!(from = %from, to = %to, "first access promoted investor");
        }
        debug!(access_event_id = %event.id, "access recorded");
        Ok(event)
    }

    /// Overwrite the duration of an event. The latest report wins, even if
    /// it is smaller than an earlier one.
    #[instrument(skip(self))]
    pub fn update_duration(&self, id: AccessEventId, duration_secs: i64) -> Result<()> {
        if duration_secs < 0 {
            return Err(DataroomError::BadRequest(
                "duration must not be negative".into(),
            ));
        }
        let changed = self
            .conn
            .execute(
                "UPDATE access_events SET duration_secs = ?1 WHERE id = ?2",
                params![duration_secs, id.to_string()],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(DataroomError::NotFound(format!("access event {id}")));
        }
        Ok(())
    }

    pub fn access_event(&self, id: AccessEventId) -> Result<AccessEvent> {
        self.conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM access_events WHERE id = ?1"),
                params![id.to_string()],
                event_from_row,
            )
            .optional()
            .map_err(db_err)?
            .ok_or_else(|| DataroomError::NotFound(format!("access event {id}")))
    }

    /// The whole ledger, oldest first.
    pub fn access_events(&self) -> Result<Vec<AccessEvent>> {
        self.query_events("", params![])
    }

    pub fn access_events_for_document(&self, id: DocumentId) -> Result<Vec<AccessEvent>> {
        self.query_events("WHERE document_id = ?1", params![id.to_string()])
    }

    /// Events of `action` (all actions when `None`).
    pub fn count_access(&self, action: Option<AccessAction>) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM access_events WHERE ?1 IS NULL OR action = ?1",
                params![action.map(|a| a.as_str())],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(n as u64)
    }

    /// Newest first: up to `limit` events of `action` after skipping `offset`.
    pub fn access_events_page(
        &self,
        action: Option<AccessAction>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<AccessEvent>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM access_events
                  WHERE ?1 IS NULL OR action = ?1
                  ORDER BY started_at DESC, rowid DESC
                  LIMIT ?2 OFFSET ?3"
            ))
            .map_err(db_err)?;
        let bound = |n: u64| i64::try_from(n).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(
                params![action.map(|a| a.as_str()), bound(limit), bound(offset)],
                event_from_row,
            )
            .map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }

    fn query_events(&self, filter: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<AccessEvent>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {COLUMNS} FROM access_events {filter} ORDER BY started_at, rowid"
            ))
            .map_err(db_err)?;
        let rows = stmt.query_map(args, event_from_row).map_err(db_err)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(db_err)
    }
}
