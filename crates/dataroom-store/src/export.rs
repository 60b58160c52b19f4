// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// CSV export of the access ledger.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{info, instrument};

use dataroom_core::error::Result;

use crate::db::{Database, db_err, time_column};

pub const CSV_HEADER: &str =
    "Date,Investor Email,Investor Name,File Name,Category,Action,Duration (seconds),IP Address";

/// Quote a field if it contains a delimiter, a quote, or a line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

struct ExportRow {
    started_at: DateTime<Utc>,
    email: String,
    investor_name: Option<String>,
    file_name: String,
    category: String,
    action: String,
    duration_secs: i64,
    ip_address: Option<String>,
}

impl ExportRow {
    fn line(&self) -> String {
        [
            self.started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            csv_field(&self.email),
            csv_field(self.investor_name.as_deref().unwrap_or("")),
            csv_field(&self.file_name),
            csv_field(&self.category),
            csv_field(&self.action),
            self.duration_secs.to_string(),
            csv_field(self.ip_address.as_deref().unwrap_or("")),
        ]
        .join(",")
    }
}

/// Suggested download name for an export taken at `now`.
pub fn export_filename(now: DateTime<Utc>) -> String {
    format!("dataroom-access-logs-{}.csv", now.format("%Y-%m-%d"))
}

impl Database {
    /// Every access event joined with its investor and file, newest first.
    #[instrument(skip(self))]
    pub fn export_access_log_csv(&self) -> Result<String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT e.started_at, i.email, i.name, d.name, d.category,
                        e.action, e.duration_secs, e.ip_address
                   FROM access_events e
                   JOIN investors i ON i.id = e.investor_id
                   JOIN documents d ON d.id = e.document_id
                  ORDER BY e.started_at DESC, e.rowid DESC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ExportRow {
                    started_at: time_column(row, 0)?,
                    email: row.get(1)?,
                    investor_name: row.get(2)?,
                    file_name: row.get(3)?,
                    category: row.get(4)?,
                    action: row.get(5)?,
                    duration_secs: row.get(6)?,
                    ip_address: row.get(7)?,
                })
            })
            .map_err(db_err)?;

        let mut lines = vec![CSV_HEADER.to_string()];
        for row in rows {
            lines.push(row.map_err(db_err)?.line());
        }
        info!(rows = lines.len() - 1, "access log exported");
        Ok(lines.join("\n"))
    }
}
