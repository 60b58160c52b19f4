// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// View-duration heartbeats and the CSV export of the access ledger.

use axum::Json;
use axum::extract::State;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::IntoResponse;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::debug;

use dataroom_core::{AccessEventId, DataroomError};
use dataroom_delivery::{AccessPolicy, AccessRecorder, blocking};
use dataroom_store::export_filename;

use super::auth::Viewer;
use super::error::ApiError;
use crate::services::app_services::AppServices;

/// A parsed heartbeat body.
#[derive(Debug, PartialEq)]
struct DurationUpdate {
    id: AccessEventId,
    duration_secs: i64,
}

/// Accepts `accessLogId` or `accessEventId`, and `duration` or
/// `durationSeconds`. Fractional seconds are truncated.
fn parse_update(body: &Value) -> Result<DurationUpdate, DataroomError> {
    // A null under the first spelling falls through to the second.
    let field = |names: [&str; 2]| names.iter().find_map(|n| body.get(*n).filter(|v| !v.is_null()));

    let raw_id = field(["accessLogId", "accessEventId"])
        .ok_or_else(|| DataroomError::BadRequest("accessLogId is required".into()))?;
    let raw_id = raw_id
        .as_str()
        .ok_or_else(|| DataroomError::BadRequest("accessLogId must be a string".into()))?;

    let duration = field(["duration", "durationSeconds"])
        .ok_or_else(|| DataroomError::BadRequest("duration is required".into()))?;
    let duration_secs = match (duration.as_i64(), duration.as_f64()) {
        (Some(whole), _) => whole,
        (None, Some(real)) if real.is_finite() => real.trunc() as i64,
        _ => return Err(DataroomError::BadRequest("duration must be a number".into())),
    };

    // An id that cannot exist is reported like one that does not.
    let id = AccessEventId::parse(raw_id)
        .ok_or_else(|| DataroomError::NotFound(format!("access event {raw_id}")))?;

    Ok(DurationUpdate { id, duration_secs })
}

/// `POST /tracking`
pub async fn update_duration(
    State(state): State<AppServices>,
    Viewer(_requester): Viewer,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let update = parse_update(&body)?;
    debug!(event = %update.id, secs = update.duration_secs, "view heartbeat");
    let db = state.db.clone();
    blocking(move || db.update_duration(update.id, update.duration_secs)).await?;
    Ok(Json(json!({ "success": true })))
}

/// `GET /tracking/export` (administrators only)
pub async fn export(
    State(state): State<AppServices>,
    Viewer(requester): Viewer,
) -> Result<impl IntoResponse, ApiError> {
    AccessPolicy::require_admin(&requester)?;
    let db = state.db.clone();
    let csv = blocking(move || db.lock().export_access_log_csv()).await?;
    let disposition = format!("attachment; filename=\"{}\"", export_filename(Utc::now()));
    Ok((
        [(CONTENT_TYPE, "text/csv".to_string()), (CONTENT_DISPOSITION, disposition)],
        csv,
    ))
}
