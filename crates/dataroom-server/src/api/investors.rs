// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// NDA consent and the administrator's investor list.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use dataroom_core::{DataroomError, InvestorId, InvestorRecord, InvestorStatus};
use dataroom_delivery::{AccessPolicy, blocking};

use super::auth::{Viewer, client_metadata};
use super::error::ApiError;
use crate::services::app_services::AppServices;

#[derive(Debug, Deserialize)]
pub struct NdaConsent {
    #[serde(default)]
    accepted: bool,
}

/// `POST /nda`: the requesting investor accepts the NDA.
pub async fn accept_nda(
    State(state): State<AppServices>,
    headers: HeaderMap,
    Viewer(requester): Viewer,
    Json(consent): Json<NdaConsent>,
) -> Result<Json<Value>, ApiError> {
    let investor = requester
        .investor
        .ok_or_else(|| DataroomError::NotFound(format!("investor {}", requester.email)))?;
    if investor.nda_accepted_at.is_some() {
        return Ok(Json(json!({ "message": "NDA already accepted", "status": investor.status })));
    }
    if matches!(investor.status, InvestorStatus::Dropped | InvestorStatus::Revoked) {
        return Err(DataroomError::Forbidden("access has been revoked".into()).into());
    }
    if !consent.accepted {
        return Err(DataroomError::BadRequest("You must accept the NDA to proceed".into()).into());
    }

    let client = client_metadata(&headers);
    let db = state.db.clone();
    let id = investor.id;
    let status = blocking(move || db.lock().accept_nda(id)).await?;
    info!(
        investor_id = %id,
        ip = client.ip_address.as_deref().unwrap_or("unknown"),
        user_agent = client.user_agent.as_deref().unwrap_or("unknown"),
        "NDA accepted"
    );
    Ok(Json(json!({ "message": "NDA accepted", "status": status })))
}

/// `GET /investors` (administrators only)
pub async fn list(
    State(state): State<AppServices>,
    Viewer(requester): Viewer,
) -> Result<Json<Vec<InvestorRecord>>, ApiError> {
    AccessPolicy::require_admin(&requester)?;
    let db = state.db.clone();
    Ok(Json(blocking(move || db.lock().investors()).await?))
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    status: String,
}

/// `PATCH /investors/{id}` (administrators only): set one of the manual
/// statuses.
pub async fn update(
    State(state): State<AppServices>,
    Path(id): Path<String>,
    Viewer(requester): Viewer,
    Json(change): Json<StatusChange>,
) -> Result<Json<InvestorRecord>, ApiError> {
    AccessPolicy::require_admin(&requester)?;
    let id = InvestorId::parse(&id).ok_or_else(|| DataroomError::NotFound(format!("investor {id}")))?;
    let status = InvestorStatus::parse(&change.status)
        .ok_or_else(|| DataroomError::BadRequest(format!("unknown status {:?}", change.status)))?;

    let db = state.db.clone();
    let record = blocking(move || {
        let guard = db.lock();
        guard.set_manual_status(id, status)?;
        guard.investor(id)
    })
    .await?;
    info!(investor_id = %id, status = %record.status, by = %requester.email, "investor status set");
    Ok(Json(record))
}
