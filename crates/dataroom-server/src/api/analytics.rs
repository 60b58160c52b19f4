// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

use axum::Json;
use axum::extract::{Query, State};
use chrono::Utc;
use serde::Deserialize;

use dataroom_core::AccessAction;
use dataroom_delivery::{AccessPolicy, blocking};
use dataroom_store::{ActivityPage, AnalyticsReport, DEFAULT_ACTIVITY_DAYS, DEFAULT_PAGE_SIZE};

use super::auth::Viewer;
use super::error::ApiError;
use crate::services::app_services::AppServices;

/// `GET /analytics` (administrators only)
pub async fn report(
    State(state): State<AppServices>,
    Viewer(requester): Viewer,
) -> Result<Json<AnalyticsReport>, ApiError> {
    AccessPolicy::require_admin(&requester)?;
    let db = state.db.clone();
    let report = blocking(move || db.lock().analytics_report(Utc::now(), DEFAULT_ACTIVITY_DAYS)).await?;
    Ok(Json(report))
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    page: Option<u64>,
    limit: Option<u64>,
    action: Option<String>,
}

impl ActivityQuery {
    /// Only `view` and `download` filter; any other value lists everything.
    fn action(&self) -> Option<AccessAction> {
        self.action.as_deref().and_then(AccessAction::parse)
    }
}

/// `GET /activity?page=&limit=&action=` (administrators only)
pub async fn activity(
    State(state): State<AppServices>,
    Query(query): Query<ActivityQuery>,
    Viewer(requester): Viewer,
) -> Result<Json<ActivityPage>, ApiError> {
    AccessPolicy::require_admin(&requester)?;
    let action = query.action();
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    let db = state.db.clone();
    let page = blocking(move || db.lock().activity_page(action, page, limit)).await?;
    Ok(Json(page))
}
