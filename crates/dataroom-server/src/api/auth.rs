// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Identity at the HTTP boundary.
//
// Sessions are issued upstream; the proxy in front of this service passes
// the authenticated email in `X-Dataroom-User`.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use dataroom_core::{ClientMetadata, DataroomError, Requester};

use super::error::ApiError;
use crate::services::app_services::AppServices;

pub const USER_HEADER: &str = "x-dataroom-user";

/// The resolved requester. Rejects with 401 when the header is missing and
/// 403 when the email has no dataroom role.
#[derive(Debug, Clone)]
pub struct Viewer(pub Requester);

impl FromRequestParts<AppServices> for Viewer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppServices) -> Result<Self, Self::Rejection> {
        let email = header(&parts.headers, USER_HEADER).ok_or(DataroomError::Unauthenticated)?;
        let requester = state.policy.resolve(email).await?;
        Ok(Viewer(requester))
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Client IP (first `X-Forwarded-For` hop, else `X-Real-IP`) and user agent.
pub fn client_metadata(headers: &HeaderMap) -> ClientMetadata {
    let forwarded = header(headers, "x-forwarded-for")
        .and_then(|list| list.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    ClientMetadata {
        ip_address: forwarded
            .or_else(|| header(headers, "x-real-ip"))
            .map(str::to_string),
        user_agent: header(headers, "user-agent").map(str::to_string),
    }
}
