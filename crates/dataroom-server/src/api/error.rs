// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP mapping of `DataroomError`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use dataroom_core::DataroomError;

/// Error returned by every handler. Rejections carry a short message;
/// server faults are logged and answered with a fixed body.
#[derive(Debug)]
pub struct ApiError(pub DataroomError);

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl From<DataroomError> for ApiError {
    fn from(e: DataroomError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DataroomError::Unauthenticated => StatusCode::UNAUTHORIZED,
            DataroomError::Forbidden(_) => StatusCode::FORBIDDEN,
            DataroomError::NotFound(_) => StatusCode::NOT_FOUND,
            DataroomError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match &self.0 {
            DataroomError::Unauthenticated => "Unauthorized".into(),
            DataroomError::Forbidden(_) => "Forbidden".into(),
            DataroomError::NotFound(_) => "Not found".into(),
            DataroomError::BadRequest(reason) => reason.clone(),
            _ => "Internal server error".into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if !self.0.is_client_error() {
            error!(error = %self.0, "request failed");
        }
        let status = self.status();
        let body = Json(ErrorBody {
            error: self.message(),
        });
        (status, body).into_response()
    }
}
