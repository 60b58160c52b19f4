// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document routes: listing, metadata, upload, view, download, delete.

use std::path::{Path as FsPath, PathBuf};

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use chrono::{SubsecRound, Utc};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use dataroom_core::{
    AccessAction, DataroomError, DeliveryOptions, Document, DocumentId, is_allowed_upload,
    sort_for_display,
};
use dataroom_delivery::{AccessPolicy, Payload, RenderedOutput, blocking};

use super::auth::{Viewer, client_metadata};
use super::error::ApiError;
use crate::services::app_services::AppServices;

/// Response header carrying the access event id, for heartbeats.
pub const ACCESS_LOG_HEADER: &str = "x-access-log-id";
/// Upload headers. The request body is the file itself and `Content-Type`
/// its MIME type.
pub const FILE_NAME_HEADER: &str = "x-file-name";
pub const CATEGORY_HEADER: &str = "x-file-category";

#[derive(Debug, Default, Deserialize)]
pub struct DeliveryQuery {
    clean: Option<String>,
}

impl DeliveryQuery {
    fn wants_clean(&self) -> bool {
        self.clean.as_deref() == Some("true")
    }
}

fn document_id(raw: &str) -> Result<DocumentId, ApiError> {
    DocumentId::parse(raw)
        .ok_or_else(|| ApiError(DataroomError::NotFound(format!("document {raw}"))))
}

/// `GET /files`
pub async fn list(
    State(state): State<AppServices>,
    Viewer(requester): Viewer,
) -> Result<Json<Vec<Document>>, ApiError> {
    AccessPolicy::authorize_delivery(&requester)?;
    let db = state.db.clone();
    let mut documents = blocking(move || db.lock().documents()).await?;
    sort_for_display(&mut documents);
    Ok(Json(documents))
}

/// `POST /files` (administrators only)
pub async fn upload(
    State(state): State<AppServices>,
    headers: HeaderMap,
    Viewer(requester): Viewer,
    body: Body,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    AccessPolicy::require_admin(&requester)?;
    let text = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let (Some(name), Some(category)) = (text(FILE_NAME_HEADER), text(CATEGORY_HEADER)) else {
        return Err(DataroomError::BadRequest("File and category are required".into()).into());
    };
    let mime = text(CONTENT_TYPE.as_str())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if !is_allowed_upload(&mime) {
        return Err(DataroomError::BadRequest(
            "File type not allowed. Supported: PDF, Excel, Video".into(),
        )
        .into());
    }

    let id = DocumentId::new();
    let mut document = Document {
        id,
        name: name.to_string(),
        mime_type: mime,
        size: 0,
        storage_path: storage_name(id, name),
        category: category.to_string(),
        uploaded_at: Utc::now().trunc_subsecs(6),
    };

    let stored = match receive(&state, &document, body).await {
        Ok(0) => Err(DataroomError::BadRequest("File is empty".into())),
        Ok(size) => {
            document.size = size;
            let db = state.db.clone();
            let record = document.clone();
            blocking(move || db.lock().insert_document(&record)).await
        }
        Err(e) => Err(e),
    };
    if let Err(e) = stored {
        if let Err(cleanup) = state.uploads.remove(&document).await {
            warn!(document_id = %id, error = %cleanup, "partial upload left behind");
        }
        return Err(e.into());
    }

    info!(
        document_id = %id,
        mime = %document.mime_type,
        bytes = document.size,
        category = %document.category,
        "document uploaded"
    );
    Ok((StatusCode::CREATED, Json(document)))
}

/// Stream the request body into a new original and return its size.
async fn receive(state: &AppServices, document: &Document, body: Body) -> Result<u64, DataroomError> {
    let mut file = state.uploads.create(document).await?;
    let mut chunks = body.into_data_stream();
    let mut size = 0u64;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| DataroomError::BadRequest(format!("upload interrupted: {e}")))?;
        file.write_all(&chunk).await?;
        size += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(size)
}

/// `<id><ext>`, keeping the uploaded name's extension when it is short
/// and alphanumeric.
fn storage_name(id: DocumentId, name: &str) -> PathBuf {
    let ext = FsPath::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    PathBuf::from(format!("{id}{ext}"))
}

/// `GET /files/{id}`
pub async fn metadata(
    State(state): State<AppServices>,
    Path(id): Path<String>,
    Viewer(requester): Viewer,
) -> Result<Json<Document>, ApiError> {
    AccessPolicy::authorize_delivery(&requester)?;
    let document = state.dispatcher.document(document_id(&id)?).await?;
    Ok(Json(document))
}

/// `GET /files/{id}/download`
pub async fn download(
    State(state): State<AppServices>,
    Path(id): Path<String>,
    Query(query): Query<DeliveryQuery>,
    headers: HeaderMap,
    viewer: Viewer,
) -> Result<Response, ApiError> {
    deliver(state, &id, &query, &headers, viewer, AccessAction::Download).await
}

/// `GET /files/{id}/view`
pub async fn view(
    State(state): State<AppServices>,
    Path(id): Path<String>,
    Query(query): Query<DeliveryQuery>,
    headers: HeaderMap,
    viewer: Viewer,
) -> Result<Response, ApiError> {
    deliver(state, &id, &query, &headers, viewer, AccessAction::View).await
}

async fn deliver(
    state: AppServices,
    id: &str,
    query: &DeliveryQuery,
    headers: &HeaderMap,
    Viewer(requester): Viewer,
    action: AccessAction,
) -> Result<Response, ApiError> {
    AccessPolicy::authorize_delivery(&requester)?;
    let document = state.dispatcher.document(document_id(id)?).await?;
    let options = DeliveryOptions {
        action: Some(action),
        wants_clean: query.wants_clean(),
        client: client_metadata(headers),
    };
    let output = state.dispatcher.deliver(&document, &requester, &options).await?;
    rendered_response(output, action)
}

/// Headers describe the bytes actually sent, after any fallback. File
/// payloads are streamed in chunks.
fn rendered_response(output: RenderedOutput, action: AccessAction) -> Result<Response, ApiError> {
    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, output.content_type.as_str())
        .header(
            CONTENT_DISPOSITION,
            format!(
                "{}; filename=\"{}\"",
                output.disposition.as_str(),
                header_filename(&output.filename)
            ),
        )
        .header(CONTENT_LENGTH, output.body.len());
    if action == AccessAction::View {
        if let Some(event_id) = output.access_event_id {
            response = response.header(ACCESS_LOG_HEADER, event_id.to_string());
        }
    }
    let body = match output.body {
        Payload::Buffered(bytes) => Body::from(bytes),
        Payload::File { file, .. } => Body::from_stream(ReaderStream::new(file)),
    };
    response
        .body(body)
        .map_err(|e| ApiError(DataroomError::Io(std::io::Error::other(e))))
}

/// Printable ASCII without quotes or backslashes; anything else becomes `_`.
fn header_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() => c,
            _ => '_',
        })
        .collect();
    if cleaned.trim().is_empty() {
        "document".into()
    } else {
        cleaned
    }
}

/// `DELETE /files/{id}` (administrators only)
pub async fn delete(
    State(state): State<AppServices>,
    Path(id): Path<String>,
    Viewer(requester): Viewer,
) -> Result<Json<Value>, ApiError> {
    AccessPolicy::require_admin(&requester)?;
    state.dispatcher.delete_document(document_id(&id)?).await?;
    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_header_safe() {
        assert_eq!(header_filename("Q3 \"final\".pdf"), "Q3 _final_.pdf");
        assert_eq!(header_filename("bilan\u{e9}.xlsx"), "bilan_.xlsx");
        assert_eq!(header_filename("a\r\nb.pdf"), "ab.pdf");
        assert_eq!(header_filename("\n"), "document");
    }

    #[test]
    fn stored_names_keep_only_plain_extensions() {
        let id = DocumentId::new();
        assert_eq!(storage_name(id, "Deck.PDF"), PathBuf::from(format!("{id}.pdf")));
        assert_eq!(storage_name(id, "../../etc/passwd"), PathBuf::from(id.to_string()));
        assert_eq!(storage_name(id, "clip.m p4"), PathBuf::from(id.to_string()));
        assert_eq!(storage_name(id, "model"), PathBuf::from(id.to_string()));
    }

    #[test]
    fn only_literal_true_asks_for_clean() {
        let query = |clean: Option<&str>| DeliveryQuery {
            clean: clean.map(str::to_string),
        };
        assert!(query(Some("true")).wants_clean());
        assert!(!query(Some("1")).wants_clean());
        assert!(!query(None).wants_clean());
    }
}
