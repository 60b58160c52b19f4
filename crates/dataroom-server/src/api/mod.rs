// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// HTTP surface. Every route resolves the requester from `X-Dataroom-User`
// before doing anything else.

use axum::Router;
use axum::routing::{get, patch, post};
use tower_http::trace::TraceLayer;

use crate::services::app_services::AppServices;

pub mod analytics;
pub mod auth;
pub mod error;
pub mod files;
pub mod investors;
pub mod tracking;

pub fn router(state: AppServices) -> Router {
    Router::new()
        .route("/files", get(files::list).post(files::upload))
        .route("/files/{id}", get(files::metadata).delete(files::delete))
        .route("/files/{id}/view", get(files::view))
        .route("/files/{id}/download", get(files::download))
        .route("/tracking", post(tracking::update_duration))
        .route("/tracking/export", get(tracking::export))
        .route("/analytics", get(analytics::report))
        .route("/activity", get(analytics::activity))
        .route("/nda", post(investors::accept_nda))
        .route("/investors", get(investors::list))
        .route("/investors/{id}", patch(investors::update))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use axum::body::{Body, Bytes, to_bytes};
    use axum::http::{HeaderMap, Method, Request, StatusCode};
    use chrono::Utc;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use dataroom_core::{
        AccessEventId, DataroomConfig, Document, DocumentId, InvestorId, InvestorRecord, InvestorStatus,
    };
    use dataroom_store::{CSV_HEADER, Database};

    use super::*;
    use crate::api::auth::USER_HEADER;
    use crate::api::files::{ACCESS_LOG_HEADER, CATEGORY_HEADER, FILE_NAME_HEADER};

    const ADMIN: &str = "admin@fund.test";
    const LP: &str = "lp@fund.test";
    const INVITEE: &str = "new@fund.test";
    const MEMO: &[u8] = b"quarterly memo\n";

    struct Fixture {
        _dir: TempDir,
        services: AppServices,
        app: Router,
        document: DocumentId,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let config = DataroomConfig {
            data_dir: dir.path().to_path_buf(),
            admin_emails: vec![ADMIN.into()],
            ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg"),
            ..DataroomConfig::default()
        };

        let upload_dir = config.upload_dir();
        std::fs::create_dir_all(&upload_dir).unwrap();
        std::fs::write(upload_dir.join("memo.txt"), MEMO).unwrap();

        let db = Database::open_in_memory().unwrap();
        let document = Document {
            id: DocumentId::new(),
            name: "memo.txt".into(),
            mime_type: "text/plain".into(),
            size: MEMO.len() as u64,
            storage_path: PathBuf::from("memo.txt"),
            category: "Legal".into(),
            uploaded_at: Utc::now(),
        };
        db.insert_document(&document).unwrap();
        for (email, status) in [(LP, InvestorStatus::NdaAccepted), (INVITEE, InvestorStatus::Invited)] {
            db.insert_investor(&InvestorRecord {
                id: InvestorId::new(),
                email: email.into(),
                name: None,
                status,
                nda_accepted_at: None,
            })
            .unwrap();
        }

        let services = AppServices::with_database(config, db);
        Fixture {
            _dir: dir,
            app: router(services.clone()),
            services,
            document: document.id,
        }
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, Bytes) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            request = request.header(USER_HEADER, user);
        }
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes)
    }

    async fn get(app: &Router, uri: &str, user: Option<&str>) -> (StatusCode, HeaderMap, Bytes) {
        send(app, Method::GET, uri, user, None).await
    }

    async fn upload(
        app: &Router,
        user: &str,
        name: Option<&str>,
        mime: &str,
        bytes: &'static [u8],
    ) -> (StatusCode, Bytes) {
        let mut request = Request::builder()
            .method(Method::POST)
            .uri("/files")
            .header(USER_HEADER, user)
            .header("content-type", mime)
            .header(CATEGORY_HEADER, "Product");
        if let Some(name) = name {
            request = request.header(FILE_NAME_HEADER, name);
        }
        let response = app
            .clone()
            .oneshot(request.body(Body::from(bytes)).unwrap())
            .await
            .unwrap();
        let status = response.status();
        (status, to_bytes(response.into_body(), usize::MAX).await.unwrap())
    }

    fn investor_id(f: &Fixture, email: &str) -> InvestorId {
        f.services.db.lock().investor_by_email(email).unwrap().unwrap().id
    }

    #[tokio::test]
    async fn requesters_are_resolved_before_anything_else() {
        let f = fixture();
        let view = format!("/files/{}/view", f.document);

        assert_eq!(get(&f.app, "/files", None).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(get(&f.app, &view, Some("stranger@else.test")).await.0, StatusCode::FORBIDDEN);
        // Invited but has not accepted the NDA.
        assert_eq!(get(&f.app, &view, Some(INVITEE)).await.0, StatusCode::FORBIDDEN);
        assert_eq!(f.services.db.lock().access_events().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn investor_view_is_logged_and_heartbeats_update_it() {
        let f = fixture();
        let (status, headers, body) = get(&f.app, &format!("/files/{}/view", f.document), Some(LP)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], MEMO);
        assert_eq!(headers["content-type"], "text/plain");
        assert_eq!(headers["content-disposition"], "inline; filename=\"memo.txt\"");

        let event_id = headers[ACCESS_LOG_HEADER].to_str().unwrap().to_string();
        let (status, _, _) = send(
            &f.app,
            Method::POST,
            "/tracking",
            Some(LP),
            Some(json!({ "accessLogId": event_id, "duration": 12 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let db = f.services.db.lock();
        let event = db.access_event(AccessEventId::parse(&event_id).unwrap()).unwrap();
        assert_eq!(event.duration_secs, 12);
        // First access promotes the investor.
        assert_eq!(db.investor_by_email(LP).unwrap().unwrap().status, InvestorStatus::Active);
    }

    #[tokio::test]
    async fn download_is_an_attachment_without_event_header() {
        let f = fixture();
        let (status, headers, _) = get(&f.app, &format!("/files/{}/download", f.document), Some(LP)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-disposition"], "attachment; filename=\"memo.txt\"");
        assert!(headers.get(ACCESS_LOG_HEADER).is_none());
        assert_eq!(f.services.db.lock().access_events().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn heartbeat_errors() {
        let f = fixture();
        let unknown = json!({ "accessLogId": AccessEventId::new().to_string(), "duration": 3 });
        let missing = json!({ "accessLogId": AccessEventId::new().to_string() });

        let (status, _, _) = send(&f.app, Method::POST, "/tracking", Some(LP), Some(unknown.clone())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = send(&f.app, Method::POST, "/tracking", Some(LP), Some(missing)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _, _) = send(&f.app, Method::POST, "/tracking", None, Some(unknown)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_reports() {
        let f = fixture();
        get(&f.app, &format!("/files/{}/view", f.document), Some(LP)).await;

        assert_eq!(get(&f.app, "/tracking/export", Some(LP)).await.0, StatusCode::FORBIDDEN);
        let (status, headers, body) = get(&f.app, "/tracking/export", Some(ADMIN)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "text/csv");
        let csv = String::from_utf8(body.to_vec()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains(LP));

        assert_eq!(get(&f.app, "/analytics", Some(LP)).await.0, StatusCode::FORBIDDEN);
        let (status, _, body) = get(&f.app, "/analytics", Some(ADMIN)).await;
        assert_eq!(status, StatusCode::OK);
        let report: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(report["summary"]["totalViews"], 1);
        assert_eq!(report["summary"]["totalFiles"], 1);
    }

    #[tokio::test]
    async fn admin_clean_copy_is_not_logged() {
        let f = fixture();
        let (status, _, body) =
            get(&f.app, &format!("/files/{}/download?clean=true", f.document), Some(ADMIN)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], MEMO);
        assert!(f.services.db.lock().access_events().unwrap().is_empty());
    }

    #[tokio::test]
    async fn listing_and_metadata() {
        let f = fixture();
        let (status, _, body) = get(&f.app, "/files", Some(LP)).await;
        assert_eq!(status, StatusCode::OK);
        let listed: Vec<Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["name"], "memo.txt");

        assert_eq!(get(&f.app, "/files", Some(INVITEE)).await.0, StatusCode::FORBIDDEN);
        assert_eq!(get(&f.app, "/files/not-a-uuid", Some(LP)).await.0, StatusCode::NOT_FOUND);
        assert_eq!(
            get(&f.app, &format!("/files/{}", DocumentId::new()), Some(LP)).await.0,
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn only_admins_delete() {
        let f = fixture();
        let uri = format!("/files/{}", f.document);

        assert_eq!(send(&f.app, Method::DELETE, &uri, Some(LP), None).await.0, StatusCode::FORBIDDEN);
        let (status, _, body) = send(&f.app, Method::DELETE, &uri, Some(ADMIN), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({ "success": true }));

        assert_eq!(get(&f.app, &uri, Some(ADMIN)).await.0, StatusCode::NOT_FOUND);
        assert!(!f.services.config.upload_dir().join("memo.txt").exists());
    }

    #[tokio::test]
    async fn uploaded_video_is_listed_and_streamed() {
        let f = fixture();
        let (status, body) = upload(&f.app, ADMIN, Some("Pitch.MP4"), "video/mp4", b"frames").await;
        assert_eq!(status, StatusCode::CREATED);
        let created: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(created["name"], "Pitch.MP4");
        assert_eq!(created["category"], "Product");
        assert_eq!(created["size"], 6);
        let id = created["id"].as_str().unwrap().to_string();
        assert!(f.services.config.upload_dir().join(format!("{id}.mp4")).is_file());

        let (_, _, listed) = get(&f.app, "/files", Some(LP)).await;
        assert_eq!(serde_json::from_slice::<Vec<Value>>(&listed).unwrap().len(), 2);

        // No encoder is installed, so the original is streamed back.
        let (status, headers, body) = get(&f.app, &format!("/files/{id}/view"), Some(LP)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(&body[..], b"frames");
        assert_eq!(headers["content-length"], "6");
        assert_eq!(headers["content-type"], "video/mp4");
    }

    #[tokio::test]
    async fn rejected_uploads_store_nothing() {
        let f = fixture();
        let cases = [
            (LP, Some("deck.pdf"), "application/pdf", &b"%PDF"[..], StatusCode::FORBIDDEN),
            (ADMIN, Some("notes.txt"), "text/plain", &b"notes"[..], StatusCode::BAD_REQUEST),
            (ADMIN, None, "application/pdf", &b"%PDF"[..], StatusCode::BAD_REQUEST),
            (ADMIN, Some("empty.pdf"), "application/pdf", &b""[..], StatusCode::BAD_REQUEST),
        ];
        for (user, name, mime, bytes, expected) in cases {
            assert_eq!(upload(&f.app, user, name, mime, bytes).await.0, expected, "{name:?} {mime}");
        }

        assert_eq!(f.services.db.lock().documents().unwrap().len(), 1);
        let stored = std::fs::read_dir(f.services.config.upload_dir()).unwrap().count();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn nda_acceptance_opens_the_dataroom() {
        let f = fixture();
        let nda = |user: &'static str, accepted: bool| {
            send(&f.app, Method::POST, "/nda", Some(user), Some(json!({ "accepted": accepted })))
        };

        assert_eq!(nda(INVITEE, false).await.0, StatusCode::BAD_REQUEST);
        assert_eq!(get(&f.app, "/files", Some(INVITEE)).await.0, StatusCode::FORBIDDEN);

        let (status, _, body) = nda(INVITEE, true).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap()["status"], "nda_accepted");
        let stored = f.services.db.lock().investor_by_email(INVITEE).unwrap().unwrap();
        assert!(stored.nda_accepted_at.is_some());
        assert_eq!(get(&f.app, "/files", Some(INVITEE)).await.0, StatusCode::OK);

        let (status, _, body) = nda(INVITEE, true).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap()["message"], "NDA already accepted");

        // Administrators have no investor record to accept for.
        assert_eq!(nda(ADMIN, true).await.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dropped_investor_cannot_accept() {
        let f = fixture();
        f.services
            .db
            .lock()
            .insert_investor(&InvestorRecord {
                id: InvestorId::new(),
                email: "gone@fund.test".into(),
                name: None,
                status: InvestorStatus::Dropped,
                nda_accepted_at: None,
            })
            .unwrap();
        let body = Some(json!({ "accepted": true }));
        let (status, _, _) = send(&f.app, Method::POST, "/nda", Some("gone@fund.test"), body).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn administrators_set_manual_statuses() {
        let f = fixture();
        let uri = format!("/investors/{}", investor_id(&f, LP));
        let set = |user: &'static str, status: &'static str| {
            send(&f.app, Method::PATCH, &uri, Some(user), Some(json!({ "status": status })))
        };

        assert_eq!(set(LP, "termsheet_sent").await.0, StatusCode::FORBIDDEN);
        let (status, _, body) = set(ADMIN, "termsheet_sent").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_slice::<Value>(&body).unwrap()["status"], "termsheet_sent");

        assert_eq!(set(ADMIN, "active").await.0, StatusCode::BAD_REQUEST);
        assert_eq!(set(ADMIN, "platinum").await.0, StatusCode::BAD_REQUEST);
        assert_eq!(
            f.services.db.lock().investor_by_email(LP).unwrap().unwrap().status,
            InvestorStatus::TermsheetSent
        );

        let unknown = format!("/investors/{}", InvestorId::new());
        let body = Some(json!({ "status": "dropped" }));
        assert_eq!(
            send(&f.app, Method::PATCH, &unknown, Some(ADMIN), body).await.0,
            StatusCode::NOT_FOUND
        );

        assert_eq!(get(&f.app, "/investors", Some(LP)).await.0, StatusCode::FORBIDDEN);
        let (status, _, body) = get(&f.app, "/investors", Some(ADMIN)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_slice::<Vec<Value>>(&body).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn activity_log_pages() {
        let f = fixture();
        let view = format!("/files/{}/view", f.document);
        get(&f.app, &view, Some(LP)).await;
        get(&f.app, &view, Some(LP)).await;
        get(&f.app, &format!("/files/{}/download", f.document), Some(LP)).await;

        assert_eq!(get(&f.app, "/activity", Some(LP)).await.0, StatusCode::FORBIDDEN);

        let (status, _, body) = get(&f.app, "/activity?limit=2", Some(ADMIN)).await;
        assert_eq!(status, StatusCode::OK);
        let page: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(page["total"], 3);
        assert_eq!(page["totalPages"], 2);
        assert_eq!(page["logs"].as_array().unwrap().len(), 2);
        assert_eq!(page["logs"][0]["action"], "download");
        assert_eq!(page["logs"][0]["investor"]["email"], LP);

        let (_, _, body) = get(&f.app, "/activity?action=view&page=2&limit=1", Some(ADMIN)).await;
        let page: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!((page["total"].as_u64(), page["page"].as_u64()), (Some(2), Some(2)));
        assert_eq!(page["logs"][0]["file"]["name"], "memo.txt");
    }
}
