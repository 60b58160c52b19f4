// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Delivery dispatcher.
//
//   requester + document
//        │
//        ├─ skip_watermark? ──yes──▶ original
//        │
//        ├─ renderer for MIME family? ──none──▶ original
//        │
//        └─ render ──ok──▶ watermarked payload
//                 └─err──▶ original   (logged: protection = "degraded")
//
// Videos, and anything else a path-sourced renderer handles, are streamed
// from an open file; everything else is buffered. Investor requesters get
// one access event per delivery. A ledger failure is logged and the
// delivery goes ahead.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use dataroom_core::error::Result;
use dataroom_core::{
    AccessAction, AccessEventId, AccessRequest, DeliveryOptions, Document, DocumentId,
    RenderError, Requester,
};
use dataroom_render::{
    RenderJob, RenderSource, Renderer, RendererTable, Rendition, SourceKind, viewer_key_for,
};

use crate::payload::Payload;
use crate::ports::{AccessRecorder, DocumentCatalog, blocking};
use crate::storage::UploadStore;

/// How the payload should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

impl Disposition {
    pub fn for_action(action: Option<AccessAction>) -> Self {
        match action {
            Some(AccessAction::Download) => Self::Attachment,
            _ => Self::Inline,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Attachment => "attachment",
        }
    }
}

/// The payload actually being sent, with the metadata that describes it.
#[derive(Debug)]
pub struct RenderedOutput {
    pub body: Payload,
    pub content_type: String,
    pub disposition: Disposition,
    /// Display name for the `Content-Disposition` filename.
    pub filename: String,
    /// `false` for clean copies, pass-through formats, and fallbacks.
    pub watermarked: bool,
    /// Set when an access event was recorded for this delivery.
    pub access_event_id: Option<AccessEventId>,
}

/// Orchestrates rendering, fallback, access recording, and deletion.
#[derive(Clone)]
pub struct Dispatcher {
    catalog: Arc<dyn DocumentCatalog>,
    recorder: Arc<dyn AccessRecorder>,
    store: UploadStore,
    renderers: RendererTable,
}

impl Dispatcher {
    pub fn new(
        catalog: Arc<dyn DocumentCatalog>,
        recorder: Arc<dyn AccessRecorder>,
        store: UploadStore,
        renderers: RendererTable,
    ) -> Self {
        Self {
            catalog,
            recorder,
            store,
            renderers,
        }
    }

    /// Look up a document record.
    pub async fn document(&self, id: DocumentId) -> Result<Document> {
        let catalog = Arc::clone(&self.catalog);
        blocking(move || catalog.document(id)).await
    }

    /// Produce the bytes `requester` receives for `document`.
    ///
    /// Only a storage failure (no original to serve) is an error; renderer
    /// failures degrade to the original.
    #[instrument(skip_all, fields(
        document_id = %document.id,
        mime = %document.mime_type,
        action = ?options.action,
    ))]
    pub async fn deliver(
        &self,
        document: &Document,
        requester: &Requester,
        options: &DeliveryOptions,
    ) -> Result<RenderedOutput> {
        let (body, watermarked) = if requester.skip_watermark(options) {
            info!("clean copy for administrator");
            (self.original(document).await?, false)
        } else {
            self.watermarked(document, requester).await?
        };

        let access_event_id = self.record(document, requester, options).await;

        Ok(RenderedOutput {
            body,
            content_type: document.mime_type.clone(),
            disposition: Disposition::for_action(options.action),
            filename: document.name.clone(),
            watermarked,
            access_event_id,
        })
    }

    /// The stored original: opened for streaming when its renderer works
    /// from paths, read into memory otherwise.
    async fn original(&self, document: &Document) -> Result<Payload> {
        let streams = self
            .renderers
            .for_mime(&document.mime_type)
            .is_some_and(|r| r.source_kind() == SourceKind::Path);
        if streams {
            self.store.open(document).await
        } else {
            Ok(Payload::Buffered(self.store.read(document).await?))
        }
    }

    async fn watermarked(&self, document: &Document, requester: &Requester) -> Result<(Payload, bool)> {
        let Some(renderer) = self.renderers.for_mime(&document.mime_type) else {
            return Ok((self.original(document).await?, false));
        };
        let viewer_key = viewer_key_for(requester);
        let label = requester.viewer_label();

        match renderer.source_kind() {
            SourceKind::Bytes => {
                let original = self.store.read(document).await?;
                let job = RenderJob {
                    document_id: document.id,
                    viewer_key: &viewer_key,
                    label,
                    source: RenderSource::Bytes(&original),
                };
                match render_payload(renderer, job).await {
                    Ok(body) => Ok((body, true)),
                    Err(e) => {
                        degraded(document, renderer, &e);
                        Ok((Payload::Buffered(original), false))
                    }
                }
            }
            SourceKind::Path => {
                let path = self.store.locate(document).await?;
                let job = RenderJob {
                    document_id: document.id,
                    viewer_key: &viewer_key,
                    label,
                    source: RenderSource::Path(&path),
                };
                match render_payload(renderer, job).await {
                    Ok(body) => Ok((body, true)),
                    Err(e) => {
                        degraded(document, renderer, &e);
                        Ok((self.store.open(document).await?, false))
                    }
                }
            }
        }
    }

    /// Best-effort ledger write for investor requesters.
    async fn record(
        &self,
        document: &Document,
        requester: &Requester,
        options: &DeliveryOptions,
    ) -> Option<AccessEventId> {
        let investor = requester.investor.as_ref()?;
        let action = options.action?;
        let request = AccessRequest {
            investor_id: investor.id,
            document_id: document.id,
            action,
            client: options.client.clone(),
        };
        let recorder = Arc::clone(&self.recorder);
        match blocking(move || recorder.log_access(&request)).await {
            Ok(event) => Some(event.id),
            Err(e) => {
                warn!(
                    document_id = %document.id,
                    investor_id = %investor.id,
                    error = %e,
                    "access event not recorded"
                );
                None
            }
        }
    }

    /// Remove a document: its stored bytes (already missing is fine), every
    /// cached video rendition, and finally the record with its access events.
    #[instrument(skip(self))]
    pub async fn delete_document(&self, id: DocumentId) -> Result<()> {
        let document = self.document(id).await?;

        if !self.store.remove(&document).await? {
            warn!("original was already missing");
        }
        if let Some(video) = self.renderers.video() {
            let removed = video.invalidate(id).await?;
            info!(renditions = removed, "video renditions invalidated");
        }

        let catalog = Arc::clone(&self.catalog);
        blocking(move || catalog.remove_document(id)).await?;
        info!("document deleted");
        Ok(())
    }
}

/// Render into a payload. File renditions are opened rather than read, so a
/// later cache invalidation cannot truncate a response already under way.
/// An empty rendition counts as a failure.
async fn render_payload(renderer: &Renderer, job: RenderJob<'_>) -> std::result::Result<Payload, RenderError> {
    let body = match renderer.render(job).await? {
        Rendition::Bytes(bytes) => Payload::Buffered(bytes),
        Rendition::File(path) => Payload::open(&path)
            .await
            .map_err(|e| RenderError::Io(format!("{}: {e}", path.display())))?,
    };
    if body.is_empty() {
        return Err(RenderError::Io("renderer produced no bytes".into()));
    }
    Ok(body)
}

fn degraded(document: &Document, renderer: &Renderer, e: &RenderError) {
    error!(
        protection = "degraded",
        document_id = %document.id,
        mime = %document.mime_type,
        renderer = renderer.name(),
        error = %e,
        "watermark failed, serving the original"
    );
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use dataroom_core::error::DataroomError;
    use dataroom_core::{AccessEvent, ClientMetadata, InvestorStatus};
    use dataroom_render::{OverlayEncoder, RenditionCache, VideoWatermarker};
    use dataroom_store::Database;

    use super::*;
    use crate::fixtures;
    use crate::ports::SharedDatabase;

    struct Rig {
        scratch: tempfile::TempDir,
        db: SharedDatabase,
        dispatcher: Dispatcher,
    }

    impl Rig {
        fn with_encoder(encoder: OverlayEncoder) -> Self {
            let scratch = tempfile::tempdir().unwrap();
            let uploads = scratch.path().join("uploads");
            std::fs::create_dir_all(&uploads).unwrap();
            let db = SharedDatabase::new(Database::open_in_memory().unwrap());
            let video = VideoWatermarker::new(RenditionCache::new(scratch.path().join("cache")), encoder);
            let dispatcher = Dispatcher::new(
                Arc::new(db.clone()),
                Arc::new(db.clone()),
                UploadStore::new(&uploads),
                RendererTable::standard(Arc::new(video)),
            );
            Self {
                scratch,
                db,
                dispatcher,
            }
        }

        fn new() -> Self {
            Self::with_encoder(OverlayEncoder::new("/nonexistent/ffmpeg", Duration::from_secs(5)))
        }

        fn upload(&self, name: &str, mime: &str, bytes: &[u8]) -> Document {
            let doc = fixtures::document(name, mime);
            std::fs::write(self.scratch.path().join("uploads").join(&doc.storage_path), bytes).unwrap();
            self.db.lock().insert_document(&doc).unwrap();
            doc
        }

        fn investor(&self, email: &str, status: InvestorStatus) -> Requester {
            let record = fixtures::investor(email, status);
            self.db.lock().insert_investor(&record).unwrap();
            Requester {
                email: email.into(),
                is_admin: false,
                investor: Some(record),
            }
        }

        fn events(&self) -> Vec<AccessEvent> {
            self.db.lock().access_events().unwrap()
        }

        fn cache_dir(&self) -> PathBuf {
            self.scratch.path().join("cache")
        }
    }

    fn admin(email: &str) -> Requester {
        Requester {
            email: email.into(),
            is_admin: true,
            investor: None,
        }
    }

    fn options(action: AccessAction, wants_clean: bool) -> DeliveryOptions {
        DeliveryOptions {
            action: Some(action),
            wants_clean,
            client: ClientMetadata {
                ip_address: Some("203.0.113.9".into()),
                user_agent: Some("test".into()),
            },
        }
    }

    fn occurrences(haystack: &[u8], needle: &[u8]) -> usize {
        haystack
            .windows(needle.len())
            .filter(|window| *window == needle)
            .count()
    }

    #[tokio::test]
    async fn investor_view_is_stamped_and_logged_once() {
        let rig = Rig::new();
        let original = fixtures::pdf();
        let doc = rig.upload("deck.pdf", "application/pdf", &original);
        let alice = rig.investor("a@x.com", InvestorStatus::NdaAccepted);

        let out = rig
            .dispatcher
            .deliver(&doc, &alice, &options(AccessAction::View, false))
            .await
            .unwrap();
        assert!(!out.body.is_streamed());
        let bytes = out.body.into_bytes().await.unwrap();

        assert!(out.watermarked);
        assert_ne!(bytes, original);
        assert_eq!(occurrences(&bytes, b"a@x.com"), 5);
        assert_eq!(out.content_type, "application/pdf");
        assert_eq!(out.disposition, Disposition::Inline);

        let events = rig.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AccessAction::View);
        assert_eq!(events[0].document_id, doc.id);
        assert_eq!(events[0].ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(out.access_event_id, Some(events[0].id));

        let stored = rig.db.lock().investor(alice.investor.as_ref().unwrap().id).unwrap();
        assert_eq!(stored.status, InvestorStatus::Active);
    }

    #[tokio::test]
    async fn admin_clean_copy_is_the_original_and_unlogged() {
        let rig = Rig::new();
        let original = fixtures::pdf();
        let doc = rig.upload("deck.pdf", "application/pdf", &original);

        let out = rig
            .dispatcher
            .deliver(&doc, &admin("ops@fund.com"), &options(AccessAction::Download, true))
            .await
            .unwrap();
        let bytes = out.body.into_bytes().await.unwrap();

        assert_eq!(bytes, original);
        assert!(!out.watermarked);
        assert_eq!(out.disposition, Disposition::Attachment);
        assert_eq!(out.access_event_id, None);
        assert!(rig.events().is_empty());
    }

    #[tokio::test]
    async fn admin_without_clean_flag_is_still_stamped() {
        let rig = Rig::new();
        let doc = rig.upload("deck.pdf", "application/pdf", &fixtures::pdf());

        let out = rig
            .dispatcher
            .deliver(&doc, &admin("ops@fund.com"), &options(AccessAction::View, false))
            .await
            .unwrap();
        let bytes = out.body.into_bytes().await.unwrap();
        assert_eq!(occurrences(&bytes, b"ops@fund.com"), 5);
        assert!(rig.events().is_empty());
    }

    #[tokio::test]
    async fn admin_who_is_also_investor_never_gets_clean_copy() {
        let rig = Rig::new();
        let original = fixtures::pdf();
        let doc = rig.upload("deck.pdf", "application/pdf", &original);
        let mut both = rig.investor("ops@fund.com", InvestorStatus::Active);
        both.is_admin = true;

        let out = rig
            .dispatcher
            .deliver(&doc, &both, &options(AccessAction::Download, true))
            .await
            .unwrap();
        let bytes = out.body.into_bytes().await.unwrap();
        assert!(out.watermarked);
        assert_ne!(bytes, original);
        assert_eq!(rig.events().len(), 1);
    }

    #[tokio::test]
    async fn malformed_pdf_falls_back_to_original() {
        let rig = Rig::new();
        let original = b"%PDF-1.4 this is not really a pdf".to_vec();
        let doc = rig.upload("broken.pdf", "application/pdf", &original);
        let alice = rig.investor("a@x.com", InvestorStatus::Active);

        let out = rig
            .dispatcher
            .deliver(&doc, &alice, &options(AccessAction::View, false))
            .await
            .unwrap();
        let bytes = out.body.into_bytes().await.unwrap();
        assert_eq!(bytes, original);
        assert!(!out.watermarked);
        assert_eq!(rig.events().len(), 1);
    }

    #[tokio::test]
    async fn malformed_workbook_falls_back_to_original() {
        let rig = Rig::new();
        let original = b"PK not a zip".to_vec();
        let doc = rig.upload(
            "model.xlsx",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            &original,
        );
        let alice = rig.investor("a@x.com", InvestorStatus::Active);

        let out = rig
            .dispatcher
            .deliver(&doc, &alice, &options(AccessAction::Download, false))
            .await
            .unwrap();
        let bytes = out.body.into_bytes().await.unwrap();
        assert_eq!(bytes, original);
        assert_eq!(out.disposition, Disposition::Attachment);
    }

    #[tokio::test]
    async fn missing_encoder_falls_back_for_video() {
        let rig = Rig::new();
        let doc = rig.upload("pitch.mp4", "video/mp4", b"video-bytes");
        let alice = rig.investor("a@x.com", InvestorStatus::Active);

        let out = rig
            .dispatcher
            .deliver(&doc, &alice, &options(AccessAction::View, false))
            .await
            .unwrap();
        let bytes = out.body.into_bytes().await.unwrap();
        assert_eq!(bytes, b"video-bytes");
        assert!(!out.watermarked);
    }

    #[tokio::test]
    async fn missing_original_is_fatal() {
        let rig = Rig::new();
        let doc = fixtures::document("ghost.pdf", "application/pdf");
        rig.db.lock().insert_document(&doc).unwrap();
        let alice = rig.investor("a@x.com", InvestorStatus::Active);

        let err = rig
            .dispatcher
            .deliver(&doc, &alice, &options(AccessAction::View, false))
            .await
            .unwrap_err();
        assert!(matches!(err, DataroomError::Storage(_)));
        assert!(rig.events().is_empty());
    }

    #[tokio::test]
    async fn other_formats_pass_through() {
        let rig = Rig::new();
        let doc = rig.upload("notes.txt", "text/plain", b"plain notes");
        let alice = rig.investor("a@x.com", InvestorStatus::Active);

        let out = rig
            .dispatcher
            .deliver(&doc, &alice, &options(AccessAction::View, false))
            .await
            .unwrap();
        let bytes = out.body.into_bytes().await.unwrap();
        assert_eq!(bytes, b"plain notes");
        assert!(!out.watermarked);
    }

    struct BrokenLedger;

    impl AccessRecorder for BrokenLedger {
        fn log_access(&self, _: &AccessRequest) -> Result<AccessEvent> {
            Err(DataroomError::Database("disk full".into()))
        }

        fn update_duration(&self, _: AccessEventId, _: i64) -> Result<()> {
            Err(DataroomError::Database("disk full".into()))
        }
    }

    #[tokio::test]
    async fn ledger_failure_does_not_block_delivery() {
        let rig = Rig::new();
        let doc = rig.upload("deck.pdf", "application/pdf", &fixtures::pdf());
        let alice = rig.investor("a@x.com", InvestorStatus::Active);
        let dispatcher = Dispatcher::new(
            Arc::new(rig.db.clone()),
            Arc::new(BrokenLedger),
            UploadStore::new(rig.scratch.path().join("uploads")),
            RendererTable::new(),
        );

        let out = dispatcher
            .deliver(&doc, &alice, &options(AccessAction::View, false))
            .await
            .unwrap();
        let bytes = out.body.into_bytes().await.unwrap();
        assert_eq!(out.access_event_id, None);
        assert!(!bytes.is_empty());
    }

    #[tokio::test]
    async fn deleting_a_document_is_not_found_twice() {
        let rig = Rig::new();
        let doc = rig.upload("deck.pdf", "application/pdf", &fixtures::pdf());

        rig.dispatcher.delete_document(doc.id).await.unwrap();
        assert!(!rig.scratch.path().join("uploads").join(&doc.storage_path).exists());
        assert!(matches!(
            rig.dispatcher.delete_document(doc.id).await.unwrap_err(),
            DataroomError::NotFound(_)
        ));
    }

    #[cfg(unix)]
    fn copy_encoder(dir: &Path) -> OverlayEncoder {
        let script = dir.join("encode.sh");
        std::fs::write(
            &script,
            r#"in=""; graph=""; prev=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then in="$arg"; fi
  if [ "$prev" = "-vf" ]; then graph="$arg"; fi
  prev="$arg"; out="$arg"
done
cat "$in" > "$out"
printf '%s' "$graph" >> "$out"
"#,
        )
        .unwrap();
        OverlayEncoder::new("/bin/sh", Duration::from_secs(10)).with_leading_args([script.into_os_string()])
    }

    #[cfg(unix)]
    fn hanging_encoder(dir: &Path) -> OverlayEncoder {
        let script = dir.join("hang.sh");
        std::fs::write(&script, "for arg in \"$@\"; do out=\"$arg\"; done\nprintf 'x' > \"$out\"\nexec sleep 30\n")
            .unwrap();
        OverlayEncoder::new("/bin/sh", Duration::from_millis(300)).with_leading_args([script.into_os_string()])
    }

    #[cfg(unix)]
    fn cache_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn two_video_viewers_then_delete() {
        let scripts = tempfile::tempdir().unwrap();
        let rig = Rig::with_encoder(copy_encoder(scripts.path()));
        let doc = rig.upload("pitch.mp4", "video/mp4", b"video-bytes");
        let a = rig.investor("a@x.com", InvestorStatus::Active);
        let b = rig.investor("b@y.com", InvestorStatus::Active);

        let out_a = rig
            .dispatcher
            .deliver(&doc, &a, &options(AccessAction::View, false))
            .await
            .unwrap();
        assert!(out_a.body.is_streamed());
        let out_a_bytes = out_a.body.into_bytes().await.unwrap();
        let out_b = rig
            .dispatcher
            .deliver(&doc, &b, &options(AccessAction::View, false))
            .await
            .unwrap();
        let out_b_bytes = out_b.body.into_bytes().await.unwrap();

        assert!(out_a.watermarked && out_b.watermarked);
        assert_ne!(out_a_bytes, out_b_bytes);
        assert!(occurrences(&out_a_bytes, b"a@x.com") > 0);
        assert_eq!(cache_entries(&rig.cache_dir()), 2);

        rig.dispatcher.delete_document(doc.id).await.unwrap();
        assert_eq!(cache_entries(&rig.cache_dir()), 0);
        assert!(rig.events().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streamed_rendition_survives_deletion_mid_response() {
        let scripts = tempfile::tempdir().unwrap();
        let rig = Rig::with_encoder(copy_encoder(scripts.path()));
        let doc = rig.upload("pitch.mp4", "video/mp4", b"video-bytes");
        let alice = rig.investor("a@x.com", InvestorStatus::Active);

        let out = rig
            .dispatcher
            .deliver(&doc, &alice, &options(AccessAction::View, false))
            .await
            .unwrap();
        let len = out.body.len();
        rig.dispatcher.delete_document(doc.id).await.unwrap();
        assert_eq!(cache_entries(&rig.cache_dir()), 0);

        let bytes = out.body.into_bytes().await.unwrap();
        assert_eq!(bytes.len() as u64, len);
        assert!(bytes.starts_with(b"video-bytes"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn encode_timeout_falls_back_and_leaves_no_rendition() {
        let scripts = tempfile::tempdir().unwrap();
        let rig = Rig::with_encoder(hanging_encoder(scripts.path()));
        let doc = rig.upload("pitch.mp4", "video/mp4", b"video-bytes");
        let alice = rig.investor("a@x.com", InvestorStatus::Active);

        let out = rig
            .dispatcher
            .deliver(&doc, &alice, &options(AccessAction::View, false))
            .await
            .unwrap();
        let bytes = out.body.into_bytes().await.unwrap();
        assert_eq!(bytes, b"video-bytes");
        assert!(!out.watermarked);
        assert_eq!(cache_entries(&rig.cache_dir()), 0);
    }
}
