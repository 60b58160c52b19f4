// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Video watermarker: per-viewer overlay renditions, memoized on disk.
//
// A request checks the rendition cache first; on a miss it joins (or
// starts) the single in-flight encode for that cache entry. The encode
// writes to a partial file and is renamed into place only on success.
//
// Invalidation withdraws the document for the life of the process: an encode
// still running for it is discarded instead of being moved into the cache.

pub mod cache;
pub mod encoder;
pub mod inflight;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use dataroom_core::{DocumentId, RenderError};

pub use cache::{RenditionCache, viewer_key_for};
pub use encoder::{OverlayEncoder, PartialFile};
pub use inflight::InflightRegistry;

type EncodeOutcome = Result<PathBuf, RenderError>;

/// Produces and caches watermarked video renditions.
#[derive(Debug)]
pub struct VideoWatermarker {
    cache: RenditionCache,
    encoder: OverlayEncoder,
    inflight: InflightRegistry<PathBuf, EncodeOutcome>,
    /// Deleted documents. Held while a finished encode is persisted.
    withdrawn: Mutex<HashSet<DocumentId>>,
}

fn withdrawn_error(document_id: DocumentId) -> RenderError {
    RenderError::Video(format!("document {document_id} was deleted"))
}

impl VideoWatermarker {
    pub fn new(cache: RenditionCache, encoder: OverlayEncoder) -> Self {
        Self {
            cache,
            encoder,
            inflight: InflightRegistry::new(),
            withdrawn: Mutex::new(HashSet::new()),
        }
    }

    pub fn cache(&self) -> &RenditionCache {
        &self.cache
    }

    /// Path of the rendition of `source` for `viewer_key`, encoding it first
    /// if it is not cached yet.
    #[instrument(skip_all, fields(document_id = %document_id, viewer_key = %viewer_key))]
    pub async fn watermark_video(
        &self,
        source: &Path,
        label: &str,
        document_id: DocumentId,
        viewer_key: &str,
    ) -> Result<PathBuf, RenderError> {
        if self.withdrawn.lock().await.contains(&document_id) {
            return Err(withdrawn_error(document_id));
        }
        let entry = self.cache.entry_path(document_id, viewer_key, source);
        if let Some(hit) = self.cache.lookup(&entry).await {
            debug!("rendition cache hit");
            return Ok(hit);
        }

        let key = entry.clone();
        self.inflight
            .run(key, || self.encode_entry(source, label, document_id, entry))
            .await
    }

    /// Runs once per cache entry at a time. Re-checks the cache because a
    /// previous run may have finished between the caller's lookup and the
    /// registry handing this run the slot.
    async fn encode_entry(
        &self,
        source: &Path,
        label: &str,
        document_id: DocumentId,
        entry: PathBuf,
    ) -> EncodeOutcome {
        if let Some(hit) = self.cache.lookup(&entry).await {
            return Ok(hit);
        }
        self.cache.ensure_dir().await?;

        let partial = PartialFile::new(self.cache.partial_path(&entry));
        let started = Instant::now();
        self.encoder.encode(source, partial.path(), label).await?;

        // An invalidation either runs before this (and the output is
        // dropped) or after the rename (and its scan removes the entry).
        let withdrawn = self.withdrawn.lock().await;
        if withdrawn.contains(&document_id) {
            warn!("document deleted during encode, rendition discarded");
            return Err(withdrawn_error(document_id));
        }
        partial.persist(&entry).await?;
        drop(withdrawn);

        info!(
            rendition = %entry.display(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "video rendition encoded"
        );
        Ok(entry)
    }

    /// Remove every cached rendition of `document_id` and refuse to produce
    /// new ones, including from encodes already in flight.
    pub async fn invalidate(&self, document_id: DocumentId) -> Result<usize, RenderError> {
        self.withdrawn.lock().await.insert(document_id);
        self.cache.invalidate(document_id).await
    }
}

#[cfg(all(test, unix))]
pub(crate) mod fixtures {
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use super::OverlayEncoder;

    /// Stand-in encoder: copies the input to the output, appends the filter
    /// graph (so the label shows up in the bytes), and records each run in
    /// `counter`.
    pub fn copy_script(dir: &Path, counter: &Path, delay: &str) -> PathBuf {
        let body = format!(
            r#"in=""; graph=""; out=""; prev=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then in="$arg"; fi
  if [ "$prev" = "-vf" ]; then graph="$arg"; fi
  prev="$arg"; out="$arg"
done
echo run >> "{counter}"
sleep {delay}
cat "$in" > "$out"
printf '%s' "$graph" >> "$out"
"#,
            counter = counter.display(),
        );
        write_script(dir, "copy.sh", &body)
    }

    pub fn hang_script(dir: &Path) -> PathBuf {
        write_script(
            dir,
            "hang.sh",
            r#"for arg in "$@"; do out="$arg"; done
printf 'partial' > "$out"
exec sleep 30
"#,
        )
    }

    pub fn fail_script(dir: &Path) -> PathBuf {
        write_script(
            dir,
            "fail.sh",
            r#"for arg in "$@"; do out="$arg"; done
printf 'garbage' > "$out"
echo "drawtext: no such filter" >&2
exit 1
"#,
        )
    }

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    pub fn sh_encoder(script: &Path, budget: Duration) -> OverlayEncoder {
        OverlayEncoder::new("/bin/sh", budget).with_leading_args([script.as_os_str().to_owned()])
    }
}
