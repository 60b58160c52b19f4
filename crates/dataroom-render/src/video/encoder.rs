// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// External overlay encoder: burns the viewer label and a "CONFIDENTIAL"
// caption into a video with ffmpeg's `drawtext` filter, bounded by a hard
// wall-clock budget. On expiry the process is killed and the caller gets
// `RenderError::EncodeTimeout`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use dataroom_core::RenderError;

/// Vertical offset of the caption below the label, in pixels.
const CAPTION_OFFSET: u32 = 40;

/// Longest stderr excerpt carried into an error message.
const STDERR_TAIL: usize = 512;

/// Escape for a filter option value (`\ ' :` and drawtext's `%`).
fn escape_option(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '\'' | ':' | '%') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape for the filtergraph description itself.
fn escape_graph(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn drawtext_value(text: &str) -> String {
    escape_graph(&escape_option(text))
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(STDERR_TAIL.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    text[start..].to_string()
}

/// Runs the overlay encode for one rendition.
#[derive(Debug, Clone)]
pub struct OverlayEncoder {
    program: PathBuf,
    /// Arguments placed before the ffmpeg arguments (e.g. a wrapper script).
    leading_args: Vec<OsString>,
    budget: Duration,
    label_font_size: u32,
    caption_font_size: u32,
}

impl OverlayEncoder {
    pub fn new(program: impl Into<PathBuf>, budget: Duration) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            budget,
            label_font_size: 28,
            caption_font_size: 20,
        }
    }

    pub fn with_leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_font_sizes(mut self, label: u32, caption: u32) -> Self {
        self.label_font_size = label;
        self.caption_font_size = caption;
        self
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// The `-vf` argument: the label centred with a soft shadow, and the
    /// caption just below it.
    pub fn filter_graph(&self, label: &str) -> String {
        format!(
            "drawtext=text={label}:fontsize={label_size}:fontcolor=white@0.25:\
             x=(w-tw)/2:y=(h-th)/2:shadowcolor=black@0.15:shadowx=2:shadowy=2,\
             drawtext=text=CONFIDENTIAL:fontsize={caption_size}:fontcolor=white@0.2:\
             x=(w-tw)/2:y=(h-th)/2+{CAPTION_OFFSET}",
            label = drawtext_value(label),
            label_size = self.label_font_size,
            caption_size = self.caption_font_size,
        )
    }

    /// Encode `input` into `output`. `output` is written directly; callers
    /// point it at a temporary path and move it into place on success.
    ///
    /// The child is killed if this future is dropped before it finishes.
    #[instrument(skip_all, fields(input = %input.display(), budget_secs = self.budget.as_secs()))]
    pub async fn encode(&self, input: &Path, output: &Path, label: &str) -> Result<(), RenderError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .args(["-y", "-loglevel", "error", "-i"])
            .arg(input)
            .arg("-vf")
            .arg(self.filter_graph(label))
            .args(["-c:a", "copy"])
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = command.spawn().map_err(|e| {
            RenderError::EncoderUnavailable(format!("cannot start {}: {e}", self.program.display()))
        })?;

        let stderr_drain = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut bytes = Vec::new();
                let _ = stderr.read_to_end(&mut bytes).await;
                bytes
            })
        });

        let outcome = tokio::time::timeout(self.budget, child.wait()).await;
        match outcome {
            Ok(Ok(status)) if status.success() => {
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "encoder finished");
                Ok(())
            }
            Ok(Ok(status)) => {
                let stderr = match stderr_drain {
                    Some(drain) => drain.await.unwrap_or_default(),
                    None => Vec::new(),
                };
                Err(RenderError::Video(format!(
                    "encoder exited with {status}: {}",
                    stderr_tail(&stderr)
                )))
            }
            Ok(Err(e)) => Err(RenderError::Io(format!("waiting for encoder: {e}"))),
            Err(_elapsed) => {
                warn!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "encode exceeded budget, killing encoder"
                );
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill encoder");
                }
                if let Some(drain) = stderr_drain {
                    drain.abort();
                }
                Err(RenderError::EncodeTimeout {
                    budget: self.budget,
                })
            }
        }
    }
}

/// A temporary encode target. Removed on drop unless persisted, which
/// covers failure, timeout, and cancellation of the owning future.
#[derive(Debug)]
pub struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically move the finished file to `dest`. Empty output counts as
    /// a failed encode.
    pub async fn persist(mut self, dest: &Path) -> Result<(), RenderError> {
        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| RenderError::Video(format!("encoder produced no output: {e}")))?;
        if meta.len() == 0 {
            return Err(RenderError::Video("encoder produced an empty file".into()));
        }
        tokio::fs::rename(&self.path, dest).await.map_err(|e| {
            RenderError::Io(format!("cannot move rendition to {}: {e}", dest.display()))
        })?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "partial rendition removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "cannot remove partial rendition"),
        }
    }
}
