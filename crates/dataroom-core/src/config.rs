// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.
//
// Resolution order: built-in defaults, then `config.json` in the data
// directory, then environment overrides:
//
// | Variable                       | Field                 |
// |--------------------------------|-----------------------|
// | `DATAROOM_BIND`                | `bind_addr`           |
// | `DATAROOM_FFMPEG`              | `ffmpeg_path`         |
// | `DATAROOM_ENCODE_TIMEOUT_SECS` | `encode_timeout_secs` |
// | `DATAROOM_ADMIN_EMAILS`        | `admin_emails` (comma-separated) |
// | `LOG_FORMAT`                   | `log_format`          |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DataroomError, Result};

pub const CONFIG_FILE: &str = "config.json";

/// Log output flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Persistent application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataroomConfig {
    /// Socket address the HTTP surface binds to.
    pub bind_addr: String,
    /// Root for uploads, rendition cache, and the database.
    pub data_dir: PathBuf,
    /// Overrides `<data_dir>/uploads/files`.
    pub upload_dir: Option<PathBuf>,
    /// Overrides `<data_dir>/uploads/cache`.
    pub cache_dir: Option<PathBuf>,
    /// Overrides `<data_dir>/dataroom.db`.
    pub database_path: Option<PathBuf>,
    /// Hard wall-clock budget for one video encode.
    pub encode_timeout_secs: u64,
    /// Encoder binary (must understand ffmpeg's CLI and `drawtext`).
    pub ffmpeg_path: PathBuf,
    pub video_label_font_size: u32,
    pub video_caption_font_size: u32,
    /// Emails treated as administrators.
    pub admin_emails: Vec<String>,
    pub log_format: LogFormat,
}

impl Default for DataroomConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            data_dir: PathBuf::from("."),
            upload_dir: None,
            cache_dir: None,
            database_path: None,
            encode_timeout_secs: 15,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            video_label_font_size: 28,
            video_caption_font_size: 20,
            admin_emails: Vec::new(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl DataroomConfig {
    /// Defaults rooted at `data_dir`, overlaid with `config.json` if present.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str::<Self>(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e.into()),
        };
        config.data_dir = data_dir.to_path_buf();
        Ok(config)
    }

    /// Apply environment overrides through `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("DATAROOM_BIND") {
            self.bind_addr = bind;
        }
        if let Some(ffmpeg) = lookup("DATAROOM_FFMPEG") {
            self.ffmpeg_path = PathBuf::from(ffmpeg);
        }
        if let Some(secs) = lookup("DATAROOM_ENCODE_TIMEOUT_SECS") {
            self.encode_timeout_secs = secs.trim().parse().map_err(|_| {
                DataroomError::Config(format!("DATAROOM_ENCODE_TIMEOUT_SECS is not a number: {secs}"))
            })?;
        }
        if let Some(admins) = lookup("DATAROOM_ADMIN_EMAILS") {
            self.admin_emails = admins
                .split(',')
                .map(|e| e.trim().to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect();
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.log_format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(DataroomError::Config(format!("unknown LOG_FORMAT: {other}")));
                }
            };
        }
        Ok(())
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("uploads").join("files"))
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("uploads").join("cache"))
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("dataroom.db"))
    }

    pub fn encode_timeout(&self) -> Duration {
        Duration::from_secs(self.encode_timeout_secs)
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails
            .iter()
            .any(|admin| admin.eq_ignore_ascii_case(email.trim()))
    }
}
