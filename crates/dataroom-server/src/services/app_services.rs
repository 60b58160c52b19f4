// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer: opens the database, builds the renderer table and
// the dispatcher, and is handed to every HTTP handler as router state.
//
// The SQLite handle is `Send` but not `Sync`, so it is shared as
// `Arc<Mutex<>>` (inside `SharedDatabase`). Contention is low because every
// operation is a short query.

use std::sync::Arc;

use tracing::info;

use dataroom_core::DataroomConfig;
use dataroom_core::error::Result;
use dataroom_delivery::{AccessPolicy, Dispatcher, SharedDatabase, UploadStore};
use dataroom_render::{OverlayEncoder, RendererTable, RenditionCache, VideoWatermarker};
use dataroom_store::Database;

/// Shared services, cheap to clone.
#[derive(Clone)]
pub struct AppServices {
    pub config: Arc<DataroomConfig>,
    pub db: SharedDatabase,
    pub policy: AccessPolicy,
    pub dispatcher: Dispatcher,
    pub uploads: UploadStore,
}

impl AppServices {
    /// Open persistent state under the configured directories. Call once at
    /// startup.
    pub fn init(config: DataroomConfig) -> Result<Self> {
        let upload_dir = config.upload_dir();
        std::fs::create_dir_all(&upload_dir)?;
        let database = Database::open(config.database_path())?;
        info!(
            uploads = %upload_dir.display(),
            cache = %config.cache_dir().display(),
            database = %config.database_path().display(),
            "app services initialised"
        );
        Ok(Self::with_database(config, database))
    }

    /// Wire services around an already-open database.
    pub fn with_database(config: DataroomConfig, database: Database) -> Self {
        let db = SharedDatabase::new(database);

        let encoder = OverlayEncoder::new(&config.ffmpeg_path, config.encode_timeout())
            .with_font_sizes(config.video_label_font_size, config.video_caption_font_size);
        let video = VideoWatermarker::new(RenditionCache::new(config.cache_dir()), encoder);

        let uploads = UploadStore::new(config.upload_dir());
        let dispatcher = Dispatcher::new(
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            uploads.clone(),
            RendererTable::standard(Arc::new(video)),
        );
        let policy = AccessPolicy::from_config(&config, Arc::new(db.clone()));

        Self {
            config: Arc::new(config),
            db,
            policy,
            dispatcher,
            uploads,
        }
    }
}
