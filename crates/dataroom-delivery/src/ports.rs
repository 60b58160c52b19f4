// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Narrow contracts the delivery pipeline consumes from its collaborators,
// and their SQLite-backed implementation.
//
// The store's `Database` is `Send` but not `Sync`, so the shared handle
// wraps it in `Arc<Mutex<>>`. Every call is a short SQLite query; async
// callers go through `blocking` so the runtime is never stalled.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dataroom_core::error::{DataroomError, Result};
use dataroom_core::{
    AccessEvent, AccessEventId, AccessRequest, Document, DocumentId, InvestorRecord,
};
use dataroom_store::Database;

/// Document lookup and removal.
pub trait DocumentCatalog: Send + Sync {
    /// `NotFound` if there is no such document.
    fn document(&self, id: DocumentId) -> Result<Document>;
    /// Remove the record; `false` if it was already gone.
    fn remove_document(&self, id: DocumentId) -> Result<bool>;
}

/// Resolves an authenticated email to its investor record, if any.
pub trait ViewerDirectory: Send + Sync {
    fn investor_by_email(&self, email: &str) -> Result<Option<InvestorRecord>>;
}

/// The access ledger.
pub trait AccessRecorder: Send + Sync {
    fn log_access(&self, request: &AccessRequest) -> Result<AccessEvent>;
    fn update_duration(&self, id: AccessEventId, duration_secs: i64) -> Result<()>;
}

/// Run a synchronous collaborator call on the blocking pool.
pub async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| DataroomError::Io(std::io::Error::other(e)))?
}

// ---------------------------------------------------------------------------
// SQLite adapter
// ---------------------------------------------------------------------------

/// Cloneable handle to the one database connection.
#[derive(Clone)]
pub struct SharedDatabase {
    inner: Arc<Mutex<Database>>,
}

impl SharedDatabase {
    pub fn new(database: Database) -> Self {
        Self {
            inner: Arc::new(Mutex::new(database)),
        }
    }

    /// Lock the connection. A panic while holding the lock cannot leave
    /// SQLite half-written (statements are atomic), so poisoning is ignored.
    pub fn lock(&self) -> MutexGuard<'_, Database> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DocumentCatalog for SharedDatabase {
    fn document(&self, id: DocumentId) -> Result<Document> {
        self.lock().document(id)
    }

    fn remove_document(&self, id: DocumentId) -> Result<bool> {
        self.lock().delete_document(id)
    }
}

impl ViewerDirectory for SharedDatabase {
    fn investor_by_email(&self, email: &str) -> Result<Option<InvestorRecord>> {
        self.lock().investor_by_email(email)
    }
}

impl AccessRecorder for SharedDatabase {
    fn log_access(&self, request: &AccessRequest) -> Result<AccessEvent> {
        self.lock().log_access(request)
    }

    fn update_duration(&self, id: AccessEventId, duration_secs: i64) -> Result<()> {
        self.lock().update_duration(id, duration_secs)
    }
}

#[cfg(test)]
mod tests {
    use dataroom_core::{AccessAction, ClientMetadata, InvestorStatus};

    use super::*;
    use crate::fixtures;

    #[tokio::test]
    async fn blocking_runs_work_off_the_runtime() {
        let db = SharedDatabase::new(Database::open_in_memory().unwrap());
        let doc = fixtures::document("deck.pdf", "application/pdf");
        db.lock().insert_document(&doc).unwrap();

        let catalog: Arc<dyn DocumentCatalog> = Arc::new(db.clone());
        let id = doc.id;
        let found = blocking(move || catalog.document(id)).await.unwrap();
        assert_eq!(found, doc);
    }

    #[test]
    fn adapter_covers_every_port() {
        let db = SharedDatabase::new(Database::open_in_memory().unwrap());
        let doc = fixtures::document("deck.pdf", "application/pdf");
        let investor = fixtures::investor("a@x.com", InvestorStatus::NdaAccepted);
        db.lock().insert_document(&doc).unwrap();
        db.lock().insert_investor(&investor).unwrap();

        assert!(db.investor_by_email("A@X.com").unwrap().is_some());
        let event = db
            .log_access(&AccessRequest {
                investor_id: investor.id,
                document_id: doc.id,
                action: AccessAction::View,
                client: ClientMetadata::default(),
            })
            .unwrap();
        db.update_duration(event.id, 12).unwrap();
        assert_eq!(db.lock().access_event(event.id).unwrap().duration_secs, 12);

        assert!(db.remove_document(doc.id).unwrap());
        assert!(matches!(
            DocumentCatalog::document(&db, doc.id).unwrap_err(),
            DataroomError::NotFound(_)
        ));
    }
}
