// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// dataroom-delivery: turns (document, requester) into the bytes that leave
// the system. Resolves and gates requesters, dispatches to the watermark
// renderers with fallback to the original, records access events, and
// deletes documents together with their cached renditions.

pub mod access;
pub mod dispatcher;
pub mod payload;
pub mod ports;
pub mod storage;

pub use access::AccessPolicy;
pub use dispatcher::{Disposition, Dispatcher, RenderedOutput};
pub use payload::Payload;
pub use ports::{AccessRecorder, DocumentCatalog, SharedDatabase, ViewerDirectory, blocking};
pub use storage::UploadStore;
