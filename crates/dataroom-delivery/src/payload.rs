// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Delivery payloads.

use std::path::Path;

use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// The bytes leaving the system. Documents rendered in memory are buffered;
/// videos are handed over as an already-open file and streamed, so removing
/// the cache entry mid-response does not cut the response short.
#[derive(Debug)]
pub enum Payload {
    Buffered(Vec<u8>),
    File { file: File, len: u64 },
}

impl Payload {
    pub async fn open(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path).await?;
        let len = file.metadata().await?.len();
        Ok(Self::File { file, len })
    }

    pub fn len(&self) -> u64 {
        match self {
            Self::Buffered(bytes) => bytes.len() as u64,
            Self::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_streamed(&self) -> bool {
        matches!(self, Self::File { .. })
    }

    /// The whole payload in memory.
    pub async fn into_bytes(self) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Buffered(bytes) => Ok(bytes),
            Self::File { mut file, len } => {
                let mut bytes = Vec::with_capacity(usize::try_from(len).unwrap_or(0));
                file.read_to_end(&mut bytes).await?;
                Ok(bytes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opened_file_reports_its_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"frames").unwrap();

        let payload = Payload::open(&path).await.unwrap();
        assert!(payload.is_streamed());
        assert_eq!(payload.len(), 6);
        assert_eq!(payload.into_bytes().await.unwrap(), b"frames");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn open_file_outlives_its_directory_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"frames").unwrap();

        let payload = Payload::open(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(payload.into_bytes().await.unwrap(), b"frames");
    }

    #[test]
    fn buffered_length() {
        let payload = Payload::Buffered(vec![0; 3]);
        assert!(!payload.is_streamed());
        assert_eq!(payload.len(), 3);
        assert!(Payload::Buffered(Vec::new()).is_empty());
    }
}
