//! Attachment downloads
//!
//! [`AssetStore::fetch`] never fails the enclosing item: a missing attachment
//! is logged, reported as [`Event::AttachmentFailed`] and tolerated.

use crate::config::JitterBounds;
use crate::error::{PersistenceError, Result};
use crate::transport::Transport;
use crate::types::Event;
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;

/// Streams attachments from the source to disk
#[derive(Clone)]
pub struct AssetStore {
    transport: Arc<dyn Transport>,
    jitter: JitterBounds,
    event_tx: broadcast::Sender<Event>,
}

impl AssetStore {
    /// Create a store that pauses within `jitter` before every download
    pub fn new(
        transport: Arc<dyn Transport>,
        jitter: JitterBounds,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            transport,
            jitter,
            event_tx,
        }
    }

    /// Download `url` into `dest`
    ///
    /// Returns `true` if `dest` holds the attachment afterwards. Downloads
    /// land in `dest` only once complete, so a non-empty file already there
    /// counts as downloaded and is not fetched again.
    pub async fn fetch(&self, url: &str, dest: &Path) -> bool {
        if let Ok(meta) = tokio::fs::metadata(dest).await
            && meta.is_file()
            && meta.len() > 0
        {
            tracing::debug!(url = %url, dest = %dest.display(), "Attachment already on disk");
            return true;
        }

        self.jitter.sleep().await;

        match self.download(url, dest).await {
            Ok(bytes) => {
                tracing::info!(url = %url, dest = %dest.display(), bytes, "Saved attachment");
                true
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Attachment download failed");
                // Ignore send errors (no subscribers)
                self.event_tx
                    .send(Event::AttachmentFailed {
                        url: url.to_string(),
                        error: e.to_string(),
                    })
                    .ok();
                false
            }
        }
    }

    /// Stream `url` into a temporary file next to `dest`, then rename it
    ///
    /// `dest` only ever appears complete. An interrupted download (error or
    /// dropped future) leaves nothing behind because the temporary file is
    /// deleted when it goes out of scope.
    async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut stream = self.transport.download_bytes(url).await?;

        let write_err = |source| PersistenceError::Write {
            path: dest.to_path_buf(),
            source,
        };

        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let tmp = tempfile::Builder::new()
            .prefix(".partial-")
            .tempfile_in(dir)
            .map_err(write_err)?;
        let mut file = tokio::fs::File::from_std(tmp.reopen().map_err(write_err)?);

        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(write_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        drop(file);

        tmp.persist(dest).map_err(|e| write_err(e.error))?;
        Ok(written)
    }
}
