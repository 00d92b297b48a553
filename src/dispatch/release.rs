//! Release of shared content assets.
//!
//! Once every job of a correlation group is terminal, the sweeper hands the
//! group's content to an `AssetReleaser`. Implementations must tolerate
//! being called again for an asset that is already gone.

use std::io::ErrorKind;

use async_trait::async_trait;

use crate::content::ContentItem;
use crate::error::ReleaseError;

/// Frees resources shared by all jobs of one content item.
#[async_trait]
pub trait AssetReleaser: Send + Sync {
    async fn release(&self, correlation_id: &str, content: &ContentItem)
        -> Result<(), ReleaseError>;
}

/// Deletes the downloaded media file.
#[derive(Debug, Clone, Default)]
pub struct LocalFileReleaser;

impl LocalFileReleaser {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AssetReleaser for LocalFileReleaser {
    async fn release(
        &self,
        correlation_id: &str,
        content: &ContentItem,
    ) -> Result<(), ReleaseError> {
        let Some(ref path) = content.local_path else {
            return Ok(());
        };

        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                tracing::info!(correlation_id = %correlation_id, path = %path, "Deleted media file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(correlation_id = %correlation_id, path = %path, "Media file already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Releases nothing.
#[derive(Debug, Clone, Default)]
pub struct NoopReleaser;

#[async_trait]
impl AssetReleaser for NoopReleaser {
    async fn release(
        &self,
        _correlation_id: &str,
        _content: &ContentItem,
    ) -> Result<(), ReleaseError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MediaKind;

    #[tokio::test]
    async fn test_local_file_release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, b"jpeg").unwrap();

        let item = ContentItem::new(MediaKind::Photo)
            .with_file_id("f1")
            .with_local_path(path.to_str().unwrap());
        let releaser = LocalFileReleaser::new();

        releaser.release("f1", &item).await.unwrap();
        assert!(!path.exists());

        // Second call finds nothing to delete
        releaser.release("f1", &item).await.unwrap();
    }

    #[tokio::test]
    async fn test_release_without_local_path() {
        let item = ContentItem::text("no media");
        LocalFileReleaser::new().release("x", &item).await.unwrap();
        NoopReleaser.release("x", &item).await.unwrap();
    }
}
