//! Dry-run dispatcher that only logs what it would publish.

use async_trait::async_trait;

use crate::content::ContentItem;
use crate::error::DispatchError;

use super::Dispatcher;

/// Logs each post and reports success without a reference.
#[derive(Debug, Clone, Default)]
pub struct LogDispatcher;

impl LogDispatcher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Dispatcher for LogDispatcher {
    fn kind(&self) -> &str {
        "log"
    }

    async fn dispatch(
        &self,
        target: &str,
        content: &ContentItem,
    ) -> Result<Option<String>, DispatchError> {
        tracing::info!(
            target_name = %target,
            kind = %content.kind,
            caption = content.caption_preview(),
            file = ?content.local_path,
            "Would post content"
        );
        Ok(None)
    }
}
