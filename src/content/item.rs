//! Content item definition.

use serde::{Deserialize, Serialize};

/// Kind of media carried by a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Text,
    Photo,
    Video,
    Document,
}

impl MediaKind {
    /// Returns the lowercase name used in snapshots and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Text => "text",
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Document => "document",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A piece of inbound content to publish.
///
/// Serialized to JSON when enqueued so that jobs never depend on the
/// original value staying alive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Media kind.
    #[serde(rename = "type")]
    pub kind: MediaKind,
    /// Stable identifier of the upstream media file, if any.
    #[serde(default)]
    pub file_id: Option<String>,
    /// Text caption or message body.
    #[serde(default)]
    pub caption: Option<String>,
    /// Path of the downloaded media on local disk.
    #[serde(default)]
    pub local_path: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Duration in seconds (video).
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// Size in bytes.
    #[serde(default)]
    pub file_size: Option<u64>,
}

impl ContentItem {
    /// Creates a content item of the given kind with every optional field empty.
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            file_id: None,
            caption: None,
            local_path: None,
            mime_type: None,
            duration: None,
            width: None,
            height: None,
            file_size: None,
        }
    }

    /// Creates a text item.
    pub fn text(caption: impl Into<String>) -> Self {
        Self::new(MediaKind::Text).with_caption(caption)
    }

    /// Sets the upstream file identifier.
    pub fn with_file_id(mut self, file_id: impl Into<String>) -> Self {
        self.file_id = Some(file_id.into());
        self
    }

    /// Sets the caption.
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// Sets the local media path.
    pub fn with_local_path(mut self, path: impl Into<String>) -> Self {
        self.local_path = Some(path.into());
        self
    }

    /// Sets the MIME type.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Identifier shared by every job created from this item.
    pub fn stable_id(&self) -> Option<&str> {
        self.file_id.as_deref()
    }

    /// Serializes the item into the snapshot stored with each job.
    pub fn to_snapshot(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses a stored snapshot back into a content item.
    pub fn from_snapshot(snapshot: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(snapshot)
    }

    /// Caption shortened for log lines.
    pub fn caption_preview(&self) -> &str {
        match self.caption.as_deref() {
            Some(c) => match c.char_indices().nth(50) {
                Some((idx, _)) => &c[..idx],
                None => c,
            },
            None => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_uses_type_field() {
        let item = ContentItem::new(MediaKind::Photo)
            .with_file_id("abc")
            .with_caption("hello");

        let snapshot = item.to_snapshot().expect("serialization should work");
        let value: serde_json::Value = serde_json::from_str(&snapshot).unwrap();
        assert_eq!(value["type"], "photo");
        assert_eq!(value["file_id"], "abc");

        let parsed = ContentItem::from_snapshot(&snapshot).unwrap();
        assert_eq!(parsed, item);
    }

    #[test]
    fn test_from_snapshot_accepts_sparse_payload() {
        let parsed = ContentItem::from_snapshot(r#"{"type":"video"}"#).unwrap();
        assert_eq!(parsed.kind, MediaKind::Video);
        assert!(parsed.file_id.is_none());
        assert!(parsed.stable_id().is_none());
    }

    #[test]
    fn test_from_snapshot_rejects_unknown_kind() {
        assert!(ContentItem::from_snapshot(r#"{"type":"hologram"}"#).is_err());
        assert!(ContentItem::from_snapshot("not json").is_err());
    }

    #[test]
    fn test_caption_preview_truncates_on_char_boundary() {
        let item = ContentItem::text("é".repeat(80));
        assert_eq!(item.caption_preview().chars().count(), 50);

        let short = ContentItem::text("short");
        assert_eq!(short.caption_preview(), "short");
        assert_eq!(ContentItem::new(MediaKind::Document).caption_preview(), "");
    }
}
