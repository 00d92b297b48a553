//! Webhook dispatcher.
//!
//! POSTs a JSON description of the content to a configured URL. A `url`
//! field in a JSON response body is taken as the published item's reference.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::content::ContentItem;
use crate::error::DispatchError;

use super::Dispatcher;

/// Request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Body sent to the webhook.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    caption: Option<&'a str>,
    file_path: Option<&'a str>,
    mime_type: Option<&'a str>,
}

impl<'a> From<&'a ContentItem> for WebhookPayload<'a> {
    fn from(item: &'a ContentItem) -> Self {
        Self {
            kind: item.kind.as_str(),
            caption: item.caption.as_deref(),
            file_path: item.local_path.as_deref(),
            mime_type: item.mime_type.as_deref(),
        }
    }
}

/// Delivers content by POSTing it to an HTTP endpoint.
pub struct WebhookDispatcher {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl WebhookDispatcher {
    /// Creates a webhook dispatcher for `url`.
    ///
    /// When `api_key` is set it is sent as a bearer token.
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Result<Self, DispatchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Extracts the `url` field from a JSON response body.
fn reference_from_body(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("url")?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl Dispatcher for WebhookDispatcher {
    fn kind(&self) -> &str {
        "webhook"
    }

    async fn dispatch(
        &self,
        target: &str,
        content: &ContentItem,
    ) -> Result<Option<String>, DispatchError> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&WebhookPayload::from(content));

        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read response body".to_string());

        if !status.is_success() {
            return Err(DispatchError::Status {
                code: status.as_u16(),
                body,
            });
        }

        tracing::debug!(target_name = %target, status = status.as_u16(), "Webhook accepted content");
        Ok(reference_from_body(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MediaKind;

    #[test]
    fn test_payload_shape() {
        let item = ContentItem::new(MediaKind::Video)
            .with_caption("clip")
            .with_local_path("/tmp/clip.mp4")
            .with_mime_type("video/mp4");

        let value = serde_json::to_value(WebhookPayload::from(&item)).unwrap();
        assert_eq!(value["type"], "video");
        assert_eq!(value["caption"], "clip");
        assert_eq!(value["file_path"], "/tmp/clip.mp4");
        assert_eq!(value["mime_type"], "video/mp4");
    }

    #[test]
    fn test_reference_from_body() {
        assert_eq!(
            reference_from_body(r#"{"url":"https://site/p/1","id":1}"#).as_deref(),
            Some("https://site/p/1")
        );
        assert!(reference_from_body(r#"{"id":1}"#).is_none());
        assert!(reference_from_body(r#"{"url":42}"#).is_none());
        assert!(reference_from_body("ok").is_none());
    }

    #[test]
    fn test_new_keeps_url() {
        let dispatcher = WebhookDispatcher::new("http://localhost:9/hook", None).unwrap();
        assert_eq!(dispatcher.url(), "http://localhost:9/hook");
        assert_eq!(dispatcher.kind(), "webhook");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_error() {
        let dispatcher = WebhookDispatcher::new("http://127.0.0.1:9/hook", None).unwrap();
        let result = dispatcher
            .dispatch("website", &ContentItem::text("hello"))
            .await;
        assert!(matches!(result, Err(DispatchError::Http(_))));
    }
}
