//! Webhook dispatcher against a mock HTTP server.

use mockito::{Matcher, Server};
use serde_json::json;

use forwardr::content::{ContentItem, MediaKind};
use forwardr::dispatch::{Dispatcher, WebhookDispatcher};
use forwardr::error::DispatchError;

#[tokio::test]
async fn posts_content_and_returns_reference() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/hook")
        .match_header("authorization", "Bearer secret")
        .match_body(Matcher::PartialJson(json!({
            "type": "photo",
            "caption": "sunset",
            "file_path": "/tmp/sunset.jpg",
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"url":"https://site/p/42"}"#)
        .create_async()
        .await;

    let dispatcher =
        WebhookDispatcher::new(format!("{}/hook", server.url()), Some("secret".to_string()))
            .unwrap();
    let item = ContentItem::new(MediaKind::Photo)
        .with_caption("sunset")
        .with_local_path("/tmp/sunset.jpg");

    let reference = dispatcher.dispatch("site", &item).await.unwrap();
    assert_eq!(reference.as_deref(), Some("https://site/p/42"));

    mock.assert_async().await;
}

#[tokio::test]
async fn success_without_url_has_no_reference() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/hook")
        .match_header("authorization", Matcher::Missing)
        .with_status(201)
        .with_body("{}")
        .create_async()
        .await;

    let dispatcher = WebhookDispatcher::new(format!("{}/hook", server.url()), None).unwrap();
    let reference = dispatcher
        .dispatch("site", &ContentItem::text("hello"))
        .await
        .unwrap();
    assert!(reference.is_none());

    mock.assert_async().await;
}

#[tokio::test]
async fn error_status_becomes_dispatch_error() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/hook")
        .with_status(500)
        .with_body(r#"{"error":"down"}"#)
        .create_async()
        .await;

    let dispatcher = WebhookDispatcher::new(format!("{}/hook", server.url()), None).unwrap();
    let err = dispatcher
        .dispatch("site", &ContentItem::text("hello"))
        .await
        .unwrap_err();
    match err {
        DispatchError::Status { code, body } => {
            assert_eq!(code, 500);
            assert!(body.contains("down"));
        }
        other => panic!("unexpected error: {other}"),
    }

    mock.assert_async().await;
}
