//! End-to-end tests for the HTTP surface.
//!
//! Drives the full router (dispatch, body limit, CORS) with in-memory
//! storage and a fixed clock.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, Response, StatusCode, header},
};
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use hackpub::{
    AppState, build_router,
    config::Settings,
    models::{metadata::Metadata, resource::key_from_url},
    services::{
        clock::FixedClock,
        memory_storage::MemoryStorage,
        storage_service::{Storage, StorageError, StorageResult},
    },
};
use serde_json::{Value, json};
use tower::ServiceExt;

const FORM: &str = "application/x-www-form-urlencoded";

fn settings() -> Settings {
    Settings {
        allow_origins: HeaderValue::from_static("http://toolness.github.io"),
        enable_ppx: false,
        max_payload_size: 1000,
    }
}

fn app_with(settings: Settings) -> (Router, MemoryStorage) {
    let storage = MemoryStorage::new("http://published.test/p");
    let clock = FixedClock(Utc.with_ymd_and_hms(2012, 5, 4, 13, 30, 0).unwrap());
    let state = AppState::new(settings, storage.clone(), Arc::new(clock));
    (build_router(state), storage)
}

fn app() -> (Router, MemoryStorage) {
    app_with(settings())
}

fn request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn publish(body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/publish")
        .header(header::CONTENT_TYPE, FORM)
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(resp: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(resp: Response<Body>) -> Value {
    serde_json::from_str(&body_text(resp).await).unwrap()
}

fn assert_cors(resp: &Response<Body>) {
    let headers = resp.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://toolness.github.io"
    );
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
        "x-requested-with"
    );
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_METHODS],
        "OPTIONS, GET, POST"
    );
}

#[tokio::test]
async fn options_is_allowed_on_any_path() {
    let (app, _) = app();
    for path in ["/", "/publish", "/does/not/exist"] {
        let resp = app
            .clone()
            .oneshot(request(Method::OPTIONS, path))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_cors(&resp);
        assert_eq!(body_text(resp).await, "");
    }
}

#[tokio::test]
async fn robots_txt_disallows_everything() {
    let (app, _) = app();
    let resp = app
        .oneshot(request(Method::GET, "/robots.txt"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(
        resp.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
    assert_cors(&resp);
    assert_eq!(body_text(resp).await, "User-agent: *\r\nDisallow: /\r\n");
}

#[tokio::test]
async fn ppx_server_requires_flag() {
    let (app, _) = app();
    let resp = app
        .oneshot(request(Method::GET, "/ppx-server"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let (app, _) = app_with(Settings {
        enable_ppx: true,
        ..settings()
    });
    let resp = app
        .oneshot(request(Method::GET, "/ppx-server"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(
        resp.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/html")
    );
    assert!(body_text(resp).await.contains("PPX.startServer();"));
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let (app, _) = app();
    let resp = app
        .oneshot(request(Method::GET, "/unknown/path"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_cors(&resp);
    assert_eq!(body_text(resp).await, "not found: /unknown/path");
}

#[tokio::test]
async fn other_methods_are_not_allowed() {
    let (app, _) = app();
    for method in [Method::DELETE, Method::PUT, Method::PATCH] {
        let resp = app
            .clone()
            .oneshot(request(method, "/publish"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_cors(&resp);
        assert_eq!(body_text(resp).await, "405 Method Not Allowed");
    }
}

#[tokio::test]
async fn unknown_metadata_key_is_not_found() {
    let (app, _) = app();
    let resp = app
        .oneshot(request(Method::GET, "/metadata/abc123"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_text(resp).await, "not found: /metadata/abc123");
}

#[tokio::test]
async fn publish_json_then_fetch_metadata() {
    let (app, storage) = app();
    let resp = app
        .clone()
        .oneshot(publish("json=%7B%22x%22%3A1%7D"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
    assert_cors(&resp);

    let body = body_json(resp).await;
    let url = body["published-url"].as_str().unwrap();
    assert!(url.starts_with("http://published.test/p/"));
    assert_eq!(body.as_object().unwrap().len(), 1);

    let key = key_from_url(url).unwrap();
    let stored = storage.get(key).unwrap();
    assert_eq!(stored.content, Bytes::from_static(br#"{"x":1}"#));
    assert_eq!(stored.mimetype, "application/json");

    let resp = app
        .oneshot(request(Method::GET, &format!("/metadata/{key}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_cors(&resp);
    let metadata = body_json(resp).await;
    assert_eq!(metadata, json!({"created": "Fri, 04 May 2012 13:30:00 GMT"}));
    let created = metadata["created"].as_str().unwrap();
    assert!(DateTime::parse_from_rfc2822(created).is_ok());
}

#[tokio::test]
async fn publish_keeps_raw_json_text() {
    let (app, storage) = app();
    let resp = app
        .oneshot(publish("json=%7B+%22a%22+%3A+1+%7D"))
        .await
        .unwrap();
    let body = body_json(resp).await;
    let key = key_from_url(body["published-url"].as_str().unwrap()).unwrap();
    assert_eq!(
        storage.get(key).unwrap().content,
        Bytes::from_static(br#"{ "a" : 1 }"#)
    );
}

#[tokio::test]
async fn publish_html_with_original_url() {
    let (app, storage) = app();
    let resp = app
        .clone()
        .oneshot(publish(
            "html=%3Ch1%3EHi%3C%2Fh1%3E&original-url=http%3A%2F%2Fexample.org%2Fpage",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    let url = body["published-url"].as_str().unwrap();
    assert!(url.ends_with(".html"));

    let key = key_from_url(url).unwrap();
    let stored = storage.get(key).unwrap();
    assert_eq!(stored.content, Bytes::from_static(b"<h1>Hi</h1>"));
    assert_eq!(stored.mimetype, "text/html; charset=utf-8");

    let resp = app
        .oneshot(request(Method::GET, &format!("/metadata/{key}")))
        .await
        .unwrap();
    assert_eq!(
        body_json(resp).await,
        json!({
            "created": "Fri, 04 May 2012 13:30:00 GMT",
            "original-url": "http://example.org/page",
        })
    );
}

#[tokio::test]
async fn publish_multipart_form() {
    let (app, storage) = app();
    let body = "--B\r\n\
        Content-Disposition: form-data; name=\"json\"\r\n\r\n\
        [true]\r\n\
        --B--\r\n";
    let req = Request::builder()
        .method(Method::POST)
        .uri("/publish")
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=B")
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(storage.len(), 1);
}

#[tokio::test]
async fn publish_without_content_length_is_411() {
    let (app, storage) = app();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/publish")
        .header(header::CONTENT_TYPE, FORM)
        .body(Body::from("json=%7B%7D"))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::LENGTH_REQUIRED);
    assert_cors(&resp);
    assert_eq!(body_text(resp).await, "411 Length Required");
    assert!(storage.is_empty());
}

#[tokio::test]
async fn publish_over_limit_is_413() {
    let (app, storage) = app();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/publish")
        .header(header::CONTENT_TYPE, FORM)
        .header(header::CONTENT_LENGTH, "1001")
        .body(Body::from("json=%7B%7D"))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_text(resp).await, "413 Request Entity Too Large");
    assert!(storage.is_empty());
}

#[tokio::test]
async fn publish_at_limit_is_accepted() {
    let (app, _) = app();
    let padding = " ".repeat(1000 - "json=1".len());
    let body = format!("json=1{padding}");
    assert_eq!(body.len(), 1000);
    let resp = app.oneshot(publish(&body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_json_is_400() {
    let (app, storage) = app();
    let resp = app.oneshot(publish("json=%7Bnope")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_cors(&resp);
    assert_eq!(body_text(resp).await, "Malformed JSON.");
    assert!(storage.is_empty());
}

#[tokio::test]
async fn empty_json_field_is_malformed() {
    let (app, _) = app();
    let resp = app.oneshot(publish("json=")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(resp).await, "Malformed JSON.");
}

#[tokio::test]
async fn blank_html_is_unrecognized() {
    let (app, storage) = app();
    let resp = app.oneshot(publish("html=+%0A%09+")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(resp).await, "Unrecognized content.");
    assert!(storage.is_empty());
}

#[tokio::test]
async fn missing_fields_are_unrecognized() {
    let (app, _) = app();
    let resp = app.oneshot(publish("text=hello")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(resp).await, "Unrecognized content.");
}

/// Storage whose every call fails.
#[derive(Clone)]
struct BrokenStorage;

impl Storage for BrokenStorage {
    async fn get_metadata(&self, key: &str) -> StorageResult<Option<Metadata>> {
        Err(StorageError::InvalidKey(key.to_string()))
    }

    async fn create(
        &self,
        _content: Bytes,
        _mimetype: &str,
        _metadata: Metadata,
    ) -> StorageResult<String> {
        Err(StorageError::Io(std::io::Error::other("disk full")))
    }
}

#[tokio::test]
async fn storage_failures_surface_as_500_with_cors() {
    let clock = FixedClock(Utc.with_ymd_and_hms(2012, 5, 4, 13, 30, 0).unwrap());
    let app = build_router(AppState::new(settings(), BrokenStorage, Arc::new(clock)));

    let resp = app.clone().oneshot(publish("json=1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_cors(&resp);
    assert_eq!(
        body_json(resp).await,
        json!({"error": "disk full", "status": 500})
    );

    let resp = app
        .oneshot(request(Method::GET, "/metadata/abc"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_cors(&resp);
}
