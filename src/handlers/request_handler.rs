//! The request handler: classifies each request by method and path and turns
//! it into exactly one [`Reply`].
//!
//! | Method  | Path               | Behavior                                 |
//! |---------|--------------------|------------------------------------------|
//! | OPTIONS | any                | empty 200 (CORS preflight)               |
//! | GET     | `/robots.txt`      | disallow-all robots file                 |
//! | GET     | `/ppx-server`      | PPX frame document, when enabled         |
//! | GET     | `/metadata/{key}`  | stored metadata as JSON                  |
//! | POST    | `/publish`         | validate and store JSON or HTML content  |
//! | other   | any                | 405                                      |
//!
//! Anything left over is a 404 naming the path.

use crate::{
    config::Settings,
    errors::AppError,
    handlers::{
        form::FormFields,
        reply::{Reply, TEXT_HTML, apply_cors_headers},
    },
    models::{
        metadata::{CREATED, Metadata, ORIGINAL_URL, http_date},
        resource::ContentKind,
    },
    services::{
        clock::Clock,
        storage_service::{Storage, StorageResult},
    },
};
use axum::{
    extract::{Request, State},
    http::{Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use regex::Regex;
use serde::de::IgnoredAny;
use serde_json::json;
use std::sync::{Arc, LazyLock};
use tracing::{debug, error, info};

static METADATA_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/metadata/([0-9a-zA-Z]+)$").expect("metadata path pattern is valid")
});

const ROBOTS_TXT: &str = "User-agent: *\r\nDisallow: /\r\n";

/// Frame page that lets other origins talk to this service through
/// postMessage-proxied XHR.
const PPX_SERVER_HTML: &str = r#"<!DOCTYPE html>
<meta charset="utf-8">
<title>PPX Server Frame</title>
<script src="http://toolness.github.com/postmessage-proxied-xhr/ppx.min.js"></script>
<script>PPX.startServer();</script>"#;

/// Shared state handed to every request: configuration, storage and the
/// clock used to stamp `created`.
pub struct AppState<S> {
    pub settings: Arc<Settings>,
    pub storage: S,
    pub clock: Arc<dyn Clock>,
}

impl<S: Clone> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            storage: self.storage.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<S: Storage> AppState<S> {
    pub fn new(settings: Settings, storage: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings: Arc::new(settings),
            storage,
            clock,
        }
    }

    /// Map a request to its reply. Only storage failures escape as errors.
    pub async fn handle(&self, req: Request) -> StorageResult<Reply> {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        match method {
            Method::OPTIONS => return Ok(Reply::plain("")),
            Method::GET => {
                if let Some(reply) = self.get(&path).await? {
                    return Ok(reply);
                }
            }
            Method::POST if path == "/publish" => return self.publish(req).await,
            _ => return Ok(Reply::status(StatusCode::METHOD_NOT_ALLOWED)),
        }

        debug!("no resource at {}", path);
        Ok(Reply::plain(format!("not found: {}", path)).with_status(StatusCode::NOT_FOUND))
    }

    /// GET routes. `None` means nothing matched and the caller should 404.
    async fn get(&self, path: &str) -> StorageResult<Option<Reply>> {
        if path == "/robots.txt" {
            return Ok(Some(Reply::plain(ROBOTS_TXT)));
        }
        if path == "/ppx-server" && self.settings.enable_ppx {
            return Ok(Some(Reply::text(PPX_SERVER_HTML, TEXT_HTML)));
        }
        let Some(key) = METADATA_PATH.captures(path).and_then(|c| c.get(1)) else {
            return Ok(None);
        };
        let metadata = self.storage.get_metadata(key.as_str()).await?;
        Ok(metadata.map(|metadata| Reply::structured(json!(metadata))))
    }

    /// `POST /publish`. Checks run in order and the first failure wins.
    async fn publish(&self, req: Request) -> StorageResult<Reply> {
        let content_length = req
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0);
        if content_length == 0 {
            return Ok(Reply::status(StatusCode::LENGTH_REQUIRED));
        }
        if content_length > self.settings.max_payload_size {
            debug!(
                "rejecting {} byte payload (limit {})",
                content_length, self.settings.max_payload_size
            );
            return Ok(Reply::status(StatusCode::PAYLOAD_TOO_LARGE));
        }

        let form = FormFields::from_request(req).await;
        let (content, kind) = if let Some(json) = form.get("json") {
            if serde_json::from_str::<IgnoredAny>(json).is_err() {
                return Ok(Reply::plain("Malformed JSON.").with_status(StatusCode::BAD_REQUEST));
            }
            (Bytes::copy_from_slice(json.as_bytes()), ContentKind::Json)
        } else if let Some(html) = form.get("html").filter(|html| !html.trim().is_empty()) {
            (Bytes::copy_from_slice(html.as_bytes()), ContentKind::Html)
        } else {
            return Ok(
                Reply::plain("Unrecognized content.").with_status(StatusCode::BAD_REQUEST)
            );
        };

        let mut metadata = Metadata::new();
        metadata.insert(CREATED.to_string(), http_date(self.clock.now()));
        if let Some(original_url) = form.get(ORIGINAL_URL) {
            metadata.insert(ORIGINAL_URL.to_string(), original_url.to_string());
        }

        let url = self
            .storage
            .create(content, kind.mimetype(), metadata)
            .await?;
        info!("published {} content at {}", kind.extension(), url);

        Ok(Reply::structured(json!({ "published-url": url })))
    }
}

/// Axum entry point for every request. Storage failures become a 500 here;
/// every response leaves with the CORS headers attached.
pub async fn dispatch<S: Storage>(State(state): State<AppState<S>>, req: Request) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let mut response = match state.handle(req).await {
        Ok(reply) => {
            debug!("{} {} -> {}", method, path, reply.status);
            reply.into_response()
        }
        Err(err) => {
            error!("{} {} failed: {}", method, path, err);
            AppError::from(err).into_response()
        }
    };
    apply_cors_headers(response.headers_mut(), &state.settings);
    response
}
