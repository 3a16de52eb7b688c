//! Response shaping shared by every route.
//!
//! Handlers build a [`Reply`] and pick the body variant explicitly; the
//! conversion to an HTTP response fills in the content type and falls back to
//! the status line when there is no body. CORS headers are attached by
//! [`apply_cors_headers`] once the final response exists.

use crate::config::Settings;
use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::Value;

pub const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
pub const TEXT_HTML: &str = "text/html; charset=utf-8";
pub const APPLICATION_JSON: &str = "application/json";

/// Request headers browsers may send cross-origin. jQuery ajax adds
/// `x-requested-with`.
const ALLOW_HEADERS: &str = "x-requested-with";
const ALLOW_METHODS: &str = "OPTIONS, GET, POST";

#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    /// Preformatted text sent with the given MIME type.
    Text {
        content: String,
        mimetype: &'static str,
    },
    /// A value serialized as `application/json`.
    Structured(Value),
    /// No content: the body is the status line, e.g. `411 Length Required`.
    StatusLine,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: ReplyBody,
}

impl Reply {
    pub fn text(content: impl Into<String>, mimetype: &'static str) -> Self {
        Self {
            status: StatusCode::OK,
            body: ReplyBody::Text {
                content: content.into(),
                mimetype,
            },
        }
    }

    pub fn plain(content: impl Into<String>) -> Self {
        Self::text(content, TEXT_PLAIN)
    }

    pub fn structured(value: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: ReplyBody::Structured(value),
        }
    }

    /// A reply whose body is its own status line.
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            body: ReplyBody::StatusLine,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

/// `"<code> <reason>"`, using the RFC 2616 phrase for 413.
pub fn status_line(status: StatusCode) -> String {
    let reason = match status {
        StatusCode::PAYLOAD_TOO_LARGE => "Request Entity Too Large",
        other => other.canonical_reason().unwrap_or(""),
    };
    format!("{} {}", status.as_u16(), reason).trim_end().to_string()
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let (content, mimetype) = match self.body {
            ReplyBody::Text { content, mimetype } => (content, mimetype),
            ReplyBody::Structured(value) => (value.to_string(), APPLICATION_JSON),
            ReplyBody::StatusLine => (status_line(self.status), TEXT_PLAIN),
        };

        let mut response = Response::new(Body::from(content));
        *response.status_mut() = self.status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(mimetype));
        response
    }
}

/// Attach the cross-origin headers every response carries.
pub fn apply_cors_headers(headers: &mut HeaderMap, settings: &Settings) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        settings.allow_origins.clone(),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
}
