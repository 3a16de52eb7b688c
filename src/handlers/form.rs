//! Publish form extraction.
//!
//! Accepts `application/x-www-form-urlencoded` and `multipart/form-data`
//! bodies. Anything else, or a body that fails to decode, yields an empty
//! form so the publish handler reports unrecognized content.

use axum::{
    Form,
    extract::{FromRequest, Multipart, Request},
    http::header,
};
use tracing::debug;

/// Decoded form fields in arrival order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FormFields(Vec<(String, String)>);

impl FormFields {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self(fields)
    }

    /// The value of `name`. When a field repeats, the last value wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    /// Read and decode the request body.
    pub async fn from_request(req: Request) -> Self {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase())
            .unwrap_or_default();

        if content_type.starts_with("multipart/form-data") {
            match Multipart::from_request(req, &()).await {
                Ok(multipart) => Self::from_multipart(multipart).await,
                Err(rejection) => {
                    debug!("multipart body rejected: {}", rejection);
                    Self::default()
                }
            }
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            match Form::<Vec<(String, String)>>::from_request(req, &()).await {
                Ok(Form(fields)) => Self(fields),
                Err(rejection) => {
                    debug!("form body rejected: {}", rejection);
                    Self::default()
                }
            }
        } else {
            debug!("ignoring body with content type `{}`", content_type);
            Self::default()
        }
    }

    async fn from_multipart(mut multipart: Multipart) -> Self {
        let mut fields = Vec::new();
        loop {
            match multipart.next_field().await {
                Ok(Some(field)) => {
                    let Some(name) = field.name().map(str::to_string) else {
                        continue;
                    };
                    match field.text().await {
                        Ok(value) => fields.push((name, value)),
                        Err(err) => {
                            debug!("multipart field `{}` unreadable: {}", name, err);
                            return Self::default();
                        }
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    debug!("multipart body malformed: {}", err);
                    return Self::default();
                }
            }
        }
        Self(fields)
    }
}
