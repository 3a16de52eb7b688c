//! Metadata attached to a published resource.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Key-value metadata returned by `GET /metadata/<key>`.
///
/// Always contains [`CREATED`]; may contain [`ORIGINAL_URL`] when the
/// publisher supplied one.
pub type Metadata = BTreeMap<String, String>;

/// Server-assigned creation time, formatted as an HTTP-date.
pub const CREATED: &str = "created";

/// Client-supplied URL of the page the content was published from.
pub const ORIGINAL_URL: &str = "original-url";

/// Format a timestamp as an IMF-fixdate (RFC 7231), e.g.
/// `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
