//! URL helpers shared by discovery, filtering and output layout.

use url::Url;

use crate::error::{DocsCrawlError, Result};

/// Final path segments that name a section landing page rather than a prefix.
const LANDING_SEGMENTS: &[&str] = &["overview", "introduction", "docs"];

/// Parse an absolute http(s) URL.
pub fn parse_http_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| DocsCrawlError::parse(format!("invalid URL '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(DocsCrawlError::validation(format!(
            "unsupported URL scheme '{other}' in {raw}"
        ))),
    }
}

/// Host plus explicit port, lowercased.
pub fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or("").to_ascii_lowercase();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    }
}

/// True when both URLs share an authority.
pub fn same_domain(a: &Url, b: &Url) -> bool {
    authority(a) == authority(b)
}

/// Scheme, authority and path, without query, fragment or trailing slash.
pub fn normalize_url(url: &Url) -> String {
    let path = url.path().trim_end_matches('/');
    format!("{}://{}{}", url.scheme(), authority(url), path)
}

/// `scheme://authority` of a URL.
pub fn origin(url: &Url) -> String {
    format!("{}://{}", url.scheme(), authority(url))
}

/// Path prefix a seed URL restricts the crawl to.
///
/// A trailing landing segment (`overview`, `introduction`, `docs`) is dropped so
/// that `/product/docs` also admits its siblings under `/product`.
pub fn base_path(seed: &Url) -> String {
    let trimmed = seed.path().trim_end_matches('/');
    let mut parts: Vec<&str> = trimmed.split('/').collect();
    if parts
        .last()
        .is_some_and(|last| LANDING_SEGMENTS.contains(last))
    {
        parts.pop();
    }
    parts.join("/")
}

/// URL path without surrounding slashes; `index` for the root.
pub fn relative_path(url: &Url) -> String {
    let cleaned = url.path().trim_matches('/');
    if cleaned.is_empty() {
        "index".to_string()
    } else {
        cleaned.to_string()
    }
}
