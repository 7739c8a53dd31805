//! Sitemap location and `<loc>` extraction.
//!
//! A site's sitemap is found through `robots.txt`, then a short list of
//! conventional paths. When neither yields one, discovery falls back to
//! following links from the base URL's HTML.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, instrument};
use url::Url;

use docscrawl_shared::url::origin;
use docscrawl_shared::{DocsCrawlError, Result};

use crate::filter::RelevanceFilter;
use crate::http::Fetcher;
use crate::links::discover_html_links;

/// Conventional sitemap locations tried after robots.txt, in order.
const COMMON_SITEMAP_PATHS: &[&str] = &["/sitemap.xml", "/sitemap_index.xml", "/sitemap/sitemap.xml"];

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// `Sitemap: <url>` directive in robots.txt.
static ROBOTS_SITEMAP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*sitemap\s*:\s*(\S+)").expect("robots sitemap regex")
});

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex"));

/// Opening tag of a sitemap root element, namespace prefix optional.
static ROOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:[\w.-]+:)?(?:urlset|sitemapindex)[\s>/]").expect("root regex")
});

/// A `<loc>` element; group 1 is its namespace prefix, if any.
static LOC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(?:([\w.-]+):)?loc\s*>(.*?)</(?:[\w.-]+:)?loc\s*>").expect("loc regex")
});

/// `xmlns="..."` or `xmlns:prefix="..."`; group 1 is the prefix.
static XMLNS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bxmlns(?::([\w.-]+))?\s*=\s*["']([^"']*)["']"#).expect("xmlns regex")
});

static CDATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^<!\[CDATA\[(.*)\]\]>$").expect("cdata regex"));

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#x[0-9a-fA-F]+|#[0-9]+|lt|gt|quot|apos|amp);").expect("entity regex")
});

// ---------------------------------------------------------------------------
// SitemapSource
// ---------------------------------------------------------------------------

/// Where page URLs come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapSource {
    /// An XML sitemap or sitemap index.
    Xml(String),
    /// An HTML page to follow links from.
    Html(String),
}

impl SitemapSource {
    fn from_location(location: String) -> Self {
        if is_xml_location(&location) {
            Self::Xml(location)
        } else {
            Self::Html(location)
        }
    }

    pub fn location(&self) -> &str {
        match self {
            Self::Xml(loc) | Self::Html(loc) => loc,
        }
    }
}

/// True when a location names an XML sitemap rather than a page.
pub fn is_xml_location(location: &str) -> bool {
    match Url::parse(location) {
        Ok(url) => url.path().to_ascii_lowercase().ends_with(".xml"),
        Err(_) => location.trim_end().to_ascii_lowercase().ends_with(".xml"),
    }
}

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// Locate the sitemap for `base_url`.
///
/// Each lookup is a single attempt; only an HTTP 200 counts as found.
#[instrument(skip_all, fields(base_url = %base_url))]
pub async fn find_sitemap(fetcher: &Fetcher, base_url: &Url) -> SitemapSource {
    let origin = origin(base_url);

    let robots_url = format!("{origin}/robots.txt");
    if let Some(robots) = fetcher.try_get(&robots_url).await {
        if let Some(found) = sitemap_from_robots(&robots) {
            info!(sitemap = %found, "sitemap declared in robots.txt");
            return SitemapSource::from_location(found);
        }
        debug!("robots.txt has no Sitemap directive");
    }

    for path in COMMON_SITEMAP_PATHS {
        let candidate = format!("{origin}{path}");
        if fetcher.try_get(&candidate).await.is_some() {
            info!(sitemap = %candidate, "sitemap found at common path");
            return SitemapSource::from_location(candidate);
        }
    }

    info!("no sitemap found, falling back to HTML link discovery");
    SitemapSource::Html(base_url.to_string())
}

/// First `Sitemap:` directive in a robots.txt body.
pub fn sitemap_from_robots(robots: &str) -> Option<String> {
    ROBOTS_SITEMAP_RE
        .captures(robots)
        .map(|caps| caps[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Top-level entries of a sitemap source.
///
/// For XML this is every `<loc>` of the document, which may include nested
/// sitemaps. For HTML it is the documentation links reachable within
/// `max_depth` levels.
pub async fn list_entries(
    fetcher: &Fetcher,
    filter: &RelevanceFilter,
    source: &SitemapSource,
    max_depth: u32,
) -> Result<Vec<String>> {
    match source {
        SitemapSource::Xml(location) => {
            let xml = fetcher.get(location).await?;
            let locs = parse_sitemap_locs(&xml)?;
            info!(sitemap = %location, entries = locs.len(), "parsed XML sitemap");
            Ok(locs)
        }
        SitemapSource::Html(location) => {
            let start = docscrawl_shared::url::parse_http_url(location)?;
            Ok(discover_html_links(fetcher, filter, &start, max_depth).await)
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Extract every sitemap-namespace `<loc>` value from a `urlset` or
/// `sitemapindex` document, in document order.
///
/// Locations under other namespaces (`image:loc`, `video:loc`) are skipped.
pub fn parse_sitemap_locs(xml: &str) -> Result<Vec<String>> {
    let body = COMMENT_RE.replace_all(xml, "");

    if !ROOT_RE.is_match(&body) {
        return Err(DocsCrawlError::parse(
            "document is not a sitemap (no <urlset> or <sitemapindex> root)",
        ));
    }

    let namespaces = Namespaces::declared_in(&body);
    let locs = LOC_RE
        .captures_iter(&body)
        .filter(|caps| namespaces.is_sitemap(caps.get(1).map(|m| m.as_str())))
        .map(|caps| decode_loc(caps[2].trim()))
        .filter(|loc| !loc.is_empty())
        .collect();

    Ok(locs)
}

/// Prefix bindings of a sitemap document. The first declaration of a prefix wins.
struct Namespaces {
    default: Option<String>,
    prefixed: Vec<(String, String)>,
}

impl Namespaces {
    fn declared_in(body: &str) -> Self {
        let mut default = None;
        let mut prefixed: Vec<(String, String)> = Vec::new();
        for caps in XMLNS_RE.captures_iter(body) {
            let uri = caps[2].trim().to_string();
            match caps.get(1) {
                None => {
                    default.get_or_insert(uri);
                }
                Some(prefix) => {
                    if !prefixed.iter().any(|(p, _)| p == prefix.as_str()) {
                        prefixed.push((prefix.as_str().to_string(), uri));
                    }
                }
            }
        }
        Self { default, prefixed }
    }

    /// Unprefixed names count when there is no default namespace at all.
    fn is_sitemap(&self, prefix: Option<&str>) -> bool {
        match prefix {
            None => self.default.as_deref().is_none_or(|uri| uri == SITEMAP_NS),
            Some(prefix) => self
                .prefixed
                .iter()
                .any(|(p, uri)| p == prefix && uri == SITEMAP_NS),
        }
    }
}

fn decode_loc(raw: &str) -> String {
    if let Some(caps) = CDATA_RE.captures(raw) {
        return caps[1].trim().to_string();
    }

    ENTITY_RE
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity {
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "amp" => Some('&'),
                numeric => {
                    let code = numeric.trim_start_matches('#');
                    match code.strip_prefix('x') {
                        Some(hex) => u32::from_str_radix(hex, 16).ok(),
                        None => code.parse::<u32>().ok(),
                    }
                    .and_then(char::from_u32)
                }
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
