//! HTML link discovery, used when a site publishes no XML sitemap.

use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::filter::RelevanceFilter;
use crate::http::Fetcher;

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("link selector"));

/// Follow documentation links breadth-first from `start`.
///
/// Depth 1 is the links on `start` itself; each further level fetches the
/// pages found on the previous one. Links are fragment-free, deduplicated and
/// returned in discovery order. Pages that fail to load are skipped.
#[instrument(skip_all, fields(start = %start, max_depth = max_depth))]
pub async fn discover_html_links(
    fetcher: &Fetcher,
    filter: &RelevanceFilter,
    start: &Url,
    max_depth: u32,
) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(strip_fragment(start).to_string());

    let mut found: Vec<String> = Vec::new();
    let mut frontier: Vec<Url> = vec![start.clone()];

    for depth in 1..=max_depth {
        let mut next: Vec<Url> = Vec::new();

        for page in &frontier {
            let body = match fetcher.get(page.as_str()).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(url = %page, error = %e, "skipping page during link discovery");
                    continue;
                }
            };

            for link in extract_links(&body, page) {
                if !filter.is_documentation_link(&link, start) {
                    continue;
                }
                if seen.insert(link.to_string()) {
                    found.push(link.to_string());
                    next.push(link);
                }
            }
        }

        debug!(depth, discovered = found.len(), "link discovery level complete");
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    info!(links = found.len(), "HTML link discovery finished");
    found
}

/// All `<a href>` targets of a page, resolved against `base` with fragments removed.
pub fn extract_links(html: &str, base: &Url) -> Vec<Url> {
    let doc = Html::parse_document(html);

    doc.select(&LINK_SELECTOR)
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty() && !href.starts_with('#'))
        .filter_map(|href| base.join(href).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(|url| strip_fragment(&url))
        .collect()
}

fn strip_fragment(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use docscrawl_shared::CrawlerConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn extract_links_resolves_and_strips() {
        let html = r##"<html><body>
            <a href="/page2">Page 2</a>
            <a href="https://external.com">External</a>
            <a href="#section">Anchor</a>
            <a href="relative/path#frag">Relative</a>
            <a href="mailto:team@example.com">Mail</a>
        </body></html>"##;
        let base = Url::parse("https://docs.example.com/guide/page1").unwrap();
        let links: Vec<String> = extract_links(html, &base)
            .into_iter()
            .map(|u| u.to_string())
            .collect();

        assert_eq!(
            links,
            vec![
                "https://docs.example.com/page2",
                "https://external.com/",
                "https://docs.example.com/guide/relative/path",
            ]
        );
    }

    async fn mount_page(server: &MockServer, at: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn discovery_is_breadth_first_and_depth_bounded() {
        let server = MockServer::start().await;

        mount_page(
            &server,
            "/help/",
            r#"<a href="/help/getting-started">Start</a>
               <a href="/help/articles/one#intro">One</a>
               <a href="/help/articles/one">One again</a>
               <a href="/login">Login</a>
               <a href="https://external.com/docs/x">Elsewhere</a>"#,
        )
        .await;
        mount_page(
            &server,
            "/help/getting-started",
            r#"<a href="/help/articles/two">Two</a><a href="/help/">Home</a>"#,
        )
        .await;
        mount_page(
            &server,
            "/help/articles/two",
            r#"<a href="/help/articles/three">Three</a>"#,
        )
        .await;

        let config = CrawlerConfig {
            max_retries: 1,
            retry_delay_secs: 0.0,
            ..CrawlerConfig::default()
        };
        let start = Url::parse(&format!("{}/help/", server.uri())).unwrap();
        let filter = RelevanceFilter::from_seeds(std::slice::from_ref(&start), &config).unwrap();
        let fetcher = Fetcher::new(&config).unwrap();

        let links = discover_html_links(&fetcher, &filter, &start, 2).await;
        let base = server.uri();
        assert_eq!(
            links,
            vec![
                format!("{base}/help/getting-started"),
                format!("{base}/help/articles/one"),
                format!("{base}/help/articles/two"),
            ]
        );

        let shallow = discover_html_links(&fetcher, &filter, &start, 1).await;
        assert_eq!(shallow.len(), 2);
    }
}
