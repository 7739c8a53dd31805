//! Relevance filtering: which discovered URLs belong to the crawl.

use regex::{Regex, RegexBuilder};
use url::Url;

use docscrawl_shared::url::{authority, base_path};
use docscrawl_shared::{CrawlerConfig, DocsCrawlError, Result};

/// Language path segments that mark a page as not English.
const NON_ENGLISH_SEGMENTS: &[&str] = &["/fr/", "/de/", "/es/", "/pt/", "/ja/", "/ko/", "/zh/"];

/// Substrings that rule a link out of HTML discovery.
const SKIP_PATTERNS: &[&str] = &[
    "/login", "/signup", "/register", "/auth", "/api/", "/admin/", "/account/", "/profile/",
    "mailto:", "tel:", "javascript:", ".pdf", ".doc", ".zip", ".img", ".png", ".jpg", ".gif",
    "#", "?search=", "/search",
];

/// Substrings that mark a link as documentation during HTML discovery.
const DOC_INDICATORS: &[&str] = &[
    "/article", "/articles", "/docs", "/help", "/guide", "/guides", "/documentation",
    "/tutorial", "/tutorials", "/kb", "/knowledge", "/support", "/faq", "/how-to",
    "/getting-started",
];

/// Decides whether a URL is part of the documentation set being crawled.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    authority: String,
    base_paths: Vec<String>,
    language: String,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl RelevanceFilter {
    /// Build a filter from the seed URLs.
    ///
    /// All seeds must share one authority. Each seed contributes a base path.
    pub fn from_seeds(seeds: &[Url], config: &CrawlerConfig) -> Result<Self> {
        let first = seeds
            .first()
            .ok_or_else(|| DocsCrawlError::validation("at least one seed URL is required"))?;
        let domain = authority(first);

        if let Some(other) = seeds.iter().find(|s| authority(s) != domain) {
            return Err(DocsCrawlError::validation(format!(
                "all seed URLs must share one domain: found {domain} and {}",
                authority(other)
            )));
        }

        let mut base_paths: Vec<String> = Vec::new();
        for seed in seeds {
            let path = base_path(seed);
            if !base_paths.contains(&path) {
                base_paths.push(path);
            }
        }

        Ok(Self {
            authority: domain,
            base_paths,
            language: config.language.to_ascii_lowercase(),
            include: compile_patterns(&config.include_patterns)?,
            exclude: compile_patterns(&config.exclude_patterns)?,
        })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn base_paths(&self) -> &[String] {
        &self.base_paths
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// True when `raw` is on the crawl domain, under a base path, passes the
    /// include/exclude patterns, and matches the configured language.
    pub fn is_relevant(&self, raw: &str) -> bool {
        let Ok(url) = Url::parse(raw) else {
            return false;
        };

        if authority(&url) != self.authority {
            return false;
        }

        let path = url.path();
        if !self.base_paths.iter().any(|base| path.starts_with(base.as_str())) {
            return false;
        }

        if self.exclude.iter().any(|re| re.is_match(raw)) {
            return false;
        }
        if !self.include.is_empty() && !self.include.iter().any(|re| re.is_match(raw)) {
            return false;
        }

        let hl = url
            .query_pairs()
            .find(|(key, _)| key == "hl")
            .map(|(_, value)| value.to_ascii_lowercase());

        self.language_matches(path, hl.as_deref())
    }

    fn language_matches(&self, path: &str, hl: Option<&str>) -> bool {
        let lang = self.language.as_str();
        let segment = format!("/{lang}/");
        let prefix = format!("/{lang}");

        if lang == "en" {
            return match hl {
                Some(code) => code == "en",
                None if path.contains(&segment) || path.starts_with(&prefix) => true,
                None => !NON_ENGLISH_SEGMENTS.iter().any(|s| path.contains(s)),
            };
        }

        hl == Some(lang) || path.contains(&segment) || path.starts_with(&prefix)
    }

    /// Heuristic used when following HTML links: does `link` look like a
    /// documentation page on the same site as `page`?
    pub fn is_documentation_link(&self, link: &Url, page: &Url) -> bool {
        if authority(link) != authority(page) {
            return false;
        }

        let lower = link.as_str().to_lowercase();
        if SKIP_PATTERNS.iter().any(|p| lower.contains(p)) {
            return false;
        }

        if DOC_INDICATORS.iter().any(|i| lower.contains(i)) {
            return true;
        }

        if link.as_str().contains("/en/") && (lower.contains("article") || lower.contains("collection"))
        {
            return true;
        }

        let path = link.path();
        let depth = path.trim_matches('/').split('/').count();
        depth >= 2 && self.base_paths.iter().any(|base| path.starts_with(base.as_str()))
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(|e| DocsCrawlError::config(format!("invalid URL pattern '{p}': {e}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_for(seeds: &[&str], language: &str) -> RelevanceFilter {
        let seeds: Vec<Url> = seeds.iter().map(|s| Url::parse(s).unwrap()).collect();
        let config = CrawlerConfig {
            language: language.into(),
            ..CrawlerConfig::default()
        };
        RelevanceFilter::from_seeds(&seeds, &config).unwrap()
    }

    #[test]
    fn seeds_must_share_domain() {
        let seeds = vec![
            Url::parse("https://docs.a.com/guide").unwrap(),
            Url::parse("https://docs.b.com/guide").unwrap(),
        ];
        let err = RelevanceFilter::from_seeds(&seeds, &CrawlerConfig::default()).unwrap_err();
        assert!(err.to_string().contains("docs.b.com"));

        assert!(RelevanceFilter::from_seeds(&[], &CrawlerConfig::default()).is_err());
    }

    #[test]
    fn base_paths_deduplicated() {
        let filter = filter_for(
            &[
                "https://cloud.example.com/run/docs",
                "https://cloud.example.com/run/overview",
                "https://cloud.example.com/sql/docs/",
            ],
            "en",
        );
        assert_eq!(filter.base_paths(), &["/run".to_string(), "/sql".to_string()]);
    }

    #[test]
    fn domain_and_prefix_required() {
        let filter = filter_for(&["https://cloud.example.com/run/docs"], "en");
        assert!(filter.is_relevant("https://cloud.example.com/run/docs/quickstart"));
        assert!(!filter.is_relevant("https://other.example.com/run/docs/quickstart"));
        assert!(!filter.is_relevant("https://cloud.example.com/storage/docs"));
        assert!(!filter.is_relevant("not a url"));
    }

    #[test]
    fn english_language_convention() {
        let filter = filter_for(&["https://x.com/"], "en");
        assert!(filter.is_relevant("https://x.com/guide"));
        assert!(filter.is_relevant("https://x.com/en/guide"));
        assert!(filter.is_relevant("https://x.com/guide?hl=en"));
        assert!(!filter.is_relevant("https://x.com/guide?hl=fr"));
        assert!(!filter.is_relevant("https://x.com/de/guide"));
        assert!(!filter.is_relevant("https://x.com/docs/ja/guide"));
    }

    #[test]
    fn other_language_convention() {
        let filter = filter_for(&["https://x.com/"], "fr");
        assert!(filter.is_relevant("https://x.com/fr/guide"));
        assert!(filter.is_relevant("https://x.com/help/fr/article"));
        assert!(filter.is_relevant("https://x.com/guide?hl=fr"));
        assert!(!filter.is_relevant("https://x.com/guide"));
        assert!(!filter.is_relevant("https://x.com/en/guide"));
    }

    #[test]
    fn include_and_exclude_patterns() {
        let seeds = vec![Url::parse("https://x.com/docs").unwrap()];
        let config = CrawlerConfig {
            include_patterns: vec!["/GUIDES/".into()],
            exclude_patterns: vec!["deprecated".into()],
            ..CrawlerConfig::default()
        };
        let filter = RelevanceFilter::from_seeds(&seeds, &config).unwrap();

        assert!(filter.is_relevant("https://x.com/guides/install"));
        assert!(!filter.is_relevant("https://x.com/guides/deprecated-api"));
        assert!(!filter.is_relevant("https://x.com/reference/install"));
    }

    #[test]
    fn documentation_link_heuristics() {
        let filter = filter_for(&["https://www.x.com/en/"], "en");
        let page = Url::parse("https://www.x.com/en/").unwrap();
        let check = |s: &str| filter.is_documentation_link(&Url::parse(s).unwrap(), &page);

        assert!(check("https://www.x.com/docs/setup"));
        assert!(check("https://www.x.com/en/collections/123-billing"));
        assert!(check("https://www.x.com/en/billing/invoices"));
        assert!(!check("https://www.x.com/login"));
        assert!(!check("https://www.x.com/docs/manual.pdf"));
        assert!(!check("https://www.x.com/search?q=x"));
        assert!(!check("https://other.com/docs/setup"));
        assert!(!check("https://www.x.com/pricing"));
    }
}
