//! HTML extraction and conversion for crawled documentation pages.
//!
//! A fetched page can be rendered three ways:
//! - Markdown via [`convert`] (`htmd` plus the cleanup passes in `cleanup`)
//! - plain text via [`extract_text`]
//! - the main content element's HTML via [`extract_main_html`]

mod cleanup;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use docscrawl_shared::{DocsCrawlError, Result};

/// Tags dropped entirely during Markdown conversion.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "button", "picture", "iframe", "noscript",
    "svg", "form",
];

/// Content containers tried in order before falling back to `<body>`.
const CONTENT_SELECTORS: &[&str] = &[
    "article .markdown",
    ".vp-doc",
    ".markdown-section",
    "[role=\"main\"]",
    "main",
    "article",
    ".content",
    ".main-content",
];

/// Selectors for [`extract_main_html`], in priority order.
const MAIN_HTML_SELECTORS: &[&str] = &["main", "article", "div.content", "div.main-content"];

static TITLE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\|\s*Google Cloud$").expect("title suffix regex"));

static TABLE_SEL: LazyLock<Selector> = LazyLock::new(|| sel("table"));
static TR_SEL: LazyLock<Selector> = LazyLock::new(|| sel("tr"));
static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| sel("th, td"));
static TH_SEL: LazyLock<Selector> = LazyLock::new(|| sel("th"));
static BODY_SEL: LazyLock<Selector> = LazyLock::new(|| sel("body"));
static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| sel("title"));
static H1_SEL: LazyLock<Selector> = LazyLock::new(|| sel("h1"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Result of converting an HTML page to Markdown.
#[derive(Debug, Clone)]
pub struct ConvertResult {
    /// Cleaned Markdown body.
    pub markdown: String,
    /// Title override, else first H1, else `Untitled`.
    pub title: String,
    /// Approximate word count, code blocks excluded.
    pub word_count: usize,
}

/// Options for the HTML-to-Markdown conversion.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Page URL, used to resolve relative links.
    pub source_url: String,
    /// Override title (if `None`, taken from the first H1).
    pub title: Option<String>,
    /// Site-specific content containers, tried first.
    pub selectors: ContentSelectors,
}

impl ConvertOptions {
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            source_url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_selectors(mut self, selectors: ContentSelectors) -> Self {
        self.selectors = selectors;
        self
    }
}

/// User-supplied CSS selectors for a site's main content, in priority order.
///
/// They are tried before the built-in containers by every rendition.
#[derive(Debug, Clone, Default)]
pub struct ContentSelectors(Vec<Selector>);

impl ContentSelectors {
    /// Compile `selectors`; an invalid one is a config error.
    pub fn parse(selectors: &[String]) -> Result<Self> {
        selectors
            .iter()
            .map(|css| {
                Selector::parse(css).map_err(|e| {
                    DocsCrawlError::config(format!("invalid content selector '{css}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn first_match<'a>(&self, doc: &'a Html) -> Option<ElementRef<'a>> {
        self.0.iter().find_map(|selector| doc.select(selector).next())
    }
}

// ---------------------------------------------------------------------------
// Markdown
// ---------------------------------------------------------------------------

/// Convert a full HTML page to clean Markdown.
///
/// The main content container is located first, tables are pre-rendered
/// (`htmd` 0.1 has no table support), chrome tags are skipped, and the
/// cleanup passes run over the result.
#[instrument(skip(html), fields(url = %opts.source_url))]
pub fn convert(html: &str, opts: &ConvertOptions) -> Result<ConvertResult> {
    let content_html = content_container_html(html, &opts.selectors);
    let content_html = preprocess_tables(&content_html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();

    let raw_markdown = converter
        .convert(&content_html)
        .map_err(|e| DocsCrawlError::Conversion(format!("htmd conversion failed: {e}")))?;

    let base_url = Url::parse(&opts.source_url).ok();
    let markdown = cleanup::run_pipeline(&raw_markdown, base_url.as_ref());

    let title = opts
        .title
        .clone()
        .or_else(|| first_h1(&markdown))
        .unwrap_or_else(|| "Untitled".to_string());
    let word_count = count_words(&markdown);

    debug!(title = %title, word_count, len = markdown.len(), "converted to markdown");

    Ok(ConvertResult {
        markdown,
        title,
        word_count,
    })
}

fn content_container_html(html: &str, custom: &ContentSelectors) -> String {
    let doc = Html::parse_document(html);

    if let Some(el) = custom.first_match(&doc) {
        return el.inner_html();
    }

    for css in CONTENT_SELECTORS {
        if let Ok(selector) = Selector::parse(css) {
            if let Some(el) = doc.select(&selector).next() {
                return el.inner_html();
            }
        }
    }

    doc.select(&BODY_SEL)
        .next()
        .map(|body| body.inner_html())
        .unwrap_or_else(|| html.to_string())
}

/// Replace each `<table>` with a Markdown table before conversion.
fn preprocess_tables(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    if doc.select(&TABLE_SEL).next().is_none() {
        return html.to_string();
    }

    // Match against the parser's own serialization so implied tags line up.
    let mut result = doc.root_element().inner_html();

    for table in doc.select(&TABLE_SEL) {
        // Nested tables are rendered as part of their outermost table.
        if table
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| a.value().name() == "table")
        {
            continue;
        }
        result = result.replacen(&table.html(), &table_to_markdown(&table), 1);
    }

    result
}

fn table_to_markdown(table: &ElementRef<'_>) -> String {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut header_row = false;

    for (i, tr) in table.select(&TR_SEL).enumerate() {
        let cells: Vec<String> = tr
            .select(&CELL_SEL)
            .map(|cell| {
                cell.text()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .replace('|', "\\|")
            })
            .collect();
        if cells.is_empty() {
            continue;
        }
        if i == 0 && tr.select(&TH_SEL).next().is_some() {
            header_row = true;
        }
        rows.push(cells);
    }

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }
    for row in &mut rows {
        row.resize(width, String::new());
    }

    let blank_header = vec![String::new(); width];
    let (header, body) = if header_row {
        (&rows[0], &rows[1..])
    } else {
        (&blank_header, &rows[..])
    };

    let mut md = String::from("\n\n");
    md.push_str(&table_row(header));
    md.push_str(&table_row(&vec!["---".to_string(); width]));
    for row in body {
        md.push_str(&table_row(row));
    }
    md.push('\n');
    md
}

fn table_row(cells: &[String]) -> String {
    format!("| {} |\n", cells.join(" | "))
}

fn first_h1(md: &str) -> Option<String> {
    static H1_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^# (.+)$").expect("valid regex"));

    H1_RE.captures(md).map(|c| c[1].trim().to_string())
}

fn count_words(md: &str) -> usize {
    static CODE_BLOCK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));

    CODE_BLOCK_RE
        .replace_all(md, "")
        .split_whitespace()
        .filter(|w| !w.chars().all(|c| c == '#' || c == '-' || c == '|'))
        .count()
}

// ---------------------------------------------------------------------------
// HTML and text renditions
// ---------------------------------------------------------------------------

/// Outer HTML of the page's main content element.
///
/// Tries the custom selectors, then `main`, `article`, `div.content`,
/// `div.main-content`; falls back to the whole input.
pub fn extract_main_html(html: &str, custom: &ContentSelectors) -> String {
    let doc = Html::parse_document(html);
    main_element(&doc, custom)
        .map(|el| el.html())
        .unwrap_or_else(|| html.to_string())
}

/// Readable text of the main content (or body), whitespace-collapsed.
///
/// Text inside `script`, `style`, `noscript` and `template` is ignored.
pub fn extract_text(html: &str, custom: &ContentSelectors) -> String {
    let doc = Html::parse_document(html);
    let root = main_element(&doc, custom)
        .or_else(|| doc.select(&BODY_SEL).next())
        .unwrap_or_else(|| doc.root_element());

    let mut words: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().filter_map(ElementRef::wrap).any(|a| {
            matches!(a.value().name(), "script" | "style" | "noscript" | "template")
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }
    words.join(" ")
}

fn main_element<'a>(doc: &'a Html, custom: &ContentSelectors) -> Option<ElementRef<'a>> {
    custom.first_match(doc).or_else(|| {
        MAIN_HTML_SELECTORS
            .iter()
            .filter_map(|css| Selector::parse(css).ok())
            .find_map(|selector| doc.select(&selector).next())
    })
}

// ---------------------------------------------------------------------------
// Titles
// ---------------------------------------------------------------------------

/// Raw page title: `<title>`, else the first `<h1>`.
pub fn page_title(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    [&*TITLE_SEL, &*H1_SEL].into_iter().find_map(|selector| {
        doc.select(selector)
            .next()
            .map(|el| el.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|t| !t.is_empty())
    })
}

/// Display title for a page: drops a trailing `| Google Cloud` and falls
/// back to the URL when nothing is left.
pub fn clean_title(title: Option<&str>, url: &str) -> String {
    let cleaned = title
        .map(|t| TITLE_SUFFIX_RE.replace(t.trim(), "").trim().to_string())
        .unwrap_or_default();
    if cleaned.is_empty() {
        url.to_string()
    } else {
        cleaned
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
