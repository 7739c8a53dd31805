//! Consolidated documentation output: one file, one file per chapter, or one
//! file per page with an index.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Local;
use regex::Regex;
use tracing::{info, instrument};
use url::Url;

use docscrawl_shared::url::authority;
use docscrawl_shared::{DocsCrawlError, OutputFormat, PageContent, Result};

use crate::layout::{sanitize_filename, write_atomic};

static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("non-word regex"));

static SEPARATOR_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-\s]+").expect("separator run regex"));

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
               line-height: 1.6; max-width: 800px; margin: 0 auto; padding: 20px; }
        .source { color: #666; font-style: italic; margin-bottom: 20px; }
        pre { background: #f4f4f4; padding: 15px; border-radius: 5px; overflow-x: auto; }
        code { background: #f4f4f4; padding: 2px 4px; border-radius: 3px; }
    </style>
</head>
<body>
    <h1>{title}</h1>
    <div class="source">Source: <a href="{url}">{url}</a></div>
    <hr>
    <div class="content">
        {content}
    </div>
</body>
</html>"#;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How pages are split across output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Organization {
    /// Everything in one file with a table of contents.
    #[default]
    Single,
    /// An index plus one file per chapter (grouped by URL section).
    Chapters,
    /// An index plus one file per page, mirroring the URL path.
    Pages,
}

impl std::str::FromStr for Organization {
    type Err = DocsCrawlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "chapters" => Ok(Self::Chapters),
            "pages" => Ok(Self::Pages),
            other => Err(DocsCrawlError::validation(format!(
                "unknown organization '{other}' (expected single, chapters or pages)"
            ))),
        }
    }
}

/// One page as it appears in a consolidated document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPage {
    pub url: String,
    pub title: String,
    /// Page body already rendered in the document's format.
    pub content: String,
}

impl DocumentPage {
    /// Take the `format` rendition of a scraped page, if it was produced.
    pub fn from_content(page: &PageContent, format: OutputFormat) -> Option<Self> {
        page.body(format).map(|body| Self {
            url: page.url.clone(),
            title: page.title.clone(),
            content: body.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Renders and writes consolidated documents in one output format.
#[derive(Debug, Clone)]
pub struct DocumentRenderer {
    format: OutputFormat,
    generated_at: String,
}

impl DocumentRenderer {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Override the generation timestamp printed in headers and footers.
    pub fn with_generated_at(mut self, generated_at: impl Into<String>) -> Self {
        self.generated_at = generated_at.into();
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Extension for index and chapter files, without the dot.
    fn ext(&self) -> &'static str {
        self.format.extension().trim_start_matches('.')
    }

    /// Render one page with its title and source line.
    pub fn format_page(&self, page: &DocumentPage) -> String {
        match self.format {
            OutputFormat::Markdown => {
                let mut lines = Vec::new();
                if !page.title.is_empty() {
                    lines.push(format!("# {}", page.title));
                    lines.push(String::new());
                }
                lines.push(format!("*Source: {}*", page.url));
                lines.push(String::new());
                lines.push("---".into());
                lines.push(String::new());
                lines.push(non_empty_or(&page.content, "*No content extracted*"));
                lines.join("\n")
            }
            OutputFormat::Html => {
                let title = if page.title.is_empty() {
                    "Documentation Page".to_string()
                } else {
                    escape_html(&page.title)
                };
                HTML_TEMPLATE
                    .replace("{title}", &title)
                    .replace("{url}", &escape_html(&page.url))
                    .replace(
                        "{content}",
                        &non_empty_or(&page.content, "<p><em>No content extracted</em></p>"),
                    )
            }
            OutputFormat::Text => {
                let mut lines = Vec::new();
                if !page.title.is_empty() {
                    lines.push(page.title.clone());
                    lines.push("=".repeat(page.title.chars().count()));
                    lines.push(String::new());
                }
                lines.push(format!("Source: {}", page.url));
                lines.push("-".repeat(50));
                lines.push(String::new());
                lines.push(non_empty_or(&page.content, "No content extracted"));
                lines.join("\n")
            }
        }
    }

    fn header(&self, pages: &[&DocumentPage]) -> String {
        let Some(first) = pages.first() else {
            return "# Documentation".to_string();
        };
        let domain = Url::parse(&first.url)
            .map(|u| authority(&u))
            .unwrap_or_default();

        [
            format!("# Documentation: {domain}"),
            String::new(),
            format!("**Scraped from:** {}", first.url),
            format!("**Generated on:** {}", self.generated_at),
            format!("**Total pages:** {}", pages.len()),
            format!("**Format:** {}", self.format),
        ]
        .join("\n")
    }

    /// Single-file document: header, table of contents, pages, footer.
    pub fn render_single(&self, pages: &[DocumentPage]) -> String {
        let refs: Vec<&DocumentPage> = pages.iter().collect();
        self.render_single_refs(&refs)
    }

    fn render_single_refs(&self, pages: &[&DocumentPage]) -> String {
        let mut out = vec![self.header(pages), String::new()];

        if pages.len() > 1 {
            out.push("## Table of Contents".into());
            out.push(String::new());
            out.push(table_of_contents(pages));
            out.push(String::new());
            out.push("---".into());
            out.push(String::new());
        }

        for (i, page) in pages.iter().enumerate() {
            if i > 0 {
                out.push("\n---\n".into());
            }
            out.push(self.format_page(page));
        }

        out.push(String::new());
        out.push("---".into());
        out.push(format!("*Generated on {}*", self.generated_at));
        out.push(format!("*Total pages: {}*", pages.len()));
        out.join("\n")
    }

    /// Index listing the chapter files.
    pub fn render_chapter_index(&self, pages: &[DocumentPage]) -> String {
        let refs: Vec<&DocumentPage> = pages.iter().collect();
        let chapters = group_chapters(pages);

        let mut out = vec![self.header(&refs), String::new(), "## Chapters".into(), String::new()];
        for (name, _) in &chapters {
            out.push(format!("- [{name}]({})", self.chapter_file_name(name)));
        }
        out.push(String::new());
        out.push(format!("*Total chapters: {}*", chapters.len()));
        out.push(format!("*Total pages: {}*", pages.len()));
        out.join("\n")
    }

    /// Index with a nested listing of the per-page files.
    pub fn render_pages_index(&self, pages: &[DocumentPage]) -> String {
        let refs: Vec<&DocumentPage> = pages.iter().collect();
        let tree = build_tree(pages);

        let mut out = vec![
            self.header(&refs),
            String::new(),
            "## Documentation Structure".into(),
            String::new(),
        ];
        let mut listing = Vec::new();
        self.list_tree(&tree, &[], &mut listing);
        out.push(listing.join("\n"));
        out.push(String::new());
        out.push(format!("*Total pages: {}*", pages.len()));
        out.join("\n")
    }

    fn chapter_file_name(&self, chapter: &str) -> String {
        format!("chapter-{}.{}", sanitize_filename(chapter), self.ext())
    }

    fn list_tree(&self, nodes: &[TreeNode], parents: &[String], out: &mut Vec<String>) {
        let indent = "  ".repeat(parents.len());
        for node in nodes {
            match node {
                TreeNode::File { name, title } => {
                    let mut link = parents.to_vec();
                    link.push(format!("{}.{}", sanitize_filename(name), self.ext()));
                    out.push(format!("{indent}- [{title}]({})", link.join("/")));
                }
                TreeNode::Dir { name, children } => {
                    out.push(format!("{indent}- **{}/**", title_case(&name.replace('-', " "))));
                    let mut nested = parents.to_vec();
                    nested.push(name.clone());
                    self.list_tree(children, &nested, out);
                }
            }
        }
    }

    /// Write the document in the given organisation.
    ///
    /// `Single` writes `output` as one file. `Chapters` and `Pages` treat
    /// `output` as a directory and write `index.<ext>` plus their files into
    /// it. Returns every path written.
    #[instrument(skip_all, fields(output = %output.display(), pages = pages.len(), ?organization))]
    pub fn write(
        &self,
        organization: Organization,
        output: &Path,
        pages: &[DocumentPage],
    ) -> Result<Vec<PathBuf>> {
        if pages.is_empty() {
            return Err(DocsCrawlError::validation("no pages to write"));
        }

        let mut written = Vec::new();
        match organization {
            Organization::Single => {
                write_atomic(output, &self.render_single(pages))?;
                written.push(output.to_path_buf());
            }
            Organization::Chapters => {
                let index = output.join(format!("index.{}", self.ext()));
                write_atomic(&index, &self.render_chapter_index(pages))?;
                written.push(index);

                for (name, chapter_pages) in group_chapters(pages) {
                    let path = output.join(self.chapter_file_name(&name));
                    write_atomic(&path, &self.render_single_refs(&chapter_pages))?;
                    written.push(path);
                }
            }
            Organization::Pages => {
                let index = output.join(format!("index.{}", self.ext()));
                write_atomic(&index, &self.render_pages_index(pages))?;
                written.push(index);

                for (i, page) in pages.iter().enumerate() {
                    let path = output.join(self.page_relative_path(page, i));
                    write_atomic(&path, &self.format_page(page))?;
                    written.push(path);
                }
            }
        }

        info!(files = written.len(), "document written");
        Ok(written)
    }

    /// Path under the output directory; must agree with `build_tree`.
    fn page_relative_path(&self, page: &DocumentPage, position: usize) -> PathBuf {
        let parts = path_parts(&page.url);
        match parts.split_last() {
            Some((last, parents)) => {
                let mut path: PathBuf = parents.iter().collect();
                path.push(format!("{}.{}", sanitize_filename(last), self.ext()));
                path
            }
            None => PathBuf::from(format!("page-{}.{}", position + 1, self.ext())),
        }
    }
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Group pages into chapters by their second path segment (else the first,
/// else `Introduction`), in order of first appearance.
pub fn group_chapters(pages: &[DocumentPage]) -> Vec<(String, Vec<&DocumentPage>)> {
    let mut chapters: Vec<(String, Vec<&DocumentPage>)> = Vec::new();
    for page in pages {
        let parts = path_parts(&page.url);
        let name = parts
            .get(1)
            .or_else(|| parts.first())
            .map(|segment| title_case(&segment.replace(['-', '_'], " ")))
            .unwrap_or_else(|| "Introduction".to_string());

        match chapters.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, members)) => members.push(page),
            None => chapters.push((name, vec![page])),
        }
    }
    chapters
}

#[derive(Debug)]
enum TreeNode {
    File { name: String, title: String },
    Dir { name: String, children: Vec<TreeNode> },
}

/// File tree mirroring [`DocumentRenderer::write`]'s `Pages` layout; pages
/// without path segments are top-level `page-<n>` files.
fn build_tree(pages: &[DocumentPage]) -> Vec<TreeNode> {
    let mut root = Vec::new();
    for (i, page) in pages.iter().enumerate() {
        let parts = path_parts(&page.url);
        match parts.split_last() {
            Some((file, dirs)) => insert_node(&mut root, dirs, file, &page.title),
            None => insert_node(&mut root, &[], &format!("page-{}", i + 1), &page.title),
        }
    }
    root
}

fn insert_node(level: &mut Vec<TreeNode>, dirs: &[String], file: &str, title: &str) {
    let Some((dir, rest)) = dirs.split_first() else {
        let exists = level
            .iter()
            .any(|n| matches!(n, TreeNode::File { name, .. } if name == file));
        if !exists {
            let title = if title.is_empty() {
                title_case(&file.replace('-', " "))
            } else {
                title.to_string()
            };
            level.push(TreeNode::File {
                name: file.to_string(),
                title,
            });
        }
        return;
    };

    let pos = match level
        .iter()
        .position(|n| matches!(n, TreeNode::Dir { name, .. } if name == dir))
    {
        Some(pos) => pos,
        None => {
            level.push(TreeNode::Dir {
                name: dir.clone(),
                children: Vec::new(),
            });
            level.len() - 1
        }
    };
    if let TreeNode::Dir { children, .. } = &mut level[pos] {
        insert_node(children, rest, file, title);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Numbered table of contents linking each page title to its anchor.
fn table_of_contents(pages: &[&DocumentPage]) -> String {
    pages
        .iter()
        .enumerate()
        .map(|(i, page)| {
            let title = if page.title.is_empty() {
                format!("Page {}", i + 1)
            } else {
                page.title.clone()
            };
            format!("{}. [{title}](#{})", i + 1, anchor(&title))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// In-document anchor for a heading.
pub fn anchor(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = NON_WORD_RE.replace_all(&lowered, "");
    SEPARATOR_RUN_RE
        .replace_all(&stripped, "-")
        .trim_matches('-')
        .to_string()
}

fn path_parts(url: &str) -> Vec<String> {
    Url::parse(url)
        .map(|u| {
            u.path()
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Uppercase every letter that follows a non-letter, lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut after_letter = false;
    for c in s.chars() {
        if after_letter {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        after_letter = c.is_alphabetic();
    }
    out
}

fn non_empty_or(content: &str, fallback: &str) -> String {
    if content.trim().is_empty() {
        fallback.to_string()
    } else {
        content.to_string()
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, title: &str, content: &str) -> DocumentPage {
        DocumentPage {
            url: url.into(),
            title: title.into(),
            content: content.into(),
        }
    }

    fn renderer(format: OutputFormat) -> DocumentRenderer {
        DocumentRenderer::new(format).with_generated_at("2026-01-02 03:04:05")
    }

    fn sample() -> Vec<DocumentPage> {
        vec![
            page("https://docs.x.com/run/getting-started/install", "Install Guide", "Run the installer."),
            page("https://docs.x.com/run/getting-started/configure", "Configure", "Edit the file."),
            page("https://docs.x.com/run/api_reference/client", "Client API", "Call it."),
        ]
    }

    #[test]
    fn anchors() {
        assert_eq!(anchor("Install Guide"), "install-guide");
        assert_eq!(anchor("What's new? (2024)"), "whats-new-2024");
        assert_eq!(anchor("  -- Spaced   out --  "), "spaced-out");
    }

    #[test]
    fn single_document_layout() {
        let doc = renderer(OutputFormat::Markdown).render_single(&sample());

        assert!(doc.starts_with("# Documentation: docs.x.com\n"));
        assert!(doc.contains("**Scraped from:** https://docs.x.com/run/getting-started/install"));
        assert!(doc.contains("**Generated on:** 2026-01-02 03:04:05"));
        assert!(doc.contains("**Total pages:** 3"));
        assert!(doc.contains("**Format:** markdown"));
        assert!(doc.contains("## Table of Contents\n\n1. [Install Guide](#install-guide)\n2. [Configure](#configure)\n3. [Client API](#client-api)"));
        assert!(doc.contains("# Client API\n\n*Source: https://docs.x.com/run/api_reference/client*\n\n---\n\nCall it."));
        assert!(doc.ends_with("---\n*Generated on 2026-01-02 03:04:05*\n*Total pages: 3*"));
    }

    #[test]
    fn single_page_has_no_toc() {
        let doc = renderer(OutputFormat::Markdown).render_single(&sample()[..1]);
        assert!(!doc.contains("Table of Contents"));
    }

    #[test]
    fn text_and_html_page_formats() {
        let p = page("https://docs.x.com/a", "Intro", "");
        let text = renderer(OutputFormat::Text).format_page(&p);
        assert_eq!(
            text,
            format!("Intro\n=====\n\nSource: https://docs.x.com/a\n{}\n\nNo content extracted", "-".repeat(50))
        );

        let html = renderer(OutputFormat::Html).format_page(&page("https://docs.x.com/a", "A & B", "<p>x</p>"));
        assert!(html.contains("<title>A &amp; B</title>"));
        assert!(html.contains(r#"<a href="https://docs.x.com/a">https://docs.x.com/a</a>"#));
        assert!(html.contains("<p>x</p>"));
    }

    #[test]
    fn chapters_group_by_second_segment() {
        let pages = sample();
        let chapters = group_chapters(&pages);
        let names: Vec<&str> = chapters.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Getting Started", "Api Reference"]);
        assert_eq!(chapters[0].1.len(), 2);

        let root_pages = vec![page("https://docs.x.com/", "Home", "hi"), page("https://docs.x.com/faq", "FAQ", "q")];
        let names: Vec<String> = group_chapters(&root_pages).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["Introduction", "Faq"]);
    }

    #[test]
    fn pages_index_lists_nested_files() {
        let index = renderer(OutputFormat::Markdown).render_pages_index(&sample());
        let expected = "- **Run/**\n  - **Getting Started/**\n    - [Install Guide](run/getting-started/install.md)\n    - [Configure](run/getting-started/configure.md)\n  - **Api_Reference/**\n    - [Client API](run/api_reference/client.md)";
        assert!(index.contains(expected), "{index}");
    }

    #[test]
    fn pages_index_includes_root_page() {
        let pages = vec![
            page("https://docs.x.com/", "Home", "Welcome."),
            page("https://docs.x.com/guide/start", "Start", "Begin here."),
        ];
        let r = renderer(OutputFormat::Markdown);
        let index = r.render_pages_index(&pages);
        assert!(index.contains("- [Home](page-1.md)\n- **Guide/**\n  - [Start](guide/start.md)"), "{index}");

        let dir = std::env::temp_dir().join(format!("docscrawl-root-page-{}", uuid::Uuid::now_v7()));
        r.write(Organization::Pages, &dir, &pages).unwrap();
        assert!(std::fs::read_to_string(dir.join("page-1.md")).unwrap().contains("Welcome."));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn organization_parsing() {
        assert_eq!("Chapters".parse::<Organization>().unwrap(), Organization::Chapters);
        assert!("books".parse::<Organization>().is_err());
    }

    #[test]
    fn write_chapters_and_pages() {
        let dir = std::env::temp_dir().join(format!("docscrawl-document-{}", uuid::Uuid::now_v7()));
        let r = renderer(OutputFormat::Markdown);

        let chapters_dir = dir.join("chapters");
        let written = r.write(Organization::Chapters, &chapters_dir, &sample()).unwrap();
        assert_eq!(written.len(), 3);
        let index = std::fs::read_to_string(chapters_dir.join("index.md")).unwrap();
        assert!(index.contains("- [Getting Started](chapter-Getting Started.md)"));
        let chapter = std::fs::read_to_string(chapters_dir.join("chapter-Getting Started.md")).unwrap();
        assert!(chapter.contains("**Total pages:** 2"));

        let pages_dir = dir.join("pages");
        r.write(Organization::Pages, &pages_dir, &sample()).unwrap();
        assert!(pages_dir.join("run/getting-started/install.md").exists());
        assert!(pages_dir.join("run/api_reference/client.md").exists());

        let single = dir.join("all.md");
        r.write(Organization::Single, &single, &sample()).unwrap();
        assert!(std::fs::read_to_string(&single).unwrap().contains("# Configure"));

        assert!(r.write(Organization::Single, &single, &[]).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
