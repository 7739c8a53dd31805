//! Pipelines: seeds → discovery → scrape → disk, archive, document or Google Doc.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, instrument};
use url::Url;

use docscrawl_artifacts::{DocumentPage, DocumentRenderer, write_archive};
use docscrawl_crawler::{DocCrawler, WriteOptions};
use docscrawl_gdocs::DocsClient;
use docscrawl_shared::{
    ArchiveMetadata, CrawlerConfig, DocsCrawlError, OutputConfig, OutputFormat, PageContent,
    PageFailure, Result, SessionId,
};
use docscrawl_storage::StateStore;

pub use docscrawl_artifacts::Organization;
pub use docscrawl_crawler::{CrawlStats, ProcessSummary, ProgressReporter, SilentProgress};
pub use docscrawl_gdocs::AccessToken;
pub use docscrawl_storage::save_url_list;

// ---------------------------------------------------------------------------
// Job and results
// ---------------------------------------------------------------------------

/// What to crawl and how.
#[derive(Debug, Clone)]
pub struct CrawlJob {
    /// Seed URLs; all must share one domain.
    pub seeds: Vec<Url>,
    pub config: CrawlerConfig,
    /// Skip sitemap discovery and process exactly the seeds.
    pub use_seeds_only: bool,
}

/// Outcome of the discovery phase.
pub struct Discovery {
    pub crawler: DocCrawler,
    /// Relevant pages, `url → title`.
    pub pages: BTreeMap<String, String>,
    pub stats: CrawlStats,
}

impl Discovery {
    pub fn urls(&self) -> Vec<String> {
        self.pages.keys().cloned().collect()
    }
}

/// Result of [`export_to_disk`].
#[derive(Debug)]
pub struct DiskExport {
    pub discovered: usize,
    pub summary: ProcessSummary,
    pub url_list: Option<PathBuf>,
    pub state_file: PathBuf,
    pub elapsed: Duration,
}

/// Result of [`export_to_archive`].
#[derive(Debug)]
pub struct ArchiveExport {
    pub path: PathBuf,
    pub session_id: SessionId,
    pub pages: usize,
    pub failures: Vec<PageFailure>,
    pub elapsed: Duration,
}

/// Consolidated document settings.
#[derive(Debug, Clone)]
pub struct DocumentRequest {
    pub organization: Organization,
    pub format: OutputFormat,
    /// File for `Single`, directory for `Chapters` and `Pages`.
    pub output: PathBuf,
}

/// Result of [`export_to_document`].
#[derive(Debug)]
pub struct DocumentExport {
    pub files: Vec<PathBuf>,
    pub pages: usize,
    pub failures: Vec<PageFailure>,
    /// The whole crawl as one Markdown document, ready to publish.
    pub markdown: String,
    pub elapsed: Duration,
}

/// Where a Google Doc publication goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocTarget {
    Create { title: String },
    Update { document_id: String, append: bool },
}

/// A created or updated Google Doc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedDoc {
    pub document_id: String,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

/// Find the relevant pages for a job.
///
/// With `use_seeds_only` the seeds themselves are the page set (titled by
/// URL). `max_pages` keeps the first pages in URL order. Finding nothing is
/// an error.
#[instrument(skip_all, fields(seeds = job.seeds.len(), use_seeds_only = job.use_seeds_only))]
pub async fn discover(job: &CrawlJob, progress: &dyn ProgressReporter) -> Result<Discovery> {
    let crawler = DocCrawler::new(job.config.clone(), job.seeds.clone())?;

    let mut pages: BTreeMap<String, String> = if job.use_seeds_only {
        progress.phase("Using seed URLs");
        job.seeds
            .iter()
            .map(|seed| (seed.to_string(), seed.to_string()))
            .collect()
    } else {
        progress.phase("Discovering pages");
        crawler.parse_sitemap(progress).await?;
        crawler.discovered().await
    };

    if pages.is_empty() {
        return Err(DocsCrawlError::validation(format!(
            "no relevant pages found for {}",
            crawler.filter().authority()
        )));
    }

    if let Some(max) = job.config.max_pages {
        if pages.len() > max {
            info!(found = pages.len(), max, "capping page set");
            pages = pages.into_iter().take(max).collect();
        }
    }

    let stats = crawler.stats();
    info!(pages = pages.len(), errors = stats.errors, "discovery complete");
    Ok(Discovery {
        crawler,
        pages,
        stats,
    })
}

/// Discover pages and write them to `output.dir` with change detection.
///
/// With `save_urls` the selected URL list is stored under `output.urls_dir`.
#[instrument(skip_all, fields(output = %output.dir.display()))]
pub async fn export_to_disk(
    job: &CrawlJob,
    output: &OutputConfig,
    save_urls: bool,
    progress: &dyn ProgressReporter,
) -> Result<DiskExport> {
    let start = Instant::now();
    let discovery = discover(job, progress).await?;
    let urls = discovery.urls();

    let url_list = if save_urls {
        Some(save_url_list(&output.urls_dir, &urls).await?)
    } else {
        None
    };

    progress.phase("Downloading pages");
    let state = Arc::new(StateStore::open(&output.state_file).await?);
    let opts = WriteOptions {
        output_dir: output.dir.clone(),
        formats: output.formats.clone(),
        flatten: output.flatten,
    };
    let summary = discovery
        .crawler
        .process_selected_pages(&urls, &opts, state, progress)
        .await?;

    Ok(DiskExport {
        discovered: urls.len(),
        summary,
        url_list,
        state_file: output.state_file.clone(),
        elapsed: start.elapsed(),
    })
}

/// Discover, scrape `formats` in memory and bundle everything into a ZIP.
#[instrument(skip_all, fields(path = %path.display(), formats = ?formats))]
pub async fn export_to_archive(
    job: &CrawlJob,
    formats: &[OutputFormat],
    path: &Path,
    progress: &dyn ProgressReporter,
) -> Result<ArchiveExport> {
    let start = Instant::now();
    let discovery = discover(job, progress).await?;

    progress.phase("Scraping pages");
    let (content, failures) = discovery
        .crawler
        .get_scraped_content(&discovery.urls(), formats, progress)
        .await;
    ensure_scraped(&content, &failures)?;

    progress.phase("Building archive");
    let session_id = SessionId::new();
    let metadata = ArchiveMetadata {
        session_id: session_id.clone(),
        total_pages: content.len(),
        crawled_at: Utc::now(),
        urls: content.keys().cloned().collect(),
        errors: failures.clone(),
    };
    write_archive(path, &content, &metadata)?;
    info!(%session_id, pages = content.len(), "archive written");

    Ok(ArchiveExport {
        path: path.to_path_buf(),
        session_id,
        pages: content.len(),
        failures,
        elapsed: start.elapsed(),
    })
}

/// Discover, scrape and write a consolidated document.
#[instrument(skip_all, fields(output = %request.output.display(), format = %request.format))]
pub async fn export_to_document(
    job: &CrawlJob,
    request: &DocumentRequest,
    progress: &dyn ProgressReporter,
) -> Result<DocumentExport> {
    let start = Instant::now();
    let discovery = discover(job, progress).await?;

    let mut formats = vec![OutputFormat::Markdown];
    if request.format != OutputFormat::Markdown {
        formats.push(request.format);
    }

    progress.phase("Scraping pages");
    let (content, failures) = discovery
        .crawler
        .get_scraped_content(&discovery.urls(), &formats, progress)
        .await;
    ensure_scraped(&content, &failures)?;

    progress.phase("Writing document");
    let pages = document_pages(&content, request.format);
    let files = DocumentRenderer::new(request.format).write(
        request.organization,
        &request.output,
        &pages,
    )?;
    let markdown = DocumentRenderer::new(OutputFormat::Markdown)
        .render_single(&document_pages(&content, OutputFormat::Markdown));

    Ok(DocumentExport {
        files,
        pages: pages.len(),
        failures,
        markdown,
        elapsed: start.elapsed(),
    })
}

/// Publish Markdown content to Google Docs with the given token.
pub async fn publish_google_doc(
    token: AccessToken,
    target: &DocTarget,
    content: &str,
) -> Result<PublishedDoc> {
    let client = DocsClient::new(token)?;
    publish_with_client(&client, target, content).await
}

/// Publish through an existing client.
#[instrument(skip_all, fields(target = ?target))]
pub async fn publish_with_client(
    client: &DocsClient,
    target: &DocTarget,
    content: &str,
) -> Result<PublishedDoc> {
    let document_id = match target {
        DocTarget::Create { title } => client.create_document(title, content).await?,
        DocTarget::Update {
            document_id,
            append,
        } => {
            client.update_document(document_id, content, *append).await?;
            document_id.clone()
        }
    };

    let url = DocsClient::document_url(&document_id);
    info!(%document_id, %url, "Google Doc published");
    Ok(PublishedDoc { document_id, url })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ensure_scraped(content: &BTreeMap<String, PageContent>, failures: &[PageFailure]) -> Result<()> {
    if content.is_empty() {
        return Err(DocsCrawlError::validation(format!(
            "none of the pages could be scraped ({} failed)",
            failures.len()
        )));
    }
    Ok(())
}

fn document_pages(content: &BTreeMap<String, PageContent>, format: OutputFormat) -> Vec<DocumentPage> {
    content
        .values()
        .filter_map(|page| DocumentPage::from_content(page, format))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("docscrawl-{tag}-{}", uuid::Uuid::now_v7()))
    }

    async fn docs_site() -> MockServer {
        let server = MockServer::start().await;
        for (route, title, body) in [
            ("/guide/getting-started/install", "Install", "Run the installer."),
            ("/guide/getting-started/configure", "Configure", "Edit config.toml."),
            ("/guide/reference/cli", "CLI Reference", "All flags."),
        ] {
            Mock::given(method("GET"))
                .and(path(route))
                .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                    "<html><head><title>{title}</title></head><body><main><h1>{title}</h1><p>{body}</p></main></body></html>"
                )))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/guide/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        server
    }

    fn job(server: &MockServer, routes: &[&str]) -> CrawlJob {
        CrawlJob {
            seeds: routes
                .iter()
                .map(|r| Url::parse(&format!("{}{r}", server.uri())).unwrap())
                .collect(),
            config: CrawlerConfig {
                max_workers: 3,
                max_retries: 1,
                retry_delay_secs: 0.0,
                ..Default::default()
            },
            use_seeds_only: true,
        }
    }

    const ROUTES: [&str; 4] = [
        "/guide/getting-started/install",
        "/guide/getting-started/configure",
        "/guide/reference/cli",
        "/guide/missing",
    ];

    #[tokio::test]
    async fn disk_export_writes_pages_state_and_url_list() {
        let server = docs_site().await;
        let dir = temp_dir("pipeline-disk");
        let output = OutputConfig {
            dir: dir.join("docs"),
            formats: vec![OutputFormat::Markdown, OutputFormat::Text],
            flatten: true,
            state_file: dir.join("crawler_state.json"),
            urls_dir: dir.join("selected_urls"),
        };

        let result = export_to_disk(&job(&server, &ROUTES), &output, true, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.discovered, 4);
        assert_eq!(result.summary.written, 3);
        assert_eq!(result.summary.failed, 1);
        assert!(dir.join("docs/guide_reference_cli.md").exists());
        assert!(dir.join("docs/guide_reference_cli.txt").exists());
        assert!(dir.join("crawler_state.json").exists());

        let list = std::fs::read_to_string(result.url_list.unwrap()).unwrap();
        assert_eq!(list.lines().count(), 4);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn archive_export_records_failures_in_metadata() {
        let server = docs_site().await;
        let dir = temp_dir("pipeline-archive");
        let path = dir.join("docs.zip");

        let result = export_to_archive(
            &job(&server, &ROUTES),
            &[OutputFormat::Markdown],
            &path,
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(result.pages, 3);
        assert_eq!(result.failures.len(), 1);

        let bytes = std::fs::read(&path).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 4);

        let mut meta = String::new();
        archive
            .by_name("metadata.json")
            .unwrap()
            .read_to_string(&mut meta)
            .unwrap();
        let meta: serde_json::Value = serde_json::from_str(&meta).unwrap();
        assert_eq!(meta["total_pages"], 3);
        assert_eq!(meta["session_id"], result.session_id.to_string());
        assert!(meta["errors"][0]["url"].as_str().unwrap().ends_with("/guide/missing"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn document_export_in_chapters() {
        let server = docs_site().await;
        let dir = temp_dir("pipeline-document");
        let request = DocumentRequest {
            organization: Organization::Chapters,
            format: OutputFormat::Text,
            output: dir.clone(),
        };

        let result = export_to_document(&job(&server, &ROUTES[..3]), &request, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.pages, 3);
        assert_eq!(result.files.len(), 3);
        assert!(dir.join("index.txt").exists());
        let chapter = std::fs::read_to_string(dir.join("chapter-Getting Started.txt")).unwrap();
        assert!(chapter.contains("Install\n=======\n"));
        assert!(result.markdown.starts_with("# Documentation: "));
        assert!(result.markdown.contains("## Table of Contents"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn max_pages_keeps_first_urls_in_order() {
        let server = docs_site().await;
        let mut job = job(&server, &ROUTES);
        job.config.max_pages = Some(2);

        let discovery = discover(&job, &SilentProgress).await.unwrap();
        let uri = server.uri();
        assert_eq!(
            discovery.urls(),
            vec![
                format!("{uri}/guide/getting-started/configure"),
                format!("{uri}/guide/getting-started/install"),
            ]
        );

        job.config.max_pages = Some(10);
        assert_eq!(discover(&job, &SilentProgress).await.unwrap().urls().len(), 4);
    }

    #[tokio::test]
    async fn nothing_scraped_is_an_error() {
        let server = docs_site().await;
        let err = export_to_archive(
            &job(&server, &["/guide/missing"]),
            &[OutputFormat::Markdown],
            &temp_dir("pipeline-empty").join("x.zip"),
            &SilentProgress,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DocsCrawlError::Validation { .. }));
    }

    #[tokio::test]
    async fn publish_updates_existing_doc() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents/abc:batchUpdate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = DocsClient::new(AccessToken::new("t"))
            .unwrap()
            .with_base_url(server.uri());
        let target = DocTarget::Update {
            document_id: "abc".into(),
            append: true,
        };
        let published = publish_with_client(&client, &target, "# Hi").await.unwrap();
        assert_eq!(published.document_id, "abc");
        assert_eq!(published.url, "https://docs.google.com/document/d/abc/edit");
    }
}
