//! Documentation crawler: sitemap discovery and concurrent page processing.
//!
//! [`DocCrawler`] finds the site's sitemap (or falls back to link following),
//! checks every entry against the relevance filter on a bounded worker pool,
//! and later fetches the pages the user selected, either writing them to disk
//! with change detection or returning them in memory.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, instrument, warn};
use url::Url;

use docscrawl_artifacts::write_page;
use docscrawl_discovery::{
    Fetcher, RelevanceFilter, RobotsRules, find_sitemap, is_xml_location, list_entries,
    parse_sitemap_locs,
};
use docscrawl_markdown::{
    ContentSelectors, ConvertOptions, clean_title, convert, extract_main_html, extract_text,
    page_title,
};
use docscrawl_shared::{
    CrawlerConfig, DocsCrawlError, OutputFormat, PageContent, PageFailure, Result,
};
use docscrawl_storage::{StateStore, content_hash};

use crate::pool::WorkerPool;
use crate::progress::ProgressReporter;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Snapshot of the discovery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    /// Page URLs checked against the relevance filter.
    pub processed: usize,
    /// Page URLs that passed the filter.
    pub relevant: usize,
    /// Relevant page URLs excluded by robots.txt.
    pub disallowed: usize,
    /// Entries, pages or chunks that failed.
    pub errors: usize,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicUsize,
    relevant: AtomicUsize,
    disallowed: AtomicUsize,
    errors: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> CrawlStats {
        CrawlStats {
            processed: self.processed.load(Ordering::Relaxed),
            relevant: self.relevant.load(Ordering::Relaxed),
            disallowed: self.disallowed.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Where and how selected pages are written to disk.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub output_dir: PathBuf,
    pub formats: Vec<OutputFormat>,
    pub flatten: bool,
}

/// Outcome of writing selected pages to disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub written: usize,
    pub unchanged: usize,
    pub failed: usize,
}

#[derive(Debug)]
enum PageOutcome {
    Written,
    Unchanged,
    Failed,
}

/// Everything a worker task needs, cheap to clone into each task.
#[derive(Clone)]
struct Worker {
    fetcher: Fetcher,
    filter: Arc<RelevanceFilter>,
    counters: Arc<Counters>,
    fetch_titles: bool,
    robots: Option<Arc<RobotsGate>>,
    selectors: Arc<ContentSelectors>,
}

/// robots.txt rules for the seed's site, fetched on first use.
struct RobotsGate {
    base: Url,
    user_agent: String,
    rules: OnceCell<RobotsRules>,
}

// ---------------------------------------------------------------------------
// DocCrawler
// ---------------------------------------------------------------------------

/// Crawls one documentation site rooted at a set of same-domain seeds.
pub struct DocCrawler {
    config: CrawlerConfig,
    seeds: Vec<Url>,
    worker: Worker,
    pool: WorkerPool,
    pages: Arc<Mutex<BTreeMap<String, String>>>,
}

impl DocCrawler {
    /// Validate the configuration and seeds and build the shared HTTP client.
    pub fn new(config: CrawlerConfig, seeds: Vec<Url>) -> Result<Self> {
        config.validate()?;
        let filter = RelevanceFilter::from_seeds(&seeds, &config)?;
        let fetcher = Fetcher::new(&config)?;
        let selectors = ContentSelectors::parse(&config.content_selectors)?;
        let robots = config.respect_robots_txt.then(|| {
            Arc::new(RobotsGate {
                base: seeds[0].clone(),
                user_agent: config.user_agent.clone(),
                rules: OnceCell::new(),
            })
        });

        info!(
            authority = filter.authority(),
            base_paths = ?filter.base_paths(),
            language = filter.language(),
            workers = config.max_workers,
            robots = config.respect_robots_txt,
            rate_limit_ms = config.rate_limit_ms,
            "crawler ready"
        );

        Ok(Self {
            pool: WorkerPool::new(config.max_workers),
            worker: Worker {
                fetcher,
                filter: Arc::new(filter),
                counters: Arc::new(Counters::default()),
                fetch_titles: config.fetch_titles,
                robots,
                selectors: Arc::new(selectors),
            },
            config,
            seeds,
            pages: Arc::new(Mutex::new(BTreeMap::new())),
        })
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    pub fn seeds(&self) -> &[Url] {
        &self.seeds
    }

    pub fn filter(&self) -> &RelevanceFilter {
        &self.worker.filter
    }

    pub fn stats(&self) -> CrawlStats {
        self.worker.counters.snapshot()
    }

    /// The discovered `url → title` mapping.
    pub async fn discovered(&self) -> BTreeMap<String, String> {
        self.pages.lock().await.clone()
    }

    /// Discover the site's relevant pages and their titles.
    ///
    /// Entry and chunk failures are logged and counted, never fatal. Only a
    /// failure to read the top-level sitemap is returned. Returns the number
    /// of relevant pages found.
    #[instrument(skip_all, fields(seed = %self.seeds[0]))]
    pub async fn parse_sitemap(&self, progress: &dyn ProgressReporter) -> Result<usize> {
        progress.phase("Locating sitemap");
        let source = find_sitemap(&self.worker.fetcher, &self.seeds[0]).await;
        info!(source = ?source, "sitemap source selected");

        let entries = list_entries(
            &self.worker.fetcher,
            &self.worker.filter,
            &source,
            self.config.max_crawl_depth,
        )
        .await?;
        if entries.is_empty() {
            warn!(location = source.location(), "sitemap listed no entries");
            return Ok(0);
        }

        let chunks: Vec<Vec<String>> = entries
            .chunks(self.config.chunk_size.max(1))
            .map(<[String]>::to_vec)
            .collect();
        let total = entries.len();
        progress.batch_started("Checking sitemap entries", total);

        let mut done = 0usize;
        let report = self
            .pool
            .run(
                chunks,
                |chunk| {
                    let worker = self.worker.clone();
                    let pages = self.pages.clone();
                    async move {
                        let len = chunk.len();
                        let found = worker.check_chunk(chunk).await;
                        let mut map = pages.lock().await;
                        for (url, title) in found {
                            map.insert(url, title);
                        }
                        len
                    }
                },
                |len| {
                    done += len;
                    progress.advance(done, total);
                },
            )
            .await;
        self.worker
            .counters
            .errors
            .fetch_add(report.panicked, Ordering::Relaxed);

        let relevant = self.pages.lock().await.len();
        progress.finish(&format!("{relevant} relevant pages"));
        let stats = self.stats();
        info!(
            entries = total,
            relevant,
            processed = stats.processed,
            disallowed = stats.disallowed,
            errors = stats.errors,
            "sitemap processing complete"
        );
        Ok(relevant)
    }

    /// Fetch the selected pages and write them to disk, skipping pages whose
    /// content hash matches `state`. The state is saved at the end.
    #[instrument(skip_all, fields(pages = urls.len(), output = %opts.output_dir.display()))]
    pub async fn process_selected_pages(
        &self,
        urls: &[String],
        opts: &WriteOptions,
        state: Arc<StateStore>,
        progress: &dyn ProgressReporter,
    ) -> Result<ProcessSummary> {
        let total = urls.len();
        progress.batch_started("Processing pages", total);

        let opts = Arc::new(opts.clone());
        let mut summary = ProcessSummary::default();
        let mut done = 0usize;

        let report = self
            .pool
            .run(
                urls.to_vec(),
                |url| {
                    let worker = self.worker.clone();
                    let state = state.clone();
                    let opts = opts.clone();
                    async move { worker.store_page(&url, &opts, &state).await }
                },
                |outcome| {
                    match outcome {
                        PageOutcome::Written => summary.written += 1,
                        PageOutcome::Unchanged => summary.unchanged += 1,
                        PageOutcome::Failed => summary.failed += 1,
                    }
                    done += 1;
                    progress.advance(done, total);
                },
            )
            .await;
        summary.failed += report.panicked;

        state.save().await?;
        progress.finish(&format!(
            "{} written, {} unchanged, {} failed",
            summary.written, summary.unchanged, summary.failed
        ));
        info!(
            written = summary.written,
            unchanged = summary.unchanged,
            failed = summary.failed,
            state = %state.path().display(),
            "page processing complete"
        );
        Ok(summary)
    }

    /// Fetch the selected pages and render `formats` in memory.
    ///
    /// Pages that fail are returned in the failure list, sorted by URL.
    #[instrument(skip_all, fields(pages = urls.len(), formats = ?formats))]
    pub async fn get_scraped_content(
        &self,
        urls: &[String],
        formats: &[OutputFormat],
        progress: &dyn ProgressReporter,
    ) -> (BTreeMap<String, PageContent>, Vec<PageFailure>) {
        let total = urls.len();
        progress.batch_started("Scraping pages", total);

        let formats: Arc<[OutputFormat]> = formats.into();
        let mut content = BTreeMap::new();
        let mut failures = Vec::new();
        let mut done = 0usize;

        self.pool
            .run(
                urls.to_vec(),
                |url| {
                    let worker = self.worker.clone();
                    let formats = formats.clone();
                    async move {
                        let result = worker.scrape_page(&url, &formats).await;
                        (url, result)
                    }
                },
                |(url, result)| {
                    match result {
                        Ok(page) => {
                            content.insert(url, page);
                        }
                        Err(e) => failures.push(PageFailure {
                            url,
                            error: e.to_string(),
                        }),
                    }
                    done += 1;
                    progress.advance(done, total);
                },
            )
            .await;

        failures.sort_by(|a, b| a.url.cmp(&b.url));
        progress.finish(&format!("{} pages scraped, {} failed", content.len(), failures.len()));
        info!(scraped = content.len(), failed = failures.len(), "scraping complete");
        (content, failures)
    }
}

// ---------------------------------------------------------------------------
// Worker tasks
// ---------------------------------------------------------------------------

impl Worker {
    /// Check every entry of a sitemap chunk; nested `.xml` sitemaps are read
    /// one level deep.
    async fn check_chunk(&self, chunk: Vec<String>) -> Vec<(String, String)> {
        let mut found = Vec::new();
        for entry in chunk {
            if is_xml_location(&entry) {
                match self.nested_locations(&entry).await {
                    Ok(locs) => {
                        for loc in locs.into_iter().filter(|l| !is_xml_location(l)) {
                            found.extend(self.check_page(loc).await);
                        }
                    }
                    Err(e) => {
                        self.counters.errors.fetch_add(1, Ordering::Relaxed);
                        warn!(sitemap = %entry, error = %e, "failed to read nested sitemap");
                    }
                }
            } else {
                found.extend(self.check_page(entry).await);
            }
        }
        found
    }

    async fn nested_locations(&self, location: &str) -> Result<Vec<String>> {
        let xml = self.fetcher.get(location).await?;
        let locs = parse_sitemap_locs(&xml)?;
        debug!(sitemap = %location, entries = locs.len(), "parsed nested sitemap");
        Ok(locs)
    }

    async fn check_page(&self, url: String) -> Option<(String, String)> {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        if !self.filter.is_relevant(&url) {
            debug!(%url, "not relevant");
            return None;
        }
        self.counters.relevant.fetch_add(1, Ordering::Relaxed);
        if !self.robots_allow(&url).await {
            self.counters.disallowed.fetch_add(1, Ordering::Relaxed);
            debug!(%url, "disallowed by robots.txt");
            return None;
        }

        let title = if self.fetch_titles {
            match self.fetcher.get(&url).await {
                Ok(html) => clean_title(page_title(&html).as_deref(), &url),
                Err(e) => {
                    debug!(%url, error = %e, "could not fetch title");
                    url.clone()
                }
            }
        } else {
            url.clone()
        };
        Some((url, title))
    }

    /// Whether robots.txt permits `url`; always true when compliance is off.
    async fn robots_allow(&self, url: &str) -> bool {
        let Some(gate) = &self.robots else {
            return true;
        };
        gate.rules
            .get_or_init(|| RobotsRules::fetch(&self.fetcher, &gate.base, &gate.user_agent))
            .await
            .is_allowed(url)
    }

    async fn ensure_allowed(&self, url: &str) -> Result<()> {
        if self.robots_allow(url).await {
            Ok(())
        } else {
            Err(DocsCrawlError::validation(format!("{url}: disallowed by robots.txt")))
        }
    }

    async fn store_page(&self, url: &str, opts: &WriteOptions, state: &StateStore) -> PageOutcome {
        match self.try_store_page(url, opts, state).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!(%url, error = %e, "failed to process page");
                PageOutcome::Failed
            }
        }
    }

    async fn try_store_page(
        &self,
        url: &str,
        opts: &WriteOptions,
        state: &StateStore,
    ) -> Result<PageOutcome> {
        self.ensure_allowed(url).await?;
        let html = self.fetcher.get(url).await?;
        let hash = content_hash(&html);
        if state.is_unchanged(url, &hash) {
            info!(%url, "skipping, no changes detected");
            return Ok(PageOutcome::Unchanged);
        }

        let page = render_page(url, &html, &opts.formats, HtmlRendition::FullPage, &self.selectors)?;
        let written = write_page(&opts.output_dir, &page, &opts.formats, opts.flatten)?;
        state.record(url, hash);
        debug!(%url, files = written.len(), "page written");
        Ok(PageOutcome::Written)
    }

    async fn scrape_page(&self, url: &str, formats: &[OutputFormat]) -> Result<PageContent> {
        self.ensure_allowed(url).await?;
        let html = self.fetcher.get(url).await?;
        render_page(url, &html, formats, HtmlRendition::MainContent, &self.selectors)
    }
}

/// Which HTML goes into the `html` rendition.
#[derive(Debug, Clone, Copy)]
enum HtmlRendition {
    /// The page exactly as served.
    FullPage,
    /// Only the main content element.
    MainContent,
}

fn render_page(
    url: &str,
    html: &str,
    formats: &[OutputFormat],
    rendition: HtmlRendition,
    selectors: &ContentSelectors,
) -> Result<PageContent> {
    if formats.is_empty() {
        return Err(DocsCrawlError::validation("no output formats requested"));
    }

    let mut bodies = BTreeMap::new();
    for &format in formats {
        let body = match format {
            OutputFormat::Markdown => {
                let opts = ConvertOptions::for_url(url).with_selectors(selectors.clone());
                convert(html, &opts)?.markdown
            }
            OutputFormat::Html => match rendition {
                HtmlRendition::FullPage => html.to_string(),
                HtmlRendition::MainContent => extract_main_html(html, selectors),
            },
            OutputFormat::Text => extract_text(html, selectors),
        };
        bodies.insert(format, body);
    }

    Ok(PageContent {
        url: url.to_string(),
        title: clean_title(page_title(html).as_deref(), url),
        bodies,
    })
}
