//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::Result;
use docscrawl_core::pipeline::{
    self, AccessToken, CrawlJob, DocTarget, DocumentRequest, Organization, ProgressReporter,
    save_url_list,
};
use docscrawl_shared::url::{authority, parse_http_url};
use docscrawl_shared::{
    AppConfig, CrawlerConfig, OutputFormat, PageFailure, init_config, load_config,
    load_config_from,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// docscrawl: mirror documentation sites as Markdown, HTML or text.
#[derive(Parser)]
#[command(
    name = "docscrawl",
    version,
    about = "Crawl documentation sites into files, ZIP archives, consolidated documents or Google Docs.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.docscrawl/docscrawl.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub crawler: CrawlerArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Overrides for the `[crawler]` config section.
#[derive(Args, Debug, Default)]
pub(crate) struct CrawlerArgs {
    /// Language code pages must match.
    #[arg(long, global = true)]
    pub language: Option<String>,

    /// Number of concurrent workers.
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Request timeout in seconds.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Attempts per request.
    #[arg(long, global = true)]
    pub retries: Option<u32>,

    /// Base retry delay in seconds (grows linearly per attempt).
    #[arg(long, global = true)]
    pub retry_delay: Option<f64>,

    /// Sitemap entries per worker task.
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    /// Link-following depth when the site has no XML sitemap.
    #[arg(long, global = true)]
    pub depth: Option<u32>,

    /// User-Agent header.
    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// Keep only URLs matching one of these regexes.
    #[arg(long = "include", global = true)]
    pub include: Vec<String>,

    /// Drop URLs matching any of these regexes.
    #[arg(long = "exclude", global = true)]
    pub exclude: Vec<String>,

    /// Do not fetch pages during discovery to read their titles.
    #[arg(long, global = true)]
    pub no_titles: bool,

    /// Ignore the site's robots.txt.
    #[arg(long, global = true)]
    pub no_robots: bool,

    /// Minimum milliseconds each worker waits before a page request.
    #[arg(long, global = true)]
    pub rate_limit: Option<u64>,

    /// Keep at most this many discovered pages.
    #[arg(long, global = true)]
    pub max_pages: Option<usize>,

    /// CSS selector for the main content, tried before the built-in ones.
    #[arg(long = "content-selector", global = true)]
    pub content_selectors: Vec<String>,
}

impl CrawlerArgs {
    fn apply(&self, config: &mut CrawlerConfig) {
        if let Some(language) = &self.language {
            config.language = language.clone();
        }
        if let Some(workers) = self.workers {
            config.max_workers = workers;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(retries) = self.retries {
            config.max_retries = retries;
        }
        if let Some(delay) = self.retry_delay {
            config.retry_delay_secs = delay;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(depth) = self.depth {
            config.max_crawl_depth = depth;
        }
        if let Some(agent) = &self.user_agent {
            config.user_agent = agent.clone();
        }
        config.include_patterns.extend(self.include.iter().cloned());
        config.exclude_patterns.extend(self.exclude.iter().cloned());
        if self.no_titles {
            config.fetch_titles = false;
        }
        if self.no_robots {
            config.respect_robots_txt = false;
        }
        if let Some(ms) = self.rate_limit {
            config.rate_limit_ms = ms;
        }
        if let Some(max) = self.max_pages {
            config.max_pages = Some(max);
        }
        config
            .content_selectors
            .extend(self.content_selectors.iter().cloned());
    }
}

/// Seed URLs shared by every crawling subcommand.
#[derive(Args, Debug)]
pub(crate) struct SeedArgs {
    /// Seed URLs; all must be on the same domain.
    #[arg(required = true, num_args = 1..)]
    pub seeds: Vec<String>,

    /// Process exactly the seeds, skipping sitemap discovery.
    #[arg(long)]
    pub seeds_only: bool,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// List the relevant pages of a documentation site.
    Discover {
        #[command(flatten)]
        seeds: SeedArgs,

        /// Also save the list as selected_urls_<timestamp>.txt.
        #[arg(long)]
        save_urls: bool,

        /// Print `url → title` as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Download pages to disk, skipping those unchanged since the last run.
    Crawl {
        #[command(flatten)]
        seeds: SeedArgs,

        /// Output directory (defaults to the config value).
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Formats to write: markdown, html, text (repeatable or comma-separated).
        #[arg(short, long = "format", value_delimiter = ',', value_parser = parse_format)]
        formats: Vec<OutputFormat>,

        /// Write `a/b/c` as `a_b_c.md`.
        #[arg(long)]
        flatten: bool,

        /// Change-detection state file.
        #[arg(long)]
        state_file: Option<PathBuf>,

        /// Save the selected URL list before downloading.
        #[arg(long)]
        save_urls: bool,
    },

    /// Scrape pages and bundle them into a ZIP archive.
    Archive {
        #[command(flatten)]
        seeds: SeedArgs,

        /// Archive path (defaults to <output dir>/<host>_<timestamp>.zip).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Formats to include (repeatable or comma-separated).
        #[arg(short, long = "format", value_delimiter = ',', value_parser = parse_format)]
        formats: Vec<OutputFormat>,
    },

    /// Scrape pages into one consolidated document, optionally published to Google Docs.
    Document {
        #[command(flatten)]
        seeds: SeedArgs,

        /// Organization: single, chapters or pages.
        #[arg(long, default_value = "single", value_parser = parse_organization)]
        organization: Organization,

        /// Document format.
        #[arg(short, long, default_value = "markdown", value_parser = parse_format)]
        format: OutputFormat,

        /// Output file (single) or directory (chapters, pages).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Create a new Google Doc with this title.
        #[arg(long, conflicts_with = "gdoc_update")]
        gdoc_create: Option<String>,

        /// Update the Google Doc with this ID.
        #[arg(long)]
        gdoc_update: Option<String>,

        /// Append to the Google Doc instead of replacing its content.
        #[arg(long, requires = "gdoc_update")]
        append: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

fn parse_format(raw: &str) -> std::result::Result<OutputFormat, String> {
    raw.parse::<OutputFormat>().map_err(|e| e.to_string())
}

fn parse_organization(raw: &str) -> std::result::Result<Organization, String> {
    raw.parse::<Organization>().map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "docscrawl=info",
        1 => "docscrawl=debug",
        _ => "docscrawl=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let Cli {
        config,
        crawler,
        command,
        ..
    } = cli;
    let config_path = config.as_deref();

    match command {
        Command::Discover {
            seeds,
            save_urls,
            json,
        } => cmd_discover(config_path, &crawler, &seeds, save_urls, json).await,
        Command::Crawl {
            seeds,
            output_dir,
            formats,
            flatten,
            state_file,
            save_urls,
        } => {
            let mut config = resolve_config(config_path)?;
            if let Some(dir) = output_dir {
                config.output.dir = dir;
            }
            if !formats.is_empty() {
                config.output.formats = formats;
            }
            if let Some(state_file) = state_file {
                config.output.state_file = state_file;
            }
            config.output.flatten |= flatten;
            cmd_crawl(&config, &crawler, &seeds, save_urls).await
        }
        Command::Archive {
            seeds,
            output,
            formats,
        } => cmd_archive(config_path, &crawler, &seeds, output, formats).await,
        Command::Document {
            seeds,
            organization,
            format,
            output,
            gdoc_create,
            gdoc_update,
            append,
        } => {
            let target = match (gdoc_create, gdoc_update) {
                (Some(title), _) => Some(DocTarget::Create { title }),
                (None, Some(document_id)) => Some(DocTarget::Update {
                    document_id,
                    append,
                }),
                (None, None) => None,
            };
            cmd_document(config_path, &crawler, &seeds, organization, format, output, target)
                .await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

fn crawl_job(config: &AppConfig, overrides: &CrawlerArgs, seeds: &SeedArgs) -> Result<CrawlJob> {
    let mut crawler = config.crawler.clone();
    overrides.apply(&mut crawler);
    crawler.validate()?;

    let urls = seeds
        .seeds
        .iter()
        .map(|raw| parse_http_url(raw))
        .collect::<docscrawl_shared::Result<Vec<_>>>()?;

    Ok(CrawlJob {
        seeds: urls,
        config: crawler,
        use_seeds_only: seeds.seeds_only,
    })
}

fn print_failures(failures: &[PageFailure]) {
    if failures.is_empty() {
        return;
    }
    println!("  Failed pages:");
    for failure in failures {
        println!("    {}: {}", failure.url, failure.error);
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_discover(
    config_path: Option<&Path>,
    overrides: &CrawlerArgs,
    seeds: &SeedArgs,
    save_urls: bool,
    json: bool,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let job = crawl_job(&config, overrides, seeds)?;
    info!(seeds = job.seeds.len(), "discovering documentation pages");

    let reporter = CliProgress::new();
    let discovery = pipeline::discover(&job, &reporter).await;
    reporter.done();
    let discovery = discovery?;

    if json {
        println!("{}", serde_json::to_string_pretty(&discovery.pages)?);
    } else {
        for (url, title) in &discovery.pages {
            println!("{url}\t{title}");
        }
    }

    if save_urls {
        let path = save_url_list(&config.output.urls_dir, &discovery.urls()).await?;
        eprintln!("Saved URL list to {}", path.display());
    }

    eprintln!(
        "{} relevant of {} processed ({} disallowed by robots.txt, {} errors)",
        discovery.stats.relevant,
        discovery.stats.processed,
        discovery.stats.disallowed,
        discovery.stats.errors
    );
    Ok(())
}

async fn cmd_crawl(
    config: &AppConfig,
    overrides: &CrawlerArgs,
    seeds: &SeedArgs,
    save_urls: bool,
) -> Result<()> {
    let job = crawl_job(config, overrides, seeds)?;
    info!(
        output = %config.output.dir.display(),
        formats = ?config.output.formats,
        "crawling documentation"
    );

    let reporter = CliProgress::new();
    let result = pipeline::export_to_disk(&job, &config.output, save_urls, &reporter).await;
    reporter.done();
    let result = result?;

    println!();
    println!("  Crawl complete!");
    println!("  Pages:      {}", result.discovered);
    println!("  Written:    {}", result.summary.written);
    println!("  Unchanged:  {}", result.summary.unchanged);
    println!("  Failed:     {}", result.summary.failed);
    println!("  Output:     {}", config.output.dir.display());
    println!("  State:      {}", result.state_file.display());
    if let Some(list) = &result.url_list {
        println!("  URL list:   {}", list.display());
    }
    println!("  Time:       {:.1}s", result.elapsed.as_secs_f64());
    println!();

    Ok(())
}

async fn cmd_archive(
    config_path: Option<&Path>,
    overrides: &CrawlerArgs,
    seeds: &SeedArgs,
    output: Option<PathBuf>,
    formats: Vec<OutputFormat>,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let job = crawl_job(&config, overrides, seeds)?;
    let formats = if formats.is_empty() {
        config.output.formats.clone()
    } else {
        formats
    };
    let path = output.unwrap_or_else(|| default_archive_path(&config, &job));

    let reporter = CliProgress::new();
    let result = pipeline::export_to_archive(&job, &formats, &path, &reporter).await;
    reporter.done();
    let result = result?;

    println!();
    println!("  Archive created!");
    println!("  Session:  {}", result.session_id);
    println!("  Pages:    {}", result.pages);
    println!("  Path:     {}", result.path.display());
    println!("  Time:     {:.1}s", result.elapsed.as_secs_f64());
    print_failures(&result.failures);
    println!();

    Ok(())
}

fn default_archive_path(config: &AppConfig, job: &CrawlJob) -> PathBuf {
    let host = job
        .seeds
        .first()
        .map(|seed| authority(seed).replace(':', "_"))
        .unwrap_or_else(|| "docs".to_string());
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    config.output.dir.join(format!("{host}_{stamp}.zip"))
}

async fn cmd_document(
    config_path: Option<&Path>,
    overrides: &CrawlerArgs,
    seeds: &SeedArgs,
    organization: Organization,
    format: OutputFormat,
    output: Option<PathBuf>,
    target: Option<DocTarget>,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let job = crawl_job(&config, overrides, seeds)?;

    // Fail before crawling when publishing cannot succeed.
    let token = match &target {
        Some(_) => Some(AccessToken::from_config(&config.google)?),
        None => None,
    };

    let output = output.unwrap_or_else(|| match organization {
        Organization::Single => config
            .output
            .dir
            .join(format!("documentation{}", format.extension())),
        Organization::Chapters | Organization::Pages => config.output.dir.join("documentation"),
    });
    let request = DocumentRequest {
        organization,
        format,
        output,
    };

    let reporter = CliProgress::new();
    let result = pipeline::export_to_document(&job, &request, &reporter).await;
    let result = match result {
        Ok(result) => result,
        Err(e) => {
            reporter.done();
            return Err(e.into());
        }
    };

    let published = match (target, token) {
        (Some(target), Some(token)) => {
            reporter.phase("Publishing to Google Docs");
            let published = pipeline::publish_google_doc(token, &target, &result.markdown).await;
            reporter.done();
            Some(published?)
        }
        _ => {
            reporter.done();
            None
        }
    };

    println!();
    println!("  Document created!");
    println!("  Pages:   {}", result.pages);
    for file in &result.files {
        println!("  File:    {}", file.display());
    }
    if let Some(doc) = &published {
        println!("  Google Doc: {}", doc.url);
    }
    println!("  Time:    {:.1}s", result.elapsed.as_secs_f64());
    print_failures(&result.failures);
    println!();

    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

const TICKS: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&TICKS)
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {msg} [{bar:30.cyan/blue}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_strings(&TICKS)
        .progress_chars("=> ")
}

/// CLI progress reporter: a spinner between phases, a bar during batches.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(spinner_style());
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    fn done(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.bar.set_style(spinner_style());
        self.bar.set_message(name.to_string());
    }

    fn batch_started(&self, label: &str, total: usize) {
        self.bar.set_style(bar_style());
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_message(label.to_string());
    }

    fn advance(&self, done: usize, _total: usize) {
        self.bar.set_position(done as u64);
    }

    fn finish(&self, summary: &str) {
        self.bar.set_style(spinner_style());
        self.bar.println(format!("  {summary}"));
    }
}
