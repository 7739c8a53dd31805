//! Application configuration for docscrawl.
//!
//! User config lives at `~/.docscrawl/docscrawl.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DocsCrawlError, Result};
use crate::types::OutputFormat;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "docscrawl.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".docscrawl";

/// Upper bound for the retry backoff base, in seconds.
pub const MAX_RETRY_DELAY_SECS: f64 = 300.0;

/// Browser-like user agent; several doc hosts refuse obvious bots.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

// ---------------------------------------------------------------------------
// Config structs (matching docscrawl.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Fetching, discovery and worker pool settings.
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Where and how pages are written.
    #[serde(default)]
    pub output: OutputConfig,

    /// Google Docs publishing.
    #[serde(default)]
    pub google: GoogleConfig,
}

/// `[crawler]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Language code pages must match (`hl` parameter or path segment).
    #[serde(default = "default_language")]
    pub language: String,

    /// Size of the bounded worker pool.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Number of attempts per request. Zero still makes one attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay of the linear backoff, in seconds.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: f64,

    /// Number of sitemap entries handed to one worker.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Link-following depth when no XML sitemap exists.
    #[serde(default = "default_max_crawl_depth")]
    pub max_crawl_depth: u32,

    /// Fetch each relevant page during discovery to read its `<title>`.
    #[serde(default = "default_true")]
    pub fetch_titles: bool,

    /// Regexes a URL must match (any) to be kept. Empty keeps everything.
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Regexes that drop a URL when any matches.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Skip URLs that the site's robots.txt disallows for our user agent.
    #[serde(default = "default_true")]
    pub respect_robots_txt: bool,

    /// Pause before every page request, per worker, in milliseconds.
    #[serde(default)]
    pub rate_limit_ms: u64,

    /// Keep at most this many discovered pages. Unset means no cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<usize>,

    /// CSS selectors tried before the built-in content containers.
    #[serde(default)]
    pub content_selectors: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            max_workers: default_max_workers(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
            chunk_size: default_chunk_size(),
            user_agent: default_user_agent(),
            max_crawl_depth: default_max_crawl_depth(),
            fetch_titles: true,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            respect_robots_txt: true,
            rate_limit_ms: 0,
            max_pages: None,
            content_selectors: Vec::new(),
        }
    }
}

fn default_language() -> String {
    "en".into()
}
fn default_max_workers() -> usize {
    10
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_secs() -> f64 {
    1.0
}
fn default_chunk_size() -> usize {
    10
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.into()
}
fn default_max_crawl_depth() -> u32 {
    2
}
fn default_true() -> bool {
    true
}

impl CrawlerConfig {
    /// Reject settings the crawler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.language.trim().is_empty() {
            return Err(DocsCrawlError::config("language must not be empty"));
        }
        if self.max_workers < 1 {
            return Err(DocsCrawlError::config("max_workers must be at least 1"));
        }
        if self.timeout_secs < 1 {
            return Err(DocsCrawlError::config("timeout_secs must be at least 1"));
        }
        if !(0.0..=MAX_RETRY_DELAY_SECS).contains(&self.retry_delay_secs) {
            return Err(DocsCrawlError::config(format!(
                "retry_delay_secs must be between 0 and {MAX_RETRY_DELAY_SECS}"
            )));
        }
        if self.chunk_size < 1 {
            return Err(DocsCrawlError::config("chunk_size must be at least 1"));
        }
        if self.user_agent.trim().is_empty() {
            return Err(DocsCrawlError::config("user_agent must not be empty"));
        }
        if self.max_crawl_depth < 1 {
            return Err(DocsCrawlError::config("max_crawl_depth must be at least 1"));
        }
        if self.max_pages == Some(0) {
            return Err(DocsCrawlError::config("max_pages must be at least 1 when set"));
        }
        if self.content_selectors.iter().any(|s| s.trim().is_empty()) {
            return Err(DocsCrawlError::config("content_selectors must not contain empty entries"));
        }
        for pattern in self.include_patterns.iter().chain(&self.exclude_patterns) {
            regex::Regex::new(pattern).map_err(|e| {
                DocsCrawlError::config(format!("invalid URL pattern '{pattern}': {e}"))
            })?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.retry_delay_secs).map_err(|e| {
            DocsCrawlError::config(format!(
                "retry_delay_secs {} is not a valid duration: {e}",
                self.retry_delay_secs
            ))
        })
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Root directory for page files and consolidated documents.
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,

    /// Formats written for every page.
    #[serde(default = "default_formats")]
    pub formats: Vec<OutputFormat>,

    /// Write `a/b/c` as `a_b_c.md` instead of nested directories.
    #[serde(default)]
    pub flatten: bool,

    /// JSON file mapping URL to content hash.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Directory for `selected_urls_<ts>.txt` lists.
    #[serde(default = "default_urls_dir")]
    pub urls_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            formats: default_formats(),
            flatten: false,
            state_file: default_state_file(),
            urls_dir: default_urls_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("downloaded_docs")
}
fn default_formats() -> Vec<OutputFormat> {
    vec![OutputFormat::Markdown]
}
fn default_state_file() -> PathBuf {
    PathBuf::from("crawler_state.json")
}
fn default_urls_dir() -> PathBuf {
    PathBuf::from("selected_urls")
}

/// `[google]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// Name of the env var holding an OAuth access token (never store the token itself).
    #[serde(default = "default_access_token_env")]
    pub access_token_env: String,

    /// Token file written by an external OAuth flow, used when the env var is unset.
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            access_token_env: default_access_token_env(),
            token_file: default_token_file(),
        }
    }
}

fn default_access_token_env() -> String {
    "GOOGLE_OAUTH_ACCESS_TOKEN".into()
}
fn default_token_file() -> PathBuf {
    PathBuf::from("token.json")
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.docscrawl/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DocsCrawlError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.docscrawl/docscrawl.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DocsCrawlError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        DocsCrawlError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.crawler.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DocsCrawlError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DocsCrawlError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DocsCrawlError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
