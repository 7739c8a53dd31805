//! Shared types, error model, and configuration for docscrawl.
//!
//! This crate is the foundation depended on by all other docscrawl crates.
//! It provides:
//! - [`DocsCrawlError`], the unified error type
//! - Domain types ([`OutputFormat`], [`PageContent`], [`ArchiveMetadata`], [`SessionId`])
//! - Configuration ([`AppConfig`], [`CrawlerConfig`], config loading)
//! - URL helpers ([`url`])

pub mod config;
pub mod error;
pub mod types;
pub mod url;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlerConfig, DEFAULT_USER_AGENT, GoogleConfig, MAX_RETRY_DELAY_SECS, OutputConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{DocsCrawlError, Result};
pub use types::{ArchiveMetadata, OutputFormat, PageContent, PageFailure, SessionId};
