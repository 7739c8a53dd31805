//! Concurrent documentation crawling.
//!
//! - [`engine`] drives discovery and page processing ([`DocCrawler`])
//! - [`pool`] is the bounded worker pool both phases run on
//! - [`progress`] defines the hooks front-ends use to show progress

pub mod engine;
pub mod pool;
pub mod progress;

pub use engine::{CrawlStats, DocCrawler, ProcessSummary, WriteOptions};
pub use pool::{PoolReport, WorkerPool};
pub use progress::{ProgressReporter, SilentProgress};
