//! Progress reporting hooks for long-running crawl phases.

/// Receives progress events from the crawler and pipelines.
///
/// Implementations must be cheap; `advance` is called once per completed
/// work item.
pub trait ProgressReporter: Send + Sync {
    /// A named phase begins (e.g. "Discovering sitemap").
    fn phase(&self, name: &str);
    /// A batch of `total` work items starts.
    fn batch_started(&self, label: &str, total: usize);
    /// `done` of `total` items have completed.
    fn advance(&self, done: usize, total: usize);
    /// The current batch or run is over.
    fn finish(&self, summary: &str);
}

/// A reporter that ignores every event.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn batch_started(&self, _label: &str, _total: usize) {}
    fn advance(&self, _done: usize, _total: usize) {}
    fn finish(&self, _summary: &str) {}
}
