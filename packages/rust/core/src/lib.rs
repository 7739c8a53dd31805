//! End-to-end docscrawl workflows.
//!
//! [`pipeline`] ties discovery, crawling and the output artifacts together:
//! pages to disk, ZIP archives, consolidated documents and Google Docs.

pub mod pipeline;
