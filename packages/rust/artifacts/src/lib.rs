//! Output artifacts for scraped documentation.
//!
//! - [`layout`] maps page URLs to files on disk and ZIP entry names
//! - [`archive`] bundles pages and crawl metadata into a ZIP
//! - [`document`] renders consolidated documents (single, chapters, pages)

pub mod archive;
pub mod document;
pub mod layout;

pub use archive::{METADATA_ENTRY, build_archive, write_archive};
pub use document::{DocumentPage, DocumentRenderer, Organization, anchor, group_chapters};
pub use layout::{archive_entry_name, page_file_path, sanitize_filename, write_atomic, write_page};
