//! ZIP bundles of scraped pages.

use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Write};
use std::path::Path;

use tracing::{debug, info, instrument};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use docscrawl_shared::{ArchiveMetadata, DocsCrawlError, PageContent, Result};

use crate::layout::{archive_entry_name, write_atomic_bytes};

/// Name of the metadata entry inside every archive.
pub const METADATA_ENTRY: &str = "metadata.json";

/// Build a deflated ZIP holding one entry per page per rendition, plus
/// `metadata.json`.
///
/// URLs that flatten to the same entry name get `_2`, `_3`, ... suffixes in
/// URL order.
#[instrument(skip_all, fields(pages = pages.len()))]
pub fn build_archive(
    pages: &BTreeMap<String, PageContent>,
    metadata: &ArchiveMetadata,
) -> Result<Vec<u8>> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    let mut used = HashSet::from([METADATA_ENTRY.to_string()]);
    let mut entries = 0usize;
    for (url, page) in pages {
        for (format, body) in &page.bodies {
            let name =
                unique_entry_name(archive_entry_name(url, *format), format.extension(), &mut used);
            zip.start_file(name.as_str(), options)
                .map_err(|e| DocsCrawlError::Archive(format!("start entry '{name}': {e}")))?;
            zip.write_all(body.as_bytes())
                .map_err(|e| DocsCrawlError::Archive(format!("write entry '{name}': {e}")))?;
            entries += 1;
        }
    }

    let meta_json = serde_json::to_string_pretty(metadata)
        .map_err(|e| DocsCrawlError::Archive(format!("serialize metadata: {e}")))?;
    zip.start_file(METADATA_ENTRY, options)
        .map_err(|e| DocsCrawlError::Archive(format!("start metadata entry: {e}")))?;
    zip.write_all(meta_json.as_bytes())
        .map_err(|e| DocsCrawlError::Archive(format!("write metadata entry: {e}")))?;

    let bytes = zip
        .finish()
        .map_err(|e| DocsCrawlError::Archive(format!("finish archive: {e}")))?
        .into_inner();

    info!(entries, size = bytes.len(), "archive built");
    Ok(bytes)
}

fn unique_entry_name(name: String, extension: &str, used: &mut HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let stem = name.strip_suffix(extension).unwrap_or(&name);
    let unique = (2usize..)
        .map(|n| format!("{stem}_{n}{extension}"))
        .find(|candidate| !used.contains(candidate))
        .unwrap_or_else(|| name.clone());
    debug!(entry = %name, renamed = %unique, "archive entry name taken");
    used.insert(unique.clone());
    unique
}

/// Build the archive and write it to `path`.
pub fn write_archive(
    path: &Path,
    pages: &BTreeMap<String, PageContent>,
    metadata: &ArchiveMetadata,
) -> Result<()> {
    let bytes = build_archive(pages, metadata)?;
    write_atomic_bytes(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    use chrono::Utc;
    use docscrawl_shared::{OutputFormat, PageFailure, SessionId};
    use zip::ZipArchive;

    fn sample() -> (BTreeMap<String, PageContent>, ArchiveMetadata) {
        let url = "https://docs.x.com/guide/setup".to_string();
        let page = PageContent {
            url: url.clone(),
            title: "Setup".into(),
            bodies: BTreeMap::from([
                (OutputFormat::Markdown, "# Setup\n\nInstall it.\n".to_string()),
                (OutputFormat::Text, "Setup Install it.".to_string()),
            ]),
        };
        let meta = ArchiveMetadata {
            session_id: SessionId::new(),
            total_pages: 1,
            crawled_at: Utc::now(),
            urls: vec![url.clone()],
            errors: vec![PageFailure {
                url: "https://docs.x.com/guide/broken".into(),
                error: "HTTP 404".into(),
            }],
        };
        (BTreeMap::from([(url, page)]), meta)
    }

    fn read_entry(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> String {
        let mut file = archive.by_name(name).unwrap();
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn archive_holds_pages_and_metadata() {
        let (pages, meta) = sample();
        let bytes = build_archive(&pages, &meta).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 3);

        assert_eq!(
            read_entry(&mut archive, "docs.x.com_guide_setup.md"),
            "# Setup\n\nInstall it.\n"
        );
        assert_eq!(
            read_entry(&mut archive, "docs.x.com_guide_setup.txt"),
            "Setup Install it."
        );

        let meta_json: serde_json::Value =
            serde_json::from_str(&read_entry(&mut archive, METADATA_ENTRY)).unwrap();
        assert_eq!(meta_json["total_pages"], 1);
        assert_eq!(meta_json["errors"][0]["error"], "HTTP 404");
    }

    #[test]
    fn colliding_entry_names_are_suffixed() {
        let (_, meta) = sample();
        let page = |url: &str, body: &str| {
            (
                url.to_string(),
                PageContent {
                    url: url.to_string(),
                    title: body.to_string(),
                    bodies: BTreeMap::from([(OutputFormat::Markdown, body.to_string())]),
                },
            )
        };
        let pages = BTreeMap::from([
            page("https://x.com/docs/get/started", "slashes"),
            page("https://x.com/docs/get_started", "underscore"),
            page("https://x.com/docs/get?started", "query"),
        ]);

        let bytes = build_archive(&pages, &meta).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 4);
        assert_eq!(read_entry(&mut archive, "x.com_docs_get_started.md"), "slashes");
        assert_eq!(read_entry(&mut archive, "x.com_docs_get_started_2.md"), "query");
        assert_eq!(read_entry(&mut archive, "x.com_docs_get_started_3.md"), "underscore");
    }

    #[test]
    fn empty_page_set_still_has_metadata() {
        let (_, meta) = sample();
        let bytes = build_archive(&BTreeMap::new(), &meta).unwrap();
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn write_archive_creates_file() {
        let dir = std::env::temp_dir().join(format!("docscrawl-archive-{}", uuid::Uuid::now_v7()));
        let path = dir.join("bundle.zip");
        let (pages, meta) = sample();

        write_archive(&path, &pages, &meta).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(ZipArchive::new(Cursor::new(bytes)).is_ok());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
