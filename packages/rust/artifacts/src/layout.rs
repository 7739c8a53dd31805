//! Where page files go on disk and what they are called inside archives.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use docscrawl_shared::url::relative_path;
use docscrawl_shared::{DocsCrawlError, OutputFormat, PageContent, Result};

/// Paths longer than this get a shortened, hash-suffixed file name.
const MAX_PATH_LEN: usize = 255;

/// Length the relative path is cut to when shortening.
const TRUNCATED_LEN: usize = 200;

/// Web page extensions replaced by the output format's extension.
const PAGE_EXTENSIONS: &[&str] = &[".html", ".htm", ".php", ".aspx", ".md"];

static INVALID_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("invalid chars regex"));

static DASH_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-+").expect("dash run regex"));

/// File path for one rendition of a page.
///
/// The URL path (`index` for the root) becomes the file path under
/// `output_dir`; with `flatten` its segments are joined with `_` instead.
/// Overlong paths are cut to 200 characters plus `_<5 hex of sha256>`.
pub fn page_file_path(output_dir: &Path, url: &Url, flatten: bool, format: OutputFormat) -> PathBuf {
    let segments: Vec<String> = relative_path(url)
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let joined = if flatten {
        segments.join("_")
    } else {
        segments.join("/")
    };
    let relative = format!("{}{}", strip_page_extension(&joined), format.extension());

    let candidate = output_dir.join(&relative);
    if candidate.to_string_lossy().chars().count() <= MAX_PATH_LEN {
        return candidate;
    }

    let digest = format!("{:x}", Sha256::digest(candidate.to_string_lossy().as_bytes()));
    let truncated: String = relative.chars().take(TRUNCATED_LEN).collect();
    let truncated = truncated.trim_end_matches('/');
    let shortened = output_dir.join(format!("{truncated}_{}{}", &digest[..5], format.extension()));
    debug!(original = %candidate.display(), shortened = %shortened.display(), "shortened long path");
    shortened
}

fn strip_page_extension(path: &str) -> &str {
    let lower = path.to_ascii_lowercase();
    PAGE_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext) && lower.len() > ext.len())
        .map(|ext| &path[..path.len() - ext.len()])
        .unwrap_or(path)
}

/// Write every requested rendition of `page` that has a body.
///
/// Files are written to a temporary sibling first and renamed into place.
pub fn write_page(
    output_dir: &Path,
    page: &PageContent,
    formats: &[OutputFormat],
    flatten: bool,
) -> Result<Vec<PathBuf>> {
    let url = Url::parse(&page.url)
        .map_err(|e| DocsCrawlError::parse(format!("invalid page URL '{}': {e}", page.url)))?;

    let mut written = Vec::with_capacity(formats.len());
    for &format in formats {
        let Some(body) = page.body(format) else {
            continue;
        };
        let path = page_file_path(output_dir, &url, flatten, format);
        write_atomic(&path, body)?;
        written.push(path);
    }
    Ok(written)
}

/// Write `content` to `path` via a temp file and rename, creating parents.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    write_atomic_bytes(path, content.as_bytes())
}

pub(crate) fn write_atomic_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DocsCrawlError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, bytes).map_err(|e| DocsCrawlError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| DocsCrawlError::io(path, e))?;

    debug!(path = %path.display(), size = bytes.len(), "wrote file");
    Ok(())
}

/// ZIP entry name for a page: scheme dropped, `/ ? &` replaced by `_`.
pub fn archive_entry_name(url: &str, format: OutputFormat) -> String {
    let bare = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let name: String = bare
        .chars()
        .map(|c| if matches!(c, '/' | '?' | '&') { '_' } else { c })
        .collect();
    format!("{name}{}", format.extension())
}

/// Cross-platform file name: invalid characters become `-`, dash runs
/// collapse, leading/trailing `.`/`-` are trimmed, 100 characters max.
pub fn sanitize_filename(name: &str) -> String {
    let replaced = INVALID_CHARS_RE.replace_all(name, "-");
    let collapsed = DASH_RUN_RE.replace_all(&replaced, "-");
    let trimmed: String = collapsed
        .trim_matches(|c| c == '.' || c == '-')
        .chars()
        .take(100)
        .collect();

    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed
    }
}
