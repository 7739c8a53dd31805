//! Crawl state persistence.
//!
//! The [`StateStore`] keeps a flat `{ url: sha256 }` map in a JSON file so that
//! a re-crawl can skip pages whose content has not changed. It also writes the
//! `selected_urls_<ts>.txt` lists produced after discovery.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use docscrawl_shared::{DocsCrawlError, Result};

/// SHA-256 hex digest of a page body.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// URL → content hash map backed by a JSON file.
///
/// Shared by all workers of a crawl; every method takes `&self`.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    hashes: Mutex<BTreeMap<String, String>>,
}

impl StateStore {
    /// Load the state at `path`. A missing file yields an empty state.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self> {
        let hashes = match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str::<BTreeMap<String, String>>(&content).map_err(
                |e| DocsCrawlError::State(format!("malformed state file {}: {e}", path.display())),
            )?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no previous crawl state");
                BTreeMap::new()
            }
            Err(e) => return Err(DocsCrawlError::io(path, e)),
        };

        info!(entries = hashes.len(), "loaded crawl state");
        Ok(Self {
            path: path.to_path_buf(),
            hashes: Mutex::new(hashes),
        })
    }

    /// An empty state that will be written to `path` on [`save`](Self::save).
    pub fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            hashes: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when `url` was recorded with exactly `hash`.
    pub fn is_unchanged(&self, url: &str, hash: &str) -> bool {
        self.lock().get(url).is_some_and(|stored| stored == hash)
    }

    /// Remember the latest hash for `url`.
    pub fn record(&self, url: &str, hash: String) {
        self.lock().insert(url.to_string(), hash);
    }

    pub fn get(&self, url: &str) -> Option<String> {
        self.lock().get(url).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Write the state as pretty JSON, creating parent directories.
    pub async fn save(&self) -> Result<()> {
        let json = {
            let hashes = self.lock();
            serde_json::to_string_pretty(&*hashes)
                .map_err(|e| DocsCrawlError::State(format!("failed to encode state: {e}")))?
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DocsCrawlError::io(parent, e))?;
        }
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| DocsCrawlError::io(&self.path, e))?;

        debug!(path = %self.path.display(), "saved crawl state");
        Ok(())
    }

    // Poisoned locks are recovered; the map only holds owned strings.
    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.hashes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Selected URL lists
// ---------------------------------------------------------------------------

/// Write `urls` one per line to `<dir>/selected_urls_<unix_ts>.txt`.
pub async fn save_url_list(dir: &Path, urls: &[String]) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| DocsCrawlError::io(dir, e))?;

    let path = dir.join(format!(
        "selected_urls_{}.txt",
        chrono::Utc::now().timestamp()
    ));
    let mut body = urls.join("\n");
    body.push('\n');

    tokio::fs::write(&path, body)
        .await
        .map_err(|e| DocsCrawlError::io(&path, e))?;

    info!(path = %path.display(), count = urls.len(), "stored selected URLs");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("docscrawl-{tag}-{}", Uuid::now_v7()))
    }

    #[test]
    fn hash_is_sha256_hex() {
        let hash = content_hash("hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn missing_file_is_empty_state() {
        let dir = temp_dir("state-missing");
        let store = StateStore::open(&dir.join("crawler_state.json")).await.unwrap();
        assert!(store.is_empty());
        assert!(!store.is_unchanged("https://x.com/a", "abc"));
    }

    #[tokio::test]
    async fn save_and_reload() {
        let dir = temp_dir("state-roundtrip");
        let path = dir.join("nested").join("crawler_state.json");

        let store = StateStore::empty(&path);
        store.record("https://x.com/a", content_hash("A"));
        store.record("https://x.com/b", content_hash("B"));
        store.save().await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: BTreeMap<String, String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.len(), 2);

        let reloaded = StateStore::open(&path).await.unwrap();
        assert!(reloaded.is_unchanged("https://x.com/a", &content_hash("A")));
        assert!(!reloaded.is_unchanged("https://x.com/a", &content_hash("A2")));
        assert!(!reloaded.is_unchanged("https://x.com/c", &content_hash("A")));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn malformed_file_is_state_error() {
        let dir = temp_dir("state-bad");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("crawler_state.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let err = StateStore::open(&path).await.unwrap_err();
        assert!(matches!(err, DocsCrawlError::State(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn url_list_written_one_per_line() {
        let dir = temp_dir("urls");
        let urls = vec!["https://x.com/a".to_string(), "https://x.com/b".to_string()];

        let path = save_url_list(&dir, &urls).await.unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("selected_urls_") && name.ends_with(".txt"));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "https://x.com/a\nhttps://x.com/b\n"
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}
