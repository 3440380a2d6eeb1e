//! The blocklist store.
//!
//! The whole state of the server is one newline-delimited text file. Reads
//! go straight to disk on every request, so there is no in-memory copy to
//! go stale; writes rewrite the file in full.

mod render;

pub use render::{render, ListFormat};

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::config::{BlockType, Config};
use crate::error::{Result, StoreError};

/// File name of the persisted blocklist inside `blocklist_root`.
pub const BLOCKLIST_FILE: &str = "blocklist.txt";

/// Owns the on-disk blocklist file.
///
/// Appends are serialized through `write_lock` and committed with a
/// tmp-file rename, so concurrent /block requests cannot lose each other's
/// entries and readers never observe a half-written file.
pub struct BlocklistStore {
    path: PathBuf,
    block_type: BlockType,
    header: String,
    write_lock: Mutex<()>,
}

impl BlocklistStore {
    pub fn new(config: &Config) -> Self {
        Self {
            path: config.blocklist_root.join(BLOCKLIST_FILE),
            block_type: config.block_type,
            header: config.blocklist_header.clone(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the persisted file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Normalizes one candidate entry.
    ///
    /// In hostname mode the entry is reduced to the host component of a
    /// URL, assuming `https://` when no scheme is present. In raw mode it
    /// is kept as submitted, trimmed. File lines and submitted URLs both
    /// pass through here, which is what makes deduplication across the two
    /// meaningful.
    pub fn normalize(&self, raw: &str) -> Result<String> {
        let raw = raw.trim();
        match self.block_type {
            BlockType::Hostname => {
                let candidate = if has_scheme(raw) {
                    raw.to_string()
                } else {
                    format!("https://{raw}")
                };
                let url = Url::parse(&candidate).map_err(|e| StoreError::InvalidUrl {
                    input: raw.to_string(),
                    reason: e.to_string(),
                })?;
                let host = url
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| StoreError::InvalidUrl {
                        input: raw.to_string(),
                        reason: "no host component".to_string(),
                    })?;
                Ok(host.to_string())
            }
            BlockType::Raw => Ok(raw.to_string()),
        }
    }

    /// Loads the current entries, seeded with `seed`.
    ///
    /// Seed values come first in the returned order, then file lines.
    /// Blank lines and `#` comments are skipped, every retained value is
    /// normalized, and duplicates keep their first occurrence. A missing
    /// file is an empty list, not an error. Never sorts.
    pub async fn load(&self, seed: &[String]) -> Result<Vec<String>> {
        let data = match fs::read_to_string(&self.path).await {
            Ok(data) => Some(data),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        let mut entries: Vec<String> = Vec::new();
        for raw in seed {
            let entry = self.normalize(raw)?;
            if !entry.is_empty() && !entries.contains(&entry) {
                entries.push(entry);
            }
        }

        if let Some(data) = data {
            for line in data.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let entry = self.normalize(line)?;
                if !entry.is_empty() && !entries.contains(&entry) {
                    entries.push(entry);
                }
            }
        }

        Ok(entries)
    }

    /// Sorts `entries` and rewrites the blocklist file.
    ///
    /// The content goes to a tmp file in the same directory first and is
    /// renamed over the target, so a failed write leaves the previous file
    /// intact.
    pub async fn save(&self, mut entries: Vec<String>) -> Result<()> {
        entries.sort();
        let content = render(&entries, ListFormat::Plain, &self.header);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| self.write_error(e))?;
        }
        let tmp = self.path.with_extension("txt.tmp");
        fs::write(&tmp, &content).await.map_err(|e| self.write_error(e))?;
        fs::rename(&tmp, &self.path).await.map_err(|e| self.write_error(e))?;

        debug!("Wrote {} entries to {}", entries.len(), self.path.display());
        Ok(())
    }

    /// Add-if-absent, the read-modify-write behind /block.
    ///
    /// Holds the writer lock across the whole load+save cycle so that
    /// concurrent appends cannot overwrite each other. Returns the
    /// normalized entry.
    pub async fn append(&self, raw: &str) -> Result<String> {
        let entry = self.normalize(raw)?;
        let _guard = self.write_lock.lock().await;
        let entries = self.load(std::slice::from_ref(&entry)).await?;
        self.save(entries).await?;
        info!("Blocked {entry}");
        Ok(entry)
    }

    /// Verbatim contents of the persisted file, `None` if it does not
    /// exist yet.
    pub async fn read_raw(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Read {
                path: self.path.clone(),
                source: e,
            }),
        }
    }

    /// Renders `entries` in `format` under this store's header.
    pub fn render(&self, entries: &[String], format: ListFormat) -> String {
        render(entries, format, &self.header)
    }

    fn write_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

/// True when `raw` already carries a scheme like `https://`.
fn has_scheme(raw: &str) -> bool {
    match raw.split_once("://") {
        Some((scheme, _)) => !scheme.is_empty() && scheme.bytes().all(|b| b.is_ascii_lowercase()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store(root: &TempDir, block_type: BlockType) -> BlocklistStore {
        let config = Config {
            block_type,
            blocklist_root: root.path().to_path_buf(),
            blocklist_header: "test header".to_string(),
            ..Config::default()
        };
        BlocklistStore::new(&config)
    }

    fn hostname_store(root: &TempDir) -> BlocklistStore {
        test_store(root, BlockType::Hostname)
    }

    #[test]
    fn test_normalize_extracts_hostname() {
        let root = tempfile::tempdir().unwrap();
        let store = hostname_store(&root);
        assert_eq!(store.normalize("example.com").unwrap(), "example.com");
        assert_eq!(store.normalize("  example.com  ").unwrap(), "example.com");
        assert_eq!(
            store.normalize("http://Example.com/path?q=1").unwrap(),
            "example.com"
        );
        assert_eq!(
            store.normalize("https://ads.example.com:8443/x").unwrap(),
            "ads.example.com"
        );
        assert_eq!(store.normalize("example.com/some/path").unwrap(), "example.com");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let store = hostname_store(&root);
        let once = store.normalize("http://Tracker.example.com/a?b=c").unwrap();
        assert_eq!(store.normalize(&once).unwrap(), once);
    }

    #[test]
    fn test_normalize_rejects_hostless_input() {
        let root = tempfile::tempdir().unwrap();
        let store = hostname_store(&root);
        assert!(matches!(
            store.normalize("http://"),
            Err(StoreError::InvalidUrl { .. })
        ));
        assert!(matches!(
            store.normalize("file://"),
            Err(StoreError::InvalidUrl { .. })
        ));
        assert!(matches!(
            store.normalize("exa mple.com"),
            Err(StoreError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_normalize_raw_keeps_input() {
        let root = tempfile::tempdir().unwrap();
        let store = test_store(&root, BlockType::Raw);
        assert_eq!(
            store.normalize(" https://example.com/ad?x=1 ").unwrap(),
            "https://example.com/ad?x=1"
        );
        assert_eq!(store.normalize("anything at all").unwrap(), "anything at all");
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let store = hostname_store(&root);
        assert!(store.load(&[]).await.unwrap().is_empty());
        assert!(store.read_raw().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_read_failure_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let store = hostname_store(&root);
        // A directory at the file path makes reads fail with something
        // other than NotFound.
        std::fs::create_dir(store.path()).unwrap();
        assert!(matches!(store.load(&[]).await, Err(StoreError::Read { .. })));
        assert!(matches!(store.read_raw().await, Err(StoreError::Read { .. })));
    }

    #[tokio::test]
    async fn test_load_skips_comments_and_blanks() {
        let root = tempfile::tempdir().unwrap();
        let store = hostname_store(&root);
        std::fs::write(
            store.path(),
            "# test header\n\na.example.com\n  # indented comment\n\nb.example.com\n",
        )
        .unwrap();
        let entries = store.load(&[]).await.unwrap();
        assert_eq!(entries, vec!["a.example.com", "b.example.com"]);
    }

    #[tokio::test]
    async fn test_load_normalizes_and_dedups_file_lines() {
        let root = tempfile::tempdir().unwrap();
        let store = hostname_store(&root);
        std::fs::write(
            store.path(),
            "example.com\nhttp://Example.com/path\nother.net\n",
        )
        .unwrap();
        let entries = store.load(&[]).await.unwrap();
        assert_eq!(entries, vec!["example.com", "other.net"]);
    }

    #[tokio::test]
    async fn test_load_seeds_come_first_and_dedup() {
        let root = tempfile::tempdir().unwrap();
        let store = hostname_store(&root);
        std::fs::write(store.path(), "b.com\na.com\n").unwrap();
        let entries = store
            .load(&["https://New.example.com/x".to_string(), "a.com".to_string()])
            .await
            .unwrap();
        assert_eq!(entries, vec!["new.example.com", "a.com", "b.com"]);
    }

    #[tokio::test]
    async fn test_load_preserves_file_order() {
        let root = tempfile::tempdir().unwrap();
        let store = hostname_store(&root);
        std::fs::write(store.path(), "z.com\nm.com\na.com\n").unwrap();
        let entries = store.load(&[]).await.unwrap();
        assert_eq!(entries, vec!["z.com", "m.com", "a.com"]);
    }

    #[tokio::test]
    async fn test_save_sorts_and_writes_header() {
        let root = tempfile::tempdir().unwrap();
        let store = hostname_store(&root);
        store
            .save(vec!["z.com".to_string(), "a.com".to_string()])
            .await
            .unwrap();
        let content = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(content, "# test header\n\na.com\nz.com\n");
    }

    #[tokio::test]
    async fn test_save_creates_missing_root() {
        let root = tempfile::tempdir().unwrap();
        let config = Config {
            blocklist_root: root.path().join("nested").join("dir"),
            blocklist_header: "h".to_string(),
            ..Config::default()
        };
        let store = BlocklistStore::new(&config);
        store.save(vec!["a.com".to_string()]).await.unwrap();
        assert!(store.path().is_file());
    }

    #[tokio::test]
    async fn test_save_write_failure_preserves_file() {
        let root = tempfile::tempdir().unwrap();
        let store = hostname_store(&root);
        store.save(vec!["a.com".to_string()]).await.unwrap();
        let before = std::fs::read_to_string(store.path()).unwrap();

        // A directory at the tmp path makes the write fail before the
        // rename commits anything.
        std::fs::create_dir(root.path().join("blocklist.txt.tmp")).unwrap();
        let result = store.save(vec!["b.com".to_string()]).await;
        assert!(matches!(result, Err(StoreError::Write { .. })));
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_load_save_round_trip_is_stable() {
        let root = tempfile::tempdir().unwrap();
        let store = hostname_store(&root);
        store
            .save(vec!["b.com".to_string(), "a.com".to_string()])
            .await
            .unwrap();
        let first = std::fs::read_to_string(store.path()).unwrap();

        let entries = store.load(&[]).await.unwrap();
        store.save(entries).await.unwrap();
        let second = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_append_creates_and_dedups() {
        let root = tempfile::tempdir().unwrap();
        let store = hostname_store(&root);
        assert_eq!(
            store.append("https://ads.example.com/banner").await.unwrap(),
            "ads.example.com"
        );
        assert_eq!(store.append("ads.example.com").await.unwrap(), "ads.example.com");
        let entries = store.load(&[]).await.unwrap();
        assert_eq!(entries, vec!["ads.example.com"]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_keep_both_entries() {
        let root = tempfile::tempdir().unwrap();
        let store = hostname_store(&root);
        let (a, b) = tokio::join!(store.append("a.example.com"), store.append("b.example.com"));
        a.unwrap();
        b.unwrap();
        let entries = store.load(&[]).await.unwrap();
        assert_eq!(entries, vec!["a.example.com", "b.example.com"]);
    }

    #[tokio::test]
    async fn test_read_raw_returns_exact_bytes() {
        let root = tempfile::tempdir().unwrap();
        let store = hostname_store(&root);
        let raw = "# test header\n\nunsorted-z.com\na.com\n";
        std::fs::write(store.path(), raw).unwrap();
        assert_eq!(store.read_raw().await.unwrap().unwrap(), raw);
    }
}
