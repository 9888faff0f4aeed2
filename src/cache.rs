//! On-disk query cache: one directory per query holding page files, `raw.json` and `clean.json`.
//!
//! No locking: two processes working on the same query can both miss the cache and
//! download it twice. `raw.json` and `clean.json` are renamed into place, so a reader
//! never sees a half-written file, but the last writer wins.

use std::io;
use std::path::{Path, PathBuf};

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use serde::Serialize;
use sha2::{Digest, Sha256};
use serde_json::Value;
use tracing::debug;

pub const RAW_FILE: &str = "raw.json";
pub const CLEAN_FILE: &str = "clean.json";
/// Sidecar holding the query text of a completed entry.
pub const QUERY_FILE: &str = "query.txt";

/// Longest encoded key used as-is. Filesystems cap a path component at 255 bytes.
const MAX_KEY_LEN: usize = 200;
/// Encoded prefix kept in front of the digest of an over-long key.
const HASHED_PREFIX_LEN: usize = 150;

/// Bytes that are unsafe in a single path component on common filesystems.
/// `%` is included so the encoding stays injective and decodable.
const KEY_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'/')
    .add(b'\\')
    .add(b'%')
    .add(b':')
    .add(b'*')
    .add(b'?')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'|')
    .add(b'.');

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Filesystem-safe directory name for a query.
///
/// Short queries map to their percent-encoding. Longer ones become an encoded prefix,
/// `~` and the SHA-256 of the full query; those keys are always longer than
/// `MAX_KEY_LEN`, so the two forms never collide.
pub fn cache_key(query: &str) -> String {
    let encoded = utf8_percent_encode(query, KEY_ENCODE_SET).to_string();
    if encoded.len() <= MAX_KEY_LEN {
        return encoded;
    }

    // The encoding is ASCII, so any byte index is a char boundary; only avoid splitting `%XX`.
    let mut cut = HASHED_PREFIX_LEN;
    if let Some(pos) = encoded[cut - 2..cut].rfind('%') {
        cut = cut - 2 + pos;
    }
    let digest = Sha256::digest(query.as_bytes());
    format!("{}~{:x}", &encoded[..cut], digest)
}

/// Inverse of [`cache_key`] for unhashed keys; `None` for hashed keys or names that are
/// not valid UTF-8 once decoded.
pub fn query_from_key(key: &str) -> Option<String> {
    if key.len() > MAX_KEY_LEN {
        return None;
    }
    percent_decode_str(key)
        .decode_utf8()
        .ok()
        .map(|q| q.into_owned())
}

#[derive(Debug, Clone)]
pub struct QueryCache {
    root: PathBuf,
}

impl QueryCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry(&self, query: &str) -> CacheEntry {
        CacheEntry {
            dir: self.root.join(cache_key(query)),
            query: query.to_string(),
        }
    }

    /// Queries with a complete (`clean.json`) entry, sorted.
    pub async fn cached_queries(&self) -> Result<Vec<String>, CacheError> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(&self.root, e)),
        };

        let mut queries = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.root, e))?
        {
            let path = item.path();
            if !tokio::fs::try_exists(path.join(CLEAN_FILE))
                .await
                .unwrap_or(false)
            {
                continue;
            }
            let stored = tokio::fs::read_to_string(path.join(QUERY_FILE)).await.ok();
            let query = stored.or_else(|| item.file_name().to_str().and_then(query_from_key));
            if let Some(query) = query {
                queries.push(query);
            }
        }
        queries.sort();
        Ok(queries)
    }
}

/// Cache directory of a single query.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    dir: PathBuf,
    query: String,
}

impl CacheEntry {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn page_path(&self, start: u64) -> PathBuf {
        self.dir.join(format!("{start}.json"))
    }

    /// The cached clean list, or `None` when this query has never completed.
    pub async fn load_clean(&self) -> Result<Option<Vec<Value>>, CacheError> {
        let path = self.dir.join(CLEAN_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(&path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| CacheError::Json { path, source })
    }

    pub async fn write_page(&self, start: u64, page: &Value) -> Result<(), CacheError> {
        let path = self.page_path(start);
        write_json(&path, page).await?;
        debug!(path = %path.display(), "stored page");
        Ok(())
    }

    pub async fn write_raw(&self, entries: &[Value]) -> Result<(), CacheError> {
        write_json_atomic(&self.dir.join(RAW_FILE), entries).await
    }

    /// Store the clean list, marking the entry complete. The query text goes first so a
    /// listed entry always has it.
    pub async fn write_clean(&self, entries: &[Value]) -> Result<(), CacheError> {
        let query_path = self.dir.join(QUERY_FILE);
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CacheError::io(&self.dir, e))?;
        tokio::fs::write(&query_path, &self.query)
            .await
            .map_err(|e| CacheError::io(&query_path, e))?;
        write_json_atomic(&self.dir.join(CLEAN_FILE), entries).await
    }
}

async fn write_json(path: &Path, value: &(impl Serialize + ?Sized)) -> Result<(), CacheError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CacheError::io(parent, e))?;
    }
    let body = serde_json::to_vec_pretty(value).map_err(|source| CacheError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    tokio::fs::write(path, body)
        .await
        .map_err(|e| CacheError::io(path, e))
}

/// Write to a temporary sibling, then rename over `path`.
pub(crate) async fn write_json_atomic(
    path: &Path,
    value: &(impl Serialize + ?Sized),
) -> Result<(), CacheError> {
    let tmp = path.with_extension("json.tmp");
    write_json(&tmp, value).await?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| CacheError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cache_key_is_deterministic() {
        let q = "TITLE-ABS-KEY(x) AND PUBYEAR > 2010";
        assert_eq!(cache_key(q), cache_key(q));
    }

    #[test]
    fn cache_key_has_no_path_hostile_characters() {
        let key = cache_key("TITLE-ABS-KEY(a/b c) AND PUBYEAR > 2010 .. \\ :*?\"<>|");
        assert!(!key.contains(['/', ' ', '\\', ':', '*', '?', '"', '<', '>', '|', '.']));
    }

    #[test]
    fn cache_key_does_not_collide_on_substitutes() {
        assert_ne!(cache_key("A/B"), cache_key("A_slash_B"));
        assert_ne!(cache_key("A B"), cache_key("A_B"));
        assert_ne!(cache_key("A/B"), cache_key("A%2FB"));
    }

    #[test]
    fn cache_key_round_trips_through_decode() {
        let q = "TITLE-ABS-KEY(neural/network) AND PUBYEAR > 2000 AND SUBJAREA(COMP)";
        assert_eq!(query_from_key(&cache_key(q)).as_deref(), Some(q));
    }

    #[test]
    fn cache_key_never_yields_dot_directories() {
        assert_eq!(cache_key(".."), "%2E%2E");
        assert_eq!(cache_key("."), "%2E");
    }

    fn long_query(tail: &str) -> String {
        format!(
            "TITLE-ABS-KEY(\"graph neural network\" OR \"message passing\" OR \"node embedding\") \
             AND PUBYEAR > 2015 AND SUBJAREA(COMP OR MATH) AND LANGUAGE(english) \
             AND DOCTYPE(ar OR cp) AND NOT TITLE(survey OR review) AND {tail}"
        )
    }

    #[test]
    fn long_queries_get_bounded_distinct_keys() {
        let a = long_query("AFFILCOUNTRY(italy)");
        let b = long_query("AFFILCOUNTRY(spain)");
        assert!(a.len() > 200);

        let (ka, kb) = (cache_key(&a), cache_key(&b));
        assert!(ka.len() <= 255, "{} bytes", ka.len());
        assert!(ka.len() > MAX_KEY_LEN);
        assert_ne!(ka, kb);
        assert_eq!(ka, cache_key(&a));
        assert!(!ka.contains(['/', ' ', '.']));
        assert_eq!(query_from_key(&ka), None);
    }

    #[test]
    fn hashed_key_prefix_never_splits_an_escape() {
        for pad in 0..4 {
            let query = format!("{}{}", "a".repeat(pad), " ".repeat(100));
            let key = cache_key(&query);
            let prefix = key.split('~').next().unwrap();
            assert_eq!(prefix.len() % 3, pad % 3);
            assert!(percent_decode_str(prefix).decode_utf8().is_ok());
        }
    }

    #[tokio::test]
    async fn long_query_entry_is_stored_and_listed() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(tmp.path());
        let query = long_query("AUTHOR-NAME(rossi)");
        let entries = vec![json!({"eid": "e1", "author": [{"authid": "1"}]})];

        cache.entry(&query).write_clean(&entries).await.unwrap();

        assert_eq!(cache.entry(&query).load_clean().await.unwrap(), Some(entries));
        assert_eq!(cache.cached_queries().await.unwrap(), vec![query]);
    }

    #[tokio::test]
    async fn load_clean_missing_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(tmp.path());
        assert!(cache.entry("q").load_clean().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_then_load_clean() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(tmp.path());
        let entry = cache.entry("TITLE(x) AND PUBYEAR > 2010");
        let entries = vec![json!({"eid": "e1", "author": [{"authid": "1"}]})];

        entry.write_clean(&entries).await.unwrap();

        assert_eq!(entry.load_clean().await.unwrap(), Some(entries));
        assert!(!entry.dir().join("clean.json.tmp").exists());
    }

    #[tokio::test]
    async fn write_page_creates_directory_and_offset_file() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(tmp.path().join("search"));
        let entry = cache.entry("q");

        entry.write_page(100, &json!({"search-results": {}})).await.unwrap();

        assert!(entry.dir().join("100.json").is_file());
    }

    #[tokio::test]
    async fn load_clean_reports_corrupt_json() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(tmp.path());
        let entry = cache.entry("q");
        std::fs::create_dir_all(entry.dir()).unwrap();
        std::fs::write(entry.dir().join(CLEAN_FILE), "[{").unwrap();

        let err = entry.load_clean().await.unwrap_err();
        assert!(matches!(err, CacheError::Json { .. }));
    }

    #[tokio::test]
    async fn cached_queries_lists_only_completed_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(tmp.path());
        cache.entry("b/query").write_clean(&[]).await.unwrap();
        cache.entry("a query").write_clean(&[]).await.unwrap();
        cache.entry("partial").write_page(0, &json!({})).await.unwrap();

        let queries = cache.cached_queries().await.unwrap();
        assert_eq!(queries, vec!["a query".to_string(), "b/query".to_string()]);
    }

    #[tokio::test]
    async fn cached_queries_on_missing_root_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(tmp.path().join("absent"));
        assert!(cache.cached_queries().await.unwrap().is_empty());
    }
}
