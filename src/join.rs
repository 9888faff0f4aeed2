//! Merge the clean results of several cached queries into one corpus directory.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use crate::cache::{CLEAN_FILE, CacheError, QueryCache, write_json_atomic};
use crate::scopus::types::Record;
use crate::search::filter::clean_entries;

pub const README_FILE: &str = "README";

#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    #[error("no queries to join")]
    Empty,

    #[error("query has no completed cache entry: {0}")]
    NotCached(String),

    #[error("joined search not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("{0}")]
    Cache(#[from] CacheError),
}

#[derive(Debug)]
pub struct JoinedSearch {
    pub dir: PathBuf,
    pub entries: usize,
}

/// Concatenate the cached clean lists of `queries`, in the given order, into `out_dir/clean.json`.
pub async fn join_queries(
    cache: &QueryCache,
    queries: &[String],
    out_dir: &Path,
) -> Result<JoinedSearch, JoinError> {
    if queries.is_empty() {
        return Err(JoinError::Empty);
    }

    let mut combined: Vec<Value> = Vec::new();
    for query in queries {
        let clean = cache
            .entry(query)
            .load_clean()
            .await?
            .ok_or_else(|| JoinError::NotCached(query.clone()))?;
        info!(%query, entries = clean.len(), "joining query");
        combined.extend(clean);
    }

    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| CacheError::io(out_dir, e))?;
    write_json_atomic(&out_dir.join(CLEAN_FILE), &combined).await?;

    let mut readme = String::from("Queries joined in clean.json:\n\n");
    for query in queries {
        readme.push_str(query);
        readme.push('\n');
    }
    let readme_path = out_dir.join(README_FILE);
    tokio::fs::write(&readme_path, readme)
        .await
        .map_err(|e| CacheError::io(&readme_path, e))?;

    info!(dir = %out_dir.display(), entries = combined.len(), "joined search stored");
    Ok(JoinedSearch {
        dir: out_dir.to_path_buf(),
        entries: combined.len(),
    })
}

/// Records of a joined search directory. Repeated eids across queries are kept once.
pub async fn load_joined(dir: &Path) -> Result<Vec<Record>, JoinError> {
    let path = dir.join(CLEAN_FILE);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(JoinError::NotFound(dir.to_path_buf()));
        }
        Err(e) => return Err(CacheError::io(&path, e).into()),
    };
    let entries: Vec<Value> =
        serde_json::from_slice(&bytes).map_err(|source| CacheError::Json { path, source })?;
    Ok(clean_entries(&entries).records)
}
