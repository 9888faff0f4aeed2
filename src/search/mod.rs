//! Cached, paginated retrieval of a search query into a validated record list.

pub mod citations;
pub mod filter;
pub mod index;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{CacheError, QueryCache};
use crate::scopus::types::{Record, SearchResponse, Selector, View};
use crate::scopus::{ScopusError, SearchApi};

pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_MAX_ITEMS: u64 = 2000;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("{0}")]
    Scopus(#[from] ScopusError),

    #[error("{0}")]
    Cache(#[from] CacheError),
}

/// Pick the result-shaping selector. A field list wins over a view.
pub fn resolve_selector(
    fields: Option<String>,
    view: Option<View>,
) -> Result<Selector, SearchError> {
    let fields = fields
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty());
    match (fields, view) {
        (Some(fields), Some(view)) => {
            warn!(
                view = view.as_str(),
                "both a field list and a view were given; using the field list"
            );
            Ok(Selector::Fields(fields))
        }
        (Some(fields), None) => Ok(Selector::Fields(fields)),
        (None, Some(view)) => Ok(Selector::View(view)),
        (None, None) => Err(SearchError::Usage(
            "a field list or a view is required to select the result data".into(),
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    query: String,
    selector: Selector,
    page_size: u32,
    max_items: u64,
}

impl SearchRequest {
    pub fn new(query: &str, selector: Selector) -> Result<Self, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::Usage("query must not be empty".into()));
        }
        Ok(Self {
            query: query.to_string(),
            selector,
            page_size: DEFAULT_PAGE_SIZE,
            max_items: DEFAULT_MAX_ITEMS,
        })
    }

    pub fn with_page_size(mut self, page_size: u32) -> Result<Self, SearchError> {
        if page_size == 0 {
            return Err(SearchError::Usage("page size must be positive".into()));
        }
        self.page_size = page_size;
        Ok(self)
    }

    pub fn with_max_items(mut self, max_items: u64) -> Result<Self, SearchError> {
        if max_items == 0 {
            return Err(SearchError::Usage("max items must be positive".into()));
        }
        self.max_items = max_items;
        Ok(self)
    }

    /// Same selector and limits, different query.
    pub fn for_query(&self, query: &str) -> Result<Self, SearchError> {
        Ok(Self {
            page_size: self.page_size,
            max_items: self.max_items,
            ..Self::new(query, self.selector.clone())?
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn max_items(&self) -> u64 {
        self.max_items
    }

    /// Requested page size, clamped to the selector's API ceiling.
    pub fn effective_page_size(&self) -> u32 {
        self.page_size.min(self.selector.max_page_size())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Cache,
    Network,
}

#[derive(Debug)]
pub struct SearchOutcome {
    pub records: Vec<Record>,
    pub origin: Origin,
    /// Total reported by the first page; `None` on a cache hit.
    pub declared_total: Option<u64>,
    pub pages_fetched: u32,
    /// Entries downloaded by this call, after the `max_items` cut.
    pub raw_count: usize,
    pub dropped: usize,
    pub duplicates: usize,
}

/// In-progress pagination state. Never outlives a single `search` call.
struct Session {
    offset: u64,
    page_size: u32,
    /// Arithmetic estimate of what is left; `None` until the first page arrives.
    remaining: Option<i64>,
    declared_total: Option<u64>,
    pages: u32,
    entries: Vec<Value>,
}

impl Session {
    fn new(page_size: u32) -> Self {
        Self {
            offset: 0,
            page_size,
            remaining: None,
            declared_total: None,
            pages: 0,
            entries: Vec::new(),
        }
    }

    fn has_more(&self) -> bool {
        self.remaining.is_none_or(|r| r > 0)
    }

    /// Account for one received page and advance to the next offset.
    fn advance(&mut self, declared_total: u64, entries: Vec<Value>, max_items: u64) {
        let mut remaining = match self.remaining {
            Some(r) => r,
            None => {
                info!(total = declared_total, "search returned {declared_total} articles");
                self.declared_total = Some(declared_total);
                i64::try_from(declared_total).unwrap_or(i64::MAX)
            }
        };

        let cap = i64::try_from(max_items).unwrap_or(i64::MAX);
        if remaining > cap {
            warn!(max_items, "too many results, truncating to {max_items}");
            remaining = cap;
        }

        self.entries.extend(entries);
        self.pages += 1;
        self.offset += u64::from(self.page_size);
        remaining -= i64::from(self.page_size);
        self.remaining = Some(remaining);

        info!(remaining = remaining.max(0), "still {} results to be downloaded", remaining.max(0));
    }
}

/// Return the valid records for `request`, from the cache when a clean entry exists,
/// otherwise by paging through the API and caching the result.
///
/// Any request failure aborts the retrieval before `raw.json`/`clean.json` are written;
/// page files already stored are left in place and the next call starts again at offset 0.
pub async fn search(
    api: &impl SearchApi,
    cache: &QueryCache,
    request: &SearchRequest,
) -> Result<SearchOutcome, SearchError> {
    let entry = cache.entry(&request.query);

    if let Some(clean) = entry.load_clean().await? {
        let records = filter::clean_entries(&clean).records;
        info!(
            query = %request.query,
            records = records.len(),
            "loaded cached results"
        );
        return Ok(SearchOutcome {
            records,
            origin: Origin::Cache,
            declared_total: None,
            pages_fetched: 0,
            raw_count: 0,
            dropped: 0,
            duplicates: 0,
        });
    }

    let page_size = request.effective_page_size();
    if page_size < request.page_size {
        debug!(
            requested = request.page_size,
            page_size, "page size clamped to API ceiling"
        );
    }
    info!(
        query = %request.query,
        dir = %entry.dir().display(),
        "new query, downloading"
    );

    let mut session = Session::new(page_size);
    while session.has_more() {
        let page = api
            .search_page(&request.query, &request.selector, page_size, session.offset)
            .await?;
        let parsed = SearchResponse::deserialize(&page)
            .map_err(|e| ScopusError::Decode(e.to_string()))?;

        entry.write_page(session.offset, &page).await?;
        session.advance(
            parsed.search_results.total_results,
            parsed.search_results.entry,
            request.max_items,
        );
    }

    let mut raw = session.entries;
    raw.truncate(usize::try_from(request.max_items).unwrap_or(usize::MAX));
    entry.write_raw(&raw).await?;

    let cleaned = filter::clean_entries(&raw);
    if !cleaned.rejected.is_empty() {
        warn!(
            dropped = cleaned.rejected.len(),
            "dropped entries without eid or authors"
        );
    }
    if cleaned.duplicates > 0 {
        warn!(duplicates = cleaned.duplicates, "dropped duplicate entries");
    }
    entry.write_clean(&cleaned.entries).await?;

    info!(
        query = %request.query,
        records = cleaned.records.len(),
        pages = session.pages,
        "search complete"
    );

    Ok(SearchOutcome {
        records: cleaned.records,
        origin: Origin::Network,
        declared_total: session.declared_total,
        pages_fetched: session.pages,
        raw_count: raw.len(),
        dropped: cleaned.rejected.len(),
        duplicates: cleaned.duplicates,
    })
}
