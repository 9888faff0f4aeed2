//! Citing-record retrieval: one `REFEID(<eid>)` search per cited record, run in sequence.

use std::collections::BTreeMap;

use tracing::{info, warn};

use crate::cache::QueryCache;
use crate::scopus::SearchApi;
use crate::scopus::types::Record;

use super::{SearchError, SearchRequest, search};

#[derive(Debug, Default)]
pub struct CitationSet {
    /// Records with at least one valid citing record.
    pub cited: Vec<Record>,
    /// cited eid → records citing it.
    pub citing: BTreeMap<String, Vec<Record>>,
    /// Eids reported as cited whose citation search returned nothing valid.
    pub dropped: Vec<String>,
}

pub fn refeid_query(eid: &str) -> String {
    format!("REFEID({eid})")
}

/// Search the citing records of every record with a positive `citedby-count`.
///
/// Uses the selector and limits of `base`. Any failed search aborts the whole run.
pub async fn collect_citations(
    api: &impl SearchApi,
    cache: &QueryCache,
    base: &SearchRequest,
    records: &[Record],
) -> Result<CitationSet, SearchError> {
    let cited: Vec<&Record> = records
        .iter()
        .filter(|r| r.cited_by_count.is_some_and(|n| n > 0))
        .collect();
    info!(cited = cited.len(), "found articles with citations");

    let mut set = CitationSet::default();
    let mut left = cited.len();
    for record in cited {
        let request = base.for_query(&refeid_query(&record.eid))?;
        let outcome = search(api, cache, &request).await?;
        left -= 1;

        if outcome.records.is_empty() {
            warn!(eid = %record.eid, "no valid results from REFEID search, dropping");
            set.dropped.push(record.eid.clone());
        } else {
            set.cited.push(record.clone());
            set.citing.insert(record.eid.clone(), outcome.records);
        }
        info!(left, "still {left} citations to search");
    }

    info!(dropped = set.dropped.len(), "citation search done");
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scopus::types::{Selector, View, parse_record};
    use crate::scopus::ScopusError;
    use crate::search::testing::{MockApi, entry, page};
    use serde_json::json;

    fn cited_record(eid: &str, count: &str) -> Record {
        parse_record(&json!({
            "eid": eid,
            "citedby-count": count,
            "author": [{"authid": format!("auth-{eid}")}]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn searches_only_cited_records_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(tmp.path());
        let base = SearchRequest::new("q", Selector::View(View::Complete)).unwrap();
        let records = vec![
            cited_record("e1", "2"),
            cited_record("e2", "0"),
            cited_record("e3", "1"),
        ];
        let api = MockApi::new(vec![
            Ok(page(2, vec![entry("c1", &["x"]), entry("c2", &["y"])])),
            Ok(page(1, vec![entry("c3", &["z"])])),
        ]);

        let set = collect_citations(&api, &cache, &base, &records).await.unwrap();

        let queries: Vec<String> = api.calls().into_iter().map(|c| c.0).collect();
        assert_eq!(queries, vec!["REFEID(e1)", "REFEID(e3)"]);
        assert_eq!(set.cited.len(), 2);
        assert_eq!(set.citing["e1"].len(), 2);
        assert_eq!(set.citing["e3"][0].eid, "c3");
        assert!(set.dropped.is_empty());
    }

    #[tokio::test]
    async fn empty_citation_results_are_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(tmp.path());
        let base = SearchRequest::new("q", Selector::View(View::Complete)).unwrap();
        let api = MockApi::new(vec![Ok(page(1, vec![json!({"eid": "c1"})]))]);

        let set = collect_citations(&api, &cache, &base, &[cited_record("e1", "4")])
            .await
            .unwrap();

        assert!(set.cited.is_empty());
        assert_eq!(set.dropped, vec!["e1".to_string()]);
    }

    #[tokio::test]
    async fn failed_citation_search_aborts() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(tmp.path());
        let base = SearchRequest::new("q", Selector::View(View::Complete)).unwrap();
        let api = MockApi::new(vec![Err(ScopusError::RateLimited)]);

        let result = collect_citations(&api, &cache, &base, &[cited_record("e1", "1")]).await;

        assert!(matches!(result, Err(SearchError::Scopus(ScopusError::RateLimited))));
    }

    #[tokio::test]
    async fn cached_citation_searches_are_not_repeated() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = QueryCache::new(tmp.path());
        let base = SearchRequest::new("q", Selector::View(View::Complete)).unwrap();
        let records = vec![cited_record("e1", "1")];

        let api = MockApi::new(vec![Ok(page(1, vec![entry("c1", &["x"])]))]);
        collect_citations(&api, &cache, &base, &records).await.unwrap();

        let silent = MockApi::new(vec![]);
        let set = collect_citations(&silent, &cache, &base, &records).await.unwrap();
        assert!(silent.calls().is_empty());
        assert_eq!(set.citing["e1"][0].eid, "c1");
    }
}
