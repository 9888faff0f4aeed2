//! Author graphs built from validated records.

pub mod gdf;

use std::collections::{BTreeMap, BTreeSet};

use crate::scopus::types::{Author, Record};
use crate::search::citations::CitationSet;
use crate::search::index;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Author id.
    pub id: String,
    pub label: String,
    /// Current affiliation id, empty when unknown.
    pub affiliation: String,
    pub affiliation_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source: String,
    pub target: String,
    /// Eid of the record that produced the edge.
    pub label: String,
    pub directed: bool,
}

#[derive(Debug, Default)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// Author nodes sorted by id; label from the first record naming the author.
fn author_nodes(records: &[&Record]) -> Vec<Node> {
    let current = index::current_affiliations(records.iter().copied());
    let details = index::affiliations(records.iter().copied());

    let mut labels: BTreeMap<&str, &Author> = BTreeMap::new();
    for author in records.iter().copied().flat_map(|r| &r.authors) {
        labels.entry(author.authid.as_str()).or_insert(author);
    }

    labels
        .into_iter()
        .map(|(id, author)| {
            let affiliation = current.get(id).cloned().flatten().unwrap_or_default();
            let affiliation_name = details
                .get(&affiliation)
                .and_then(|info| info.name.clone())
                .unwrap_or_default();
            Node {
                id: id.to_string(),
                label: author.display_name(),
                affiliation,
                affiliation_name,
            }
        })
        .collect()
}

/// Co-authorship graph: an undirected edge for every pair of distinct authors of a record.
pub fn coauthor_graph(records: &[Record]) -> Graph {
    let nodes = author_nodes(&records.iter().collect::<Vec<_>>());

    let mut edges = Vec::new();
    for (eid, authors) in index::eid_authors(records) {
        let authors: Vec<&String> = authors.iter().collect();
        for (i, a) in authors.iter().enumerate() {
            for b in &authors[i + 1..] {
                edges.push(Edge {
                    source: a.to_string(),
                    target: b.to_string(),
                    label: eid.clone(),
                    directed: false,
                });
            }
        }
    }

    Graph { nodes, edges }
}

/// Citation graph: a directed edge from every citing author to every author of the cited record.
pub fn citation_graph(citations: &CitationSet) -> Graph {
    let involved: Vec<&Record> = citations
        .cited
        .iter()
        .chain(citations.citing.values().flatten())
        .collect();
    let nodes = author_nodes(&involved);

    let cited_authors = index::eid_authors(&citations.cited);
    let mut edges = Vec::new();
    for (eid, targets) in &cited_authors {
        let Some(citing_records) = citations.citing.get(eid) else {
            continue;
        };
        let sources: BTreeSet<&str> = citing_records
            .iter()
            .flat_map(|r| &r.authors)
            .map(|a| a.authid.as_str())
            .collect();
        for source in &sources {
            for target in targets {
                edges.push(Edge {
                    source: source.to_string(),
                    target: target.clone(),
                    label: eid.clone(),
                    directed: true,
                });
            }
        }
    }

    Graph { nodes, edges }
}
