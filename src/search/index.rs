//! Lookup tables derived from a record list, consumed by the graph builders.

use std::collections::{BTreeMap, BTreeSet};

use crate::scopus::types::Record;

/// Details of an affiliation as reported on the records that mention it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AffiliationInfo {
    pub name: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// eid → set of author ids.
pub fn eid_authors<'a>(
    records: impl IntoIterator<Item = &'a Record>,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for record in records {
        map.entry(record.eid.clone())
            .or_default()
            .extend(record.authors.iter().map(|a| a.authid.clone()));
    }
    map
}

/// author id → most recent affiliation id, `None` when no record carries one.
/// Later records override earlier ones, but never with a missing value.
pub fn current_affiliations<'a>(
    records: impl IntoIterator<Item = &'a Record>,
) -> BTreeMap<String, Option<String>> {
    let mut map: BTreeMap<String, Option<String>> = BTreeMap::new();
    for author in records.into_iter().flat_map(|r| &r.authors) {
        let slot = map.entry(author.authid.clone()).or_default();
        if let Some(afid) = author.current_afid() {
            *slot = Some(afid.to_string());
        }
    }
    map
}

/// afid → affiliation details; the first non-empty value of each field wins.
pub fn affiliations<'a>(
    records: impl IntoIterator<Item = &'a Record>,
) -> BTreeMap<String, AffiliationInfo> {
    let mut map: BTreeMap<String, AffiliationInfo> = BTreeMap::new();
    for affiliation in records.into_iter().flat_map(|r| &r.affiliations) {
        let Some(afid) = affiliation.afid.as_deref().map(str::trim).filter(|a| !a.is_empty())
        else {
            continue;
        };
        let info = map.entry(afid.to_string()).or_default();
        fill(&mut info.name, &affiliation.affilname);
        fill(&mut info.city, &affiliation.city);
        fill(&mut info.country, &affiliation.country);
    }
    map
}

fn fill(slot: &mut Option<String>, value: &Option<String>) {
    if slot.is_none() {
        *slot = value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from);
    }
}
