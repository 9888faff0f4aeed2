use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;

use crate::scopus::types::{Record, Rejection, parse_record};

/// Result of filtering a raw entry list down to its valid, unique records.
#[derive(Debug, Default)]
pub struct Cleaned {
    /// Surviving entries, verbatim and in raw order.
    pub entries: Vec<Value>,
    /// The same entries, parsed.
    pub records: Vec<Record>,
    /// Raw index and reason of every dropped invalid entry.
    pub rejected: Vec<(usize, Rejection)>,
    /// Valid entries dropped because their eid was already seen.
    pub duplicates: usize,
}

/// Keep entries that have an eid and a non-empty author list, first occurrence of each eid only.
pub fn clean_entries(raw: &[Value]) -> Cleaned {
    let mut cleaned = Cleaned::default();
    let mut seen = HashSet::new();

    for (index, entry) in raw.iter().enumerate() {
        match parse_record(entry) {
            Ok(record) => {
                if seen.insert(record.eid.clone()) {
                    cleaned.entries.push(entry.clone());
                    cleaned.records.push(record);
                } else {
                    debug!(eid = %record.eid, "dropping duplicate entry");
                    cleaned.duplicates += 1;
                }
            }
            Err(reason) => {
                debug!(index, %reason, "dropping invalid entry");
                cleaned.rejected.push((index, reason));
            }
        }
    }

    cleaned
}
