use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Named bundle of response fields offered by the Scopus Search API.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Standard,
    Complete,
}

impl View {
    pub fn as_str(self) -> &'static str {
        match self {
            View::Standard => "STANDARD",
            View::Complete => "COMPLETE",
        }
    }
}

/// Result-shaping selector sent with every search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Comma-separated field list, sent as `field`.
    Fields(String),
    /// Named view, sent as `view`.
    View(View),
}

impl Selector {
    /// API-enforced ceiling on `count` for this selector.
    pub fn max_page_size(&self) -> u32 {
        match self {
            Selector::View(View::Complete) => 100,
            _ => 200,
        }
    }

    pub fn as_param(&self) -> (&'static str, &str) {
        match self {
            Selector::Fields(fields) => ("field", fields),
            Selector::View(view) => ("view", view.as_str()),
        }
    }
}

/// Envelope of `GET /content/search/scopus`.
#[derive(Deserialize, Debug)]
pub struct SearchResponse {
    #[serde(rename = "search-results")]
    pub search_results: SearchResults,
}

#[derive(Deserialize, Debug)]
pub struct SearchResults {
    #[serde(rename = "opensearch:totalResults", deserialize_with = "lenient_count")]
    pub total_results: u64,
    /// Entries stay untyped here: they are persisted verbatim and validated later.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub entry: Vec<Value>,
}

/// A validated bibliographic entry.
///
/// Only `eid` and a non-empty `author` array decide validity; every other field is
/// best effort and reads as absent when Scopus sends something of the wrong shape.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Record {
    pub eid: String,
    #[serde(rename = "dc:title", default, deserialize_with = "lenient_text")]
    pub title: Option<String>,
    #[serde(rename = "dc:creator", default, deserialize_with = "lenient_text")]
    pub creator: Option<String>,
    #[serde(rename = "dc:description", default, deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub authkeywords: Option<String>,
    #[serde(rename = "prism:publicationName", default, deserialize_with = "lenient_text")]
    pub publication_name: Option<String>,
    #[serde(rename = "prism:coverDate", default, deserialize_with = "lenient_text")]
    pub cover_date: Option<String>,
    #[serde(rename = "citedby-count", default, deserialize_with = "lenient_opt_count")]
    pub cited_by_count: Option<u64>,
    /// Authors carrying an id. Collaboration entries without `authid` are skipped.
    #[serde(rename = "author", default, deserialize_with = "lenient_list")]
    pub authors: Vec<Author>,
    #[serde(rename = "affiliation", default, deserialize_with = "lenient_list")]
    pub affiliations: Vec<Affiliation>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Author {
    #[serde(deserialize_with = "id_text")]
    pub authid: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub authname: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub surname: Option<String>,
    #[serde(rename = "given-name", default, deserialize_with = "lenient_text")]
    pub given_name: Option<String>,
    /// Affiliation history, oldest first.
    #[serde(rename = "afid", default, deserialize_with = "lenient_list")]
    pub afids: Vec<AfidRef>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AfidRef {
    #[serde(rename = "$", deserialize_with = "id_text")]
    pub id: String,
}

impl Author {
    /// Most recent affiliation id: the last element of the history.
    pub fn current_afid(&self) -> Option<&str> {
        self.afids
            .last()
            .map(|a| a.id.trim())
            .filter(|id| !id.is_empty())
    }

    pub fn display_name(&self) -> String {
        let given = self.given_name.as_deref().unwrap_or("").trim();
        let surname = self.surname.as_deref().unwrap_or("").trim();
        match (given.is_empty(), surname.is_empty()) {
            (false, false) => format!("{given} {surname}"),
            (true, false) => surname.to_string(),
            _ => self
                .authname
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(self.authid.as_str())
                .to_string(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Affiliation {
    #[serde(default, deserialize_with = "lenient_id")]
    pub afid: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub affilname: Option<String>,
    #[serde(rename = "affiliation-city", default, deserialize_with = "lenient_text")]
    pub city: Option<String>,
    #[serde(rename = "affiliation-country", default, deserialize_with = "lenient_text")]
    pub country: Option<String>,
}

/// Why an entry was left out of the clean list.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("missing eid")]
    MissingEid,

    #[error("missing or empty author list")]
    MissingAuthors,

    #[error("malformed entry: {0}")]
    Malformed(String),
}

/// Validate one raw search entry and parse it into a [`Record`].
pub fn parse_record(entry: &Value) -> Result<Record, Rejection> {
    let has_eid = entry
        .get("eid")
        .and_then(Value::as_str)
        .is_some_and(|eid| !eid.trim().is_empty());
    if !has_eid {
        return Err(Rejection::MissingEid);
    }

    let has_authors = entry
        .get("author")
        .and_then(Value::as_array)
        .is_some_and(|authors| !authors.is_empty());
    if !has_authors {
        return Err(Rejection::MissingAuthors);
    }

    Record::deserialize(entry).map_err(|e| Rejection::Malformed(e.to_string()))
}

/// Scopus sends counts as decimal strings; accept plain numbers too.
#[derive(Deserialize)]
#[serde(untagged)]
enum Count {
    Number(u64),
    Text(String),
}

fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match Count::deserialize(deserializer)? {
        Count::Number(n) => Ok(n),
        Count::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn lenient_opt_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// A string field; anything else reads as absent.
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

/// Identifiers arrive as strings, occasionally as bare numbers.
fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let id = match Value::deserialize(deserializer)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return Ok(None),
    };
    Ok(Some(id).filter(|id| !id.is_empty()))
}

fn id_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    lenient_id(deserializer)?.ok_or_else(|| serde::de::Error::custom("missing identifier"))
}

/// Elements that fail to parse are skipped; a lone object counts as a one-element list.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        item @ Value::Object(_) => vec![item],
        _ => return Ok(Vec::new()),
    };
    Ok(items.iter().filter_map(|item| T::deserialize(item).ok()).collect())
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
