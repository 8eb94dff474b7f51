use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Duplicates of these headers are discarded (first occurrence wins); all
/// other duplicate headers are joined with ','.
const HEADERS_DISCARD_DUPLICATES: &[&str] = &[
    "age",
    "authorization",
    "content-length",
    "content-type",
    "etag",
    "expires",
    "from",
    "host",
    "if-modified-since",
    "if-unmodified-since",
    "last-modified",
    "location",
    "max-forwards",
    "proxy-authorization",
    "referer",
    "retry-after",
    "user-agent",
];

/// Inbound request metadata surfaced to gateway handlers.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetadata {
    pub http_version: String,
    pub protocol: String,
    pub method: String,
    pub pathname: String,
    pub query: String,
    pub queries: BTreeMap<String, String>,
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

impl RequestMetadata {
    pub fn from_wire(req: &dyn crate::request::WireRequest) -> RequestMetadata {
        let (major, minor) = req.http_version();
        let query = req.query_string().to_string();
        let url = if query.is_empty() {
            req.resource().to_string()
        } else {
            format!("{}?{}", req.resource(), query)
        };
        RequestMetadata {
            http_version: format!("{major}.{minor}"),
            protocol: if req.is_secure() { "https" } else { "http" }.to_string(),
            method: req.method().to_string(),
            pathname: req.resource().to_string(),
            query,
            queries: merge_queries(req.queries()),
            url,
            headers: fold_headers(req.headers()),
        }
    }
}

/// Folds raw header pairs into a single map.
///
/// Header names compare case-insensitively; the first-seen spelling is kept
/// as the output key. Duplicates on the fixed discard list are dropped,
/// everything else comma-joins. The result iterates sorted by name.
pub fn fold_headers(raw: &[(String, String)]) -> BTreeMap<String, String> {
    let mut first_spelling: HashMap<String, String> = HashMap::new();
    let mut folded: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in raw {
        let lower = name.to_ascii_lowercase();
        match first_spelling.get(&lower) {
            None => {
                first_spelling.insert(lower, name.clone());
                folded.insert(name.clone(), value.clone());
            }
            Some(original) => {
                if HEADERS_DISCARD_DUPLICATES.contains(&lower.as_str()) {
                    continue;
                }
                if let Some(existing) = folded.get_mut(original) {
                    append_with_comma(existing, value);
                }
            }
        }
    }
    folded
}

/// Merges raw query parameters, comma-joining duplicate names.
pub fn merge_queries(raw: &[(String, String)]) -> BTreeMap<String, String> {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in raw {
        match merged.get_mut(name) {
            None => {
                merged.insert(name.clone(), value.clone());
            }
            Some(existing) => append_with_comma(existing, value),
        }
    }
    merged
}

fn append_with_comma(target: &mut String, tail: &str) {
    if target.is_empty() {
        target.push_str(tail);
    } else if !tail.is_empty() {
        target.push(',');
        target.push_str(tail);
    }
}

/// Outbound response metadata set by handlers before committing.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ResponseMetadata {
    pub status_code: u16,
    pub status_message: String,
    pub headers: BTreeMap<String, String>,
}

impl Default for ResponseMetadata {
    fn default() -> Self {
        Self {
            status_code: 200,
            status_message: "OK".to_string(),
            headers: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter()
            .map(|(n, v)| (n.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn duplicate_discard_list_header_keeps_first_value() {
        let folded = fold_headers(&pairs(&[("Content-Type", "a"), ("Content-Type", "b")]));
        assert_eq!(folded.len(), 1);
        assert_eq!(folded.get("Content-Type").map(String::as_str), Some("a"));
    }

    #[test]
    fn other_duplicate_headers_join_with_comma() {
        let folded = fold_headers(&pairs(&[("X-Tag", "a"), ("X-Tag", "b")]));
        assert_eq!(folded.get("X-Tag").map(String::as_str), Some("a,b"));
    }

    #[test]
    fn folding_compares_names_case_insensitively() {
        let folded = fold_headers(&pairs(&[("x-tag", "a"), ("X-TAG", "b"), ("HOST", "h1"), ("host", "h2")]));
        assert_eq!(folded.get("x-tag").map(String::as_str), Some("a,b"));
        assert_eq!(folded.get("HOST").map(String::as_str), Some("h1"));
    }

    #[test]
    fn folded_headers_iterate_sorted_by_name() {
        let folded = fold_headers(&pairs(&[("Zulu", "z"), ("Alpha", "a"), ("Mike", "m")]));
        let names: Vec<&str> = folded.keys().map(String::as_str).collect();
        assert_eq!(names, ["Alpha", "Mike", "Zulu"]);
    }

    #[test]
    fn duplicate_queries_merge_with_comma() {
        let merged = merge_queries(&pairs(&[("q", "1"), ("q", "2"), ("page", "3")]));
        assert_eq!(merged.get("q").map(String::as_str), Some("1,2"));
        assert_eq!(merged.get("page").map(String::as_str), Some("3"));
    }

    #[test]
    fn response_metadata_defaults_and_rejects_unknown_fields() {
        let meta: ResponseMetadata = serde_json::from_str("{}").unwrap();
        assert_eq!(meta.status_code, 200);
        assert_eq!(meta.status_message, "OK");

        let err = serde_json::from_str::<ResponseMetadata>(r#"{"bogus": 1}"#).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }
}
