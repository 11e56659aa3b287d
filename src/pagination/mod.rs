//! Parses and normalizes limit/offset/page query parameters, and derives
//! the canonical cache key that makes equivalent page windows share an
//! entry.

use url::Url;

/// Hard ceiling on `limit`, regardless of what the caller requests.
pub const MAX_LIST_LIMIT: u64 = 5000;
const DEFAULT_LIMIT: u64 = 100;

/// Parsed, clamped limit/offset pair plus the `page` hint it was derived
/// from, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationParams {
    pub limit: u64,
    pub offset: u64,
}

/// Response-facing pagination metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PaginationMeta {
    pub total_items: u64,
    pub limit: u64,
    pub offset: u64,
    pub has_more: bool,
    pub next_offset: Option<u64>,
    pub current_page: u64,
    pub total_pages: u64,
}

pub struct PaginationEngine;

impl PaginationEngine {
    /// Parses `limit`/`offset`/`page` out of a full URI's query string and
    /// normalizes them to a canonical `(limit, offset)` pair.
    pub fn parse(uri: &str) -> PaginationParams {
        let query_pairs = Self::query_pairs(uri);

        let raw_limit = query_pairs
            .iter()
            .find(|(k, _)| k == "limit")
            .and_then(|(_, v)| v.parse::<i64>().ok());
        let raw_offset = query_pairs
            .iter()
            .find(|(k, _)| k == "offset")
            .and_then(|(_, v)| v.parse::<i64>().ok());
        let raw_page = query_pairs
            .iter()
            .find(|(k, _)| k == "page")
            .and_then(|(_, v)| v.parse::<i64>().ok());

        let limit = clamp_limit(raw_limit.unwrap_or(DEFAULT_LIMIT as i64));

        let offset = match raw_offset {
            Some(o) => clamp_non_negative(o),
            None => match raw_page {
                Some(p) => {
                    let page = clamp_non_negative(p).max(1);
                    (page - 1) * limit
                }
                None => 0,
            },
        };

        PaginationParams { limit, offset }
    }

    /// Builds the response-facing metadata block for a page of
    /// `total_items` total results.
    pub fn meta(params: PaginationParams, total_items: u64) -> PaginationMeta {
        let has_more = params.offset + params.limit < total_items;
        let next_offset = has_more.then_some(params.offset + params.limit);
        let current_page = params.offset / params.limit + 1;
        let total_pages = total_items.div_ceil(params.limit).max(1);

        PaginationMeta {
            total_items,
            limit: params.limit,
            offset: params.offset,
            has_more,
            next_offset,
            current_page,
            total_pages,
        }
    }

    /// Derives the canonical cache key for `uri`: strips `limit`/`offset`/
    /// `page`, sorts whatever query params remain lexicographically, and
    /// appends `?_limit=X&_offset=Y` — so that `page=2&limit=10` and
    /// `offset=10&limit=10` against the same base produce the same key. A
    /// URI with no pagination parameters at all gets no suffix.
    pub fn canonical_key(uri: &str) -> String {
        let (base, query_pairs) = Self::split(uri);
        let had_pagination_param = query_pairs
            .iter()
            .any(|(k, _)| k == "limit" || k == "offset" || k == "page");

        let mut remaining: Vec<(String, String)> = query_pairs
            .into_iter()
            .filter(|(k, _)| k != "limit" && k != "offset" && k != "page")
            .collect();
        remaining.sort_by(|a, b| a.0.cmp(&b.0));

        let mut key = base;
        let mut parts: Vec<String> = remaining
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        if had_pagination_param {
            let params = Self::parse(uri);
            parts.push(format!("_limit={}", params.limit));
            parts.push(format!("_offset={}", params.offset));
        }

        if !parts.is_empty() {
            key.push('?');
            key.push_str(&parts.join("&"));
        }
        key
    }

    fn query_pairs(uri: &str) -> Vec<(String, String)> {
        Self::split(uri).1
    }

    fn split(uri: &str) -> (String, Vec<(String, String)>) {
        match Url::parse(uri) {
            Ok(url) => {
                let base = format!(
                    "{}://{}{}",
                    url.scheme(),
                    url.host_str().unwrap_or(""),
                    url.path()
                );
                let pairs = url
                    .query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                (base, pairs)
            }
            Err(_) => {
                // `vault://` URIs with opaque paths (e.g. `vault://note/x.md`)
                // don't always round-trip through `url::Url` cleanly; fall
                // back to manual splitting on the first `?`.
                match uri.split_once('?') {
                    Some((base, query)) => {
                        let pairs = query
                            .split('&')
                            .filter(|p| !p.is_empty())
                            .filter_map(|p| p.split_once('='))
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .collect();
                        (base.to_string(), pairs)
                    }
                    None => (uri.to_string(), Vec::new()),
                }
            }
        }
    }
}

fn clamp_limit(raw: i64) -> u64 {
    if raw <= 0 {
        1
    } else {
        (raw as u64).min(MAX_LIST_LIMIT)
    }
}

fn clamp_non_negative(raw: i64) -> u64 {
    raw.max(0) as u64
}
